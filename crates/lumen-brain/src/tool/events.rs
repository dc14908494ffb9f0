use lumen_core::types::ToolDefinition;
use serde_json::json;

use crate::service::events::DateFilter;

pub(crate) fn definition() -> ToolDefinition {
    let dates: Vec<&str> = DateFilter::ALL.iter().map(DateFilter::as_str).collect();
    ToolDefinition {
        name: "searchEvents".to_string(),
        description: "call the getEvents API and return results to the user".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "start": { "type": "integer", "minimum": 0 },
                "date": { "type": "string", "enum": dates },
                "is_virtual": { "type": "boolean" }
            },
            "required": ["query"]
        }),
    }
}
