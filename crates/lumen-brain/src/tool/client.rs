//! Tools executed by the client. The server only validates their arguments
//! and forwards the call; the result arrives with a later request.

use lumen_core::types::ToolDefinition;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct ConfirmationArgs {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct LocationArgs {}

pub(crate) fn confirmation_definition() -> ToolDefinition {
    ToolDefinition {
        name: "askForConfirmation".to_string(),
        description: "Ask the user for confirmation.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to ask for confirmation."
                }
            },
            "required": ["message"]
        }),
    }
}

pub(crate) fn location_definition() -> ToolDefinition {
    ToolDefinition {
        name: "getLocation".to_string(),
        description: "Get the user location. Always ask for confirmation before using this tool."
            .to_string(),
        parameters: json!({ "type": "object", "properties": {} }),
    }
}
