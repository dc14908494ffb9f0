use lumen_core::types::ToolDefinition;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct AddResourceArgs {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct GetInformationArgs {
    pub question: String,
}

pub(crate) fn add_resource_definition() -> ToolDefinition {
    ToolDefinition {
        name: "addResource".to_string(),
        description: "add a resource to your knowledge base. If the user provides a random piece of knowledge unprompted, use this tool without asking for confirmation.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "the content or resource to add to the knowledge base"
                }
            },
            "required": ["content"]
        }),
    }
}

pub(crate) fn get_information_definition() -> ToolDefinition {
    ToolDefinition {
        name: "getInformation".to_string(),
        description: "get information from your knowledge base to answer questions.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "description": "the users question" }
            },
            "required": ["question"]
        }),
    }
}
