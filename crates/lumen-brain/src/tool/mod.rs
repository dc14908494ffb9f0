pub mod client;
pub mod events;
pub mod knowledge;
pub mod weather;

use std::sync::Arc;

use lumen_core::error::{LumenError, Result};
use lumen_core::types::ToolDefinition;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::service::events::{EventQuery, EventsClient};
use crate::service::retrieval::RetrievalService;

/// Every tool the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    GetWeatherInformation,
    SearchEvents,
    AskForConfirmation,
    GetLocation,
    AddResource,
    GetInformation,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        Self::GetWeatherInformation,
        Self::SearchEvents,
        Self::AskForConfirmation,
        Self::GetLocation,
        Self::AddResource,
        Self::GetInformation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetWeatherInformation => "getWeatherInformation",
            Self::SearchEvents => "searchEvents",
            Self::AskForConfirmation => "askForConfirmation",
            Self::GetLocation => "getLocation",
            Self::AddResource => "addResource",
            Self::GetInformation => "getInformation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn definition(&self) -> ToolDefinition {
        match self {
            Self::GetWeatherInformation => weather::definition(),
            Self::SearchEvents => events::definition(),
            Self::AskForConfirmation => client::confirmation_definition(),
            Self::GetLocation => client::location_definition(),
            Self::AddResource => knowledge::add_resource_definition(),
            Self::GetInformation => knowledge::get_information_definition(),
        }
    }
}

/// What running a tool call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Server-side result to feed back to the model.
    Value(Value),
    /// Valid call to a client-side tool; generation suspends until the
    /// client supplies the result.
    Client,
}

fn parse_args<T: DeserializeOwned>(kind: ToolKind, args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| LumenError::Tool(format!("invalid arguments for {}: {e}", kind.name())))
}

/// Validates and executes tool calls against the server-side collaborators.
pub struct ToolRegistry {
    retrieval: Arc<RetrievalService>,
    events: Arc<EventsClient>,
}

impl ToolRegistry {
    pub fn new(retrieval: Arc<RetrievalService>, events: Arc<EventsClient>) -> Self {
        Self { retrieval, events }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolKind::ALL.iter().map(ToolKind::definition).collect()
    }

    /// Execute one call. Unknown names, invalid arguments and executor
    /// failures are errors for the caller to report back to the model.
    pub async fn execute(&self, name: &str, args: &Value) -> Result<ToolOutput> {
        let kind = ToolKind::from_name(name)
            .ok_or_else(|| LumenError::Tool(format!("unknown tool: {name}")))?;
        tracing::info!(tool = name, "executing tool");

        match kind {
            ToolKind::GetWeatherInformation => {
                let args: weather::WeatherArgs = parse_args(kind, args)?;
                Ok(ToolOutput::Value(Value::from(weather::current_weather(&args))))
            }
            ToolKind::SearchEvents => {
                let query: EventQuery = parse_args(kind, args)?;
                Ok(ToolOutput::Value(self.events.search(&query).await?))
            }
            ToolKind::AskForConfirmation => {
                parse_args::<client::ConfirmationArgs>(kind, args)?;
                Ok(ToolOutput::Client)
            }
            ToolKind::GetLocation => {
                parse_args::<client::LocationArgs>(kind, args)?;
                Ok(ToolOutput::Client)
            }
            ToolKind::AddResource => {
                let args: knowledge::AddResourceArgs = parse_args(kind, args)?;
                let confirmation = self.retrieval.add_resource(&args.content).await?;
                Ok(ToolOutput::Value(Value::String(confirmation)))
            }
            ToolKind::GetInformation => {
                let args: knowledge::GetInformationArgs = parse_args(kind, args)?;
                let found = self.retrieval.get_information(&args.question).await?;
                let found = serde_json::to_value(found)
                    .map_err(|e| LumenError::Tool(format!("failed to encode results: {e}")))?;
                Ok(ToolOutput::Value(found))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::knowledge::InMemoryKnowledgeStore;
    use crate::service::llm::Embedder;
    use crate::service::retrieval::RESOURCE_CREATED;
    use crate::testing::StubEmbedding;
    use lumen_core::config::{EventsConfig, RetrievalConfig};
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let embedder = Arc::new(Embedder::new(Arc::new(StubEmbedding::new(|_| vec![1.0, 0.0]))));
        let retrieval = Arc::new(RetrievalService::new(
            embedder,
            Arc::new(InMemoryKnowledgeStore::new()),
            &RetrievalConfig::default(),
        ));
        ToolRegistry::new(retrieval, Arc::new(EventsClient::new(&EventsConfig::default())))
    }

    #[test]
    fn test_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.definition().name, kind.name());
        }
        assert_eq!(ToolKind::from_name("deleteEverything"), None);
    }

    #[test]
    fn test_definitions_cover_every_tool() {
        let definitions = registry().definitions();
        assert_eq!(definitions.len(), 6);
        assert!(definitions
            .iter()
            .all(|d| d.parameters["type"] == "object"));
    }

    #[tokio::test]
    async fn test_weather_tool() {
        let output = registry()
            .execute("getWeatherInformation", &json!({ "city": "Paris" }))
            .await
            .unwrap();
        let ToolOutput::Value(Value::String(weather)) = output else {
            panic!("expected a string result");
        };
        assert!(weather::WEATHER_OPTIONS.contains(&weather.as_str()));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_tool_errors() {
        let err = registry()
            .execute("getWeatherInformation", &json!({ "town": "Paris" }))
            .await
            .unwrap_err();
        assert!(matches!(err, LumenError::Tool(ref m) if m.contains("getWeatherInformation")));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = registry().execute("nope", &json!({})).await.unwrap_err();
        assert!(matches!(err, LumenError::Tool(_)));
    }

    #[tokio::test]
    async fn test_client_tools_suspend() {
        let registry = registry();
        assert_eq!(
            registry.execute("getLocation", &json!({})).await.unwrap(),
            ToolOutput::Client
        );
        assert_eq!(
            registry
                .execute("askForConfirmation", &json!({ "message": "Share location?" }))
                .await
                .unwrap(),
            ToolOutput::Client
        );
        assert!(registry.execute("askForConfirmation", &json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_knowledge_tools() {
        let registry = registry();
        let added = registry
            .execute("addResource", &json!({ "content": "Paris is the capital of France." }))
            .await
            .unwrap();
        assert_eq!(added, ToolOutput::Value(json!(RESOURCE_CREATED)));

        let ToolOutput::Value(found) = registry
            .execute("getInformation", &json!({ "question": "capital?" }))
            .await
            .unwrap()
        else {
            panic!("expected a value");
        };
        assert_eq!(found[0]["content"], "Paris is the capital of France");
    }

    #[tokio::test]
    async fn test_events_without_key_fails() {
        let err = registry()
            .execute("searchEvents", &json!({ "query": "jazz" }))
            .await
            .unwrap_err();
        assert!(matches!(err, LumenError::Events(_)));
    }
}
