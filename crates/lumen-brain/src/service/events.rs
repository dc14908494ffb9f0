use lumen_core::config::EventsConfig;
use lumen_core::error::{LumenError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Date window accepted by the events search API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    Any,
    Today,
    Tomorrow,
    Week,
    Weekend,
    NextWeek,
    Month,
    NextMonth,
}

impl DateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
            Self::Week => "week",
            Self::Weekend => "weekend",
            Self::NextWeek => "next_week",
            Self::Month => "month",
            Self::NextMonth => "next_month",
        }
    }

    pub const ALL: [DateFilter; 8] = [
        Self::Any,
        Self::Today,
        Self::Tomorrow,
        Self::Week,
        Self::Weekend,
        Self::NextWeek,
        Self::Month,
        Self::NextMonth,
    ];
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventQuery {
    pub query: String,
    #[serde(default)]
    pub start: Option<u32>,
    #[serde(default)]
    pub date: Option<DateFilter>,
    #[serde(default)]
    pub is_virtual: Option<bool>,
}

/// The fields of an event that are passed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    #[serde(default)]
    pub name: Value,
    #[serde(default)]
    pub description: Value,
    #[serde(default)]
    pub date_human_readable: Value,
    #[serde(default)]
    pub link: Value,
}

/// Client for the real-time events search API on RapidAPI.
pub struct EventsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl EventsClient {
    pub fn new(config: &EventsConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn host(&self) -> &str {
        self.base_url
            .split("://")
            .nth(1)
            .unwrap_or(&self.base_url)
            .split('/')
            .next()
            .unwrap_or_default()
    }

    fn query_params(query: &EventQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![("query", query.query.clone())];
        if let Some(start) = query.start {
            params.push(("start", start.to_string()));
        }
        if let Some(date) = query.date {
            params.push(("date", date.as_str().to_string()));
        }
        if let Some(is_virtual) = query.is_virtual {
            params.push(("is_virtual", is_virtual.to_string()));
        }
        params
    }

    /// Search events. The API response is returned as-is except that every
    /// entry of `data` is reduced to an [`EventSummary`].
    pub async fn search(&self, query: &EventQuery) -> Result<Value> {
        if self.api_key.is_empty() {
            return Err(LumenError::Events("events API key is not configured".to_string()));
        }

        tracing::debug!(query = %query.query, "searching events");
        let response = self
            .client
            .get(format!("{}/search-events", self.base_url))
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", self.host())
            .query(&Self::query_params(query))
            .send()
            .await
            .map_err(|e| LumenError::Events(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| LumenError::Events(format!("failed to read response body: {e}")))?;
        if !(200..300).contains(&status) {
            return Err(LumenError::Http { status, body });
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| LumenError::Events(format!("failed to parse response JSON: {e}")))?;
        summarize(parsed)
    }
}

fn summarize(mut response: Value) -> Result<Value> {
    let data = response
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| LumenError::Events("missing data array in response".to_string()))?;

    let summaries: Vec<EventSummary> = data
        .iter()
        .map(|event| EventSummary {
            name: event["name"].clone(),
            description: event["description"].clone(),
            date_human_readable: event["date_human_readable"].clone(),
            link: event["link"].clone(),
        })
        .collect();

    let summaries = serde_json::to_value(summaries)
        .map_err(|e| LumenError::Events(format!("failed to encode events: {e}")))?;
    response["data"] = summaries;
    Ok(response)
}
