//! Capability-backed lookup nodes: weather and home information.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, json};
use tracing::warn;

use hearth_capability::{CapabilityAction, CapabilityCatalog};
use hearth_state::{ConversationState, StateUpdate, WorkflowId};

use super::WorkflowNode;

/// Remote capability consulted for weather reports.
const WEATHER_CAPABILITY: &str = "get_weather_now";

/// Remote capability consulted for home/device status questions.
const STATUS_CAPABILITY: &str = "get_home_status";

/// Look a capability up in the catalog, logging the reason when it cannot
/// be used.
async fn find_capability(catalog: &CapabilityCatalog, name: &str) -> Option<CapabilityAction> {
    match catalog.find(name).await {
        Ok(Some(action)) => Some(action),
        Ok(None) => {
            warn!(capability = name, "capability not offered by the server");
            None
        }
        Err(e) => {
            warn!(capability = name, error = %e, "capability catalog unavailable");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// Answers weather questions by invoking the remote weather capability.
pub struct WeatherNode {
    catalog: Arc<CapabilityCatalog>,
    default_city: String,
}

impl WeatherNode {
    /// `default_city` is used when the turn carries no `city_name` entity.
    pub fn new(catalog: Arc<CapabilityCatalog>, default_city: impl Into<String>) -> Self {
        Self {
            catalog,
            default_city: default_city.into(),
        }
    }

    fn degraded(city: &str) -> StateUpdate {
        StateUpdate::none().with_response(format!("抱歉，我暂时查不到{city}的天气，请稍后再试。"))
    }
}

#[async_trait]
impl WorkflowNode for WeatherNode {
    fn id(&self) -> WorkflowId {
        WorkflowId::Weather
    }

    async fn run(&self, state: &ConversationState) -> StateUpdate {
        let city = state
            .extracted_entities
            .city_name
            .clone()
            .unwrap_or_else(|| self.default_city.clone());

        let Some(action) = find_capability(&self.catalog, WEATHER_CAPABILITY).await else {
            return Self::degraded(&city);
        };

        let mut arguments = Map::new();
        arguments.insert("city".to_string(), json!(city));

        let outcome = action.invoke(arguments).await;
        if outcome.is_error {
            return Self::degraded(&city);
        }

        StateUpdate::none()
            .with_module_data("weather", json!({ "city": city, "report": outcome.text }))
            .with_response(format!("🌤️ {city}当前天气：{}", outcome.text))
    }
}

// ---------------------------------------------------------------------------
// Information
// ---------------------------------------------------------------------------

/// Answers home/device status questions via the remote status capability.
pub struct InformationNode {
    catalog: Arc<CapabilityCatalog>,
}

impl InformationNode {
    pub fn new(catalog: Arc<CapabilityCatalog>) -> Self {
        Self { catalog }
    }

    fn degraded() -> StateUpdate {
        StateUpdate::none().with_response("抱歉，我暂时无法查询相关信息，请稍后再试。")
    }
}

#[async_trait]
impl WorkflowNode for InformationNode {
    fn id(&self) -> WorkflowId {
        WorkflowId::Information
    }

    async fn run(&self, state: &ConversationState) -> StateUpdate {
        let Some(action) = find_capability(&self.catalog, STATUS_CAPABILITY).await else {
            return Self::degraded();
        };

        let mut arguments = Map::new();
        arguments.insert("query".to_string(), json!(state.user_input));

        let outcome = action.invoke(arguments).await;
        if outcome.is_error {
            return Self::degraded();
        }

        StateUpdate::none()
            .with_module_data("information", json!({ "answer": outcome.text }))
            .with_response(outcome.text)
    }
}
