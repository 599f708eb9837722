//! Chat-completion backed classification service.
//!
//! [`ChatClassifier`] talks to any OpenAI-compatible `/chat/completions`
//! endpoint and asks the model two questions per turn: which intent the
//! utterance expresses, and which entity slots it mentions. Both replies are
//! expected as bare JSON; markdown code fences around the JSON are tolerated
//! because many models add them regardless of instructions.
//!
//! The service trait is deliberately small so tests (and the graph crate's
//! integration tests) can substitute a scripted implementation without any
//! network access.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use hearth_state::ExtractedEntities;

use crate::error::{IntentError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default request timeout for classification calls. Kept short: a slow
/// classifier is worse than the keyword fallback.
pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(10);

/// System prompt for intent classification.
const INTENT_PROMPT: &str = r#"You are the intent classifier of a Chinese-speaking home assistant.
Classify the user's utterance into exactly one of these intents:

- weather_query: weather, temperature or forecast questions
- device_control: turning on/off or adjusting a home device
- schedule_management: reminders, alarms, timers, calendar entries
- information_query: general knowledge or information lookup
- emergency_alert: emergencies, safety alarms, calls for help
- scene_activation: activating a named scene or mode (e.g. movie night)
- general_chat: greetings, small talk, anything else

Reply with a single JSON object and nothing else:
{"intent": "<one of the labels above>", "confidence": <0.0-1.0>, "requires_clarification": <true|false>, "clarification_question": "<question or null>"}

Set requires_clarification to true only when the utterance is too vague to
act on, and then phrase clarification_question in the user's language.

Examples:
"帮我打开客厅的灯" -> {"intent": "device_control", "confidence": 0.95, "requires_clarification": false, "clarification_question": null}
"明天天气怎么样" -> {"intent": "weather_query", "confidence": 0.9, "requires_clarification": false, "clarification_question": null}"#;

/// System prompt for entity extraction.
const ENTITY_PROMPT: &str = r#"You extract entity slots from a home-assistant utterance.
Reply with a single JSON object and nothing else, using null for absent slots:
{"city_name": <string|null>, "device_name": <string|null>, "action": <string|null>, "time_expression": <string|null>, "location": <string|null>}

- city_name: city the user asks about (weather, news)
- device_name: the device to control, e.g. "灯", "空调"
- action: what to do with it, e.g. "打开", "关闭", "调高"
- time_expression: when, e.g. "明天", "今晚八点"
- location: room or place inside the home, e.g. "客厅"

Example:
"帮我打开客厅的灯" -> {"city_name": null, "device_name": "灯", "action": "打开", "time_expression": null, "location": "客厅"}"#;

// ---------------------------------------------------------------------------
// Service trait
// ---------------------------------------------------------------------------

/// One intent-classification result.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentClassification {
    /// The intent label, e.g. `"weather_query"`.
    pub intent: String,

    /// Model confidence in `[0.0, 1.0]`.
    pub confidence: f64,

    /// Whether the utterance is too vague to act on.
    #[serde(default)]
    pub requires_clarification: bool,

    /// The question to ask back when clarification is required.
    #[serde(default)]
    pub clarification_question: Option<String>,
}

/// The primary classification path.
///
/// Implementations may fail freely; the caller falls back to keyword
/// matching on any error.
#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Classify the utterance into an intent label.
    async fn classify_intent(&self, user_input: &str) -> Result<IntentClassification>;

    /// Extract entity slots from the utterance.
    async fn extract_entities(&self, user_input: &str) -> Result<ExtractedEntities>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for [`ChatClassifier`].
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions`
    /// suffix.
    pub base_url: String,

    /// Bearer token for the API.
    pub api_key: String,

    /// Model identifier to request.
    pub model: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClassifierConfig {
    /// Create a configuration with the default timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: DEFAULT_CLASSIFIER_TIMEOUT,
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// Chat-completion client
// ---------------------------------------------------------------------------

/// [`ClassificationService`] implementation over an OpenAI-compatible
/// chat-completions API.
#[derive(Debug)]
pub struct ChatClassifier {
    config: ClassifierConfig,
    http: reqwest::Client,
}

impl ChatClassifier {
    /// Build a classifier from its configuration.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(IntentError::Config {
                reason: "api key is empty".to_string(),
            });
        }
        if config.base_url.trim().is_empty() {
            return Err(IntentError::Config {
                reason: "base url is empty".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IntentError::Config {
                reason: format!("failed to build http client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// Send one system+user exchange and return the assistant's text reply.
    async fn complete(&self, system_prompt: &str, user_input: &str) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let body = json!({
            "model": self.config.model,
            "temperature": 0.0,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_input },
            ],
        });

        debug!(url = %url, model = %self.config.model, "sending classification request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IntentError::Request {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| IntentError::Request {
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(IntentError::Request {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| IntentError::Parse {
            reason: format!("response is not JSON: {e}"),
        })?;

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| IntentError::Parse {
                reason: "missing choices[0].message.content in response".to_string(),
            })
    }
}

#[async_trait]
impl ClassificationService for ChatClassifier {
    async fn classify_intent(&self, user_input: &str) -> Result<IntentClassification> {
        let reply = self.complete(INTENT_PROMPT, user_input).await?;
        parse_intent_reply(&reply)
    }

    async fn extract_entities(&self, user_input: &str) -> Result<ExtractedEntities> {
        let reply = self.complete(ENTITY_PROMPT, user_input).await?;
        parse_entity_reply(&reply)
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Strip an optional markdown code fence wrapped around a model reply.
fn strip_code_fences(raw: &str) -> &str {
    let cleaned = raw.trim();
    let cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    cleaned.trim()
}

/// Parse an intent-classification reply and validate its contract.
pub fn parse_intent_reply(raw: &str) -> Result<IntentClassification> {
    let cleaned = strip_code_fences(raw);

    let parsed: IntentClassification =
        serde_json::from_str(cleaned).map_err(|e| IntentError::Parse {
            reason: format!("intent reply is not the expected JSON: {e}"),
        })?;

    if parsed.intent.trim().is_empty() {
        return Err(IntentError::Invalid {
            reason: "empty intent label".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&parsed.confidence) {
        return Err(IntentError::Invalid {
            reason: format!("confidence {} out of range", parsed.confidence),
        });
    }

    Ok(parsed)
}

/// Parse an entity-extraction reply. Empty-string slots are normalized to
/// absent, because models frequently emit `""` instead of `null`.
pub fn parse_entity_reply(raw: &str) -> Result<ExtractedEntities> {
    let cleaned = strip_code_fences(raw);

    let parsed: ExtractedEntities =
        serde_json::from_str(cleaned).map_err(|e| IntentError::Parse {
            reason: format!("entity reply is not the expected JSON: {e}"),
        })?;

    Ok(ExtractedEntities {
        city_name: clean_slot(parsed.city_name),
        device_name: clean_slot(parsed.device_name),
        action: clean_slot(parsed.action),
        time_expression: clean_slot(parsed.time_expression),
        location: clean_slot(parsed.location),
    })
}

fn clean_slot(slot: Option<String>) -> Option<String> {
    slot.filter(|s| !s.trim().is_empty())
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
