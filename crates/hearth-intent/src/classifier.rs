//! Turn classification with a keyword fallback.
//!
//! [`IntentClassifier`] wraps a [`ClassificationService`] and guarantees a
//! usable classification for every turn:
//!
//! - **Primary path** -- ask the service for an intent and for entity slots,
//!   then fold both into one [`StateUpdate`].
//! - **Fallback path** -- on *any* service error, scan the utterance against
//!   an ordered keyword table and classify from the first matching row.
//!
//! The fallback is tuned for recall, not precision: a degraded assistant
//! that answers "which device?" beats one that answers nothing.

use std::sync::Arc;

use aho_corasick::AhoCorasick;
use serde_json::json;
use tracing::{debug, error, warn};

use hearth_state::{ConversationState, StateUpdate, keys};

use crate::client::ClassificationService;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Intent labels
// ---------------------------------------------------------------------------

/// The closed set of intent labels the assistant understands.
pub mod intents {
    /// Weather and temperature questions.
    pub const WEATHER_QUERY: &str = "weather_query";
    /// Turning devices on/off or adjusting them.
    pub const DEVICE_CONTROL: &str = "device_control";
    /// Reminders, alarms and calendar entries.
    pub const SCHEDULE_MANAGEMENT: &str = "schedule_management";
    /// General knowledge lookup.
    pub const INFORMATION_QUERY: &str = "information_query";
    /// Emergencies and calls for help.
    pub const EMERGENCY_ALERT: &str = "emergency_alert";
    /// Activating a named scene or mode.
    pub const SCENE_ACTIVATION: &str = "scene_activation";
    /// Greetings, small talk, and everything unrecognized.
    pub const GENERAL_CHAT: &str = "general_chat";
}

// ---------------------------------------------------------------------------
// Fallback keyword table
// ---------------------------------------------------------------------------

/// Ordered keyword table for the fallback path. The first row with any
/// keyword occurring anywhere in the utterance wins; rows earlier in the
/// table take priority when several match.
const FALLBACK_TABLE: &[(&str, &[&str])] = &[
    (
        intents::WEATHER_QUERY,
        &["天气", "气温", "温度", "下雨", "下雪", "weather"],
    ),
    (
        intents::DEVICE_CONTROL,
        &["打开", "关闭", "调", "开灯", "关灯", "启动", "停止"],
    ),
    (
        intents::SCHEDULE_MANAGEMENT,
        &["提醒", "定时", "日程", "闹钟"],
    ),
    (intents::GENERAL_CHAT, &["你好", "嗨", "你是谁", "帮助"]),
];

/// Confidence assigned when a fallback keyword matches.
const FALLBACK_MATCH_CONFIDENCE: f64 = 0.7;

/// Confidence assigned when nothing matches and the turn defaults to chat.
const FALLBACK_DEFAULT_CONFIDENCE: f64 = 0.5;

// ---------------------------------------------------------------------------
// Classification source
// ---------------------------------------------------------------------------

/// Which path produced the turn's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    /// The classification service answered.
    Model,
    /// The keyword fallback answered.
    Fallback,
}

impl ClassificationSource {
    /// The value recorded under [`keys::CLASSIFICATION_SOURCE`].
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::Model => "model",
            ClassificationSource::Fallback => "fallback",
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Infallible turn classifier.
pub struct IntentClassifier {
    service: Arc<dyn ClassificationService>,

    /// Automaton over every fallback keyword, `None` if the build failed
    /// (the fallback then defaults every turn to general chat).
    matcher: Option<AhoCorasick>,

    /// Maps automaton pattern index to its row in [`FALLBACK_TABLE`].
    pattern_rows: Vec<usize>,
}

impl IntentClassifier {
    /// Build a classifier around the given service.
    pub fn new(service: Arc<dyn ClassificationService>) -> Self {
        let mut patterns = Vec::new();
        let mut pattern_rows = Vec::new();
        for (row, (_, keywords)) in FALLBACK_TABLE.iter().enumerate() {
            for keyword in *keywords {
                patterns.push(*keyword);
                pattern_rows.push(row);
            }
        }

        let matcher = match AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&patterns)
        {
            Ok(automaton) => Some(automaton),
            Err(e) => {
                error!(error = %e, "failed to build fallback keyword automaton");
                None
            }
        };

        Self {
            service,
            matcher,
            pattern_rows,
        }
    }

    /// Classify the turn held in `state` into a [`StateUpdate`].
    ///
    /// Never fails: any primary-path error is logged and absorbed by the
    /// keyword fallback.
    pub async fn classify(&self, state: &ConversationState) -> StateUpdate {
        match self.classify_via_service(&state.user_input).await {
            Ok(update) => update,
            Err(e) => {
                warn!(
                    turn_id = %state.turn_id,
                    error = %e,
                    "classification service failed, using keyword fallback"
                );
                self.fallback(&state.user_input)
            }
        }
    }

    /// Classify via keyword matching alone.
    ///
    /// Exposed so callers can probe the fallback table directly; the normal
    /// entry point is [`IntentClassifier::classify`].
    pub fn fallback(&self, user_input: &str) -> StateUpdate {
        let matched_row = self.matcher.as_ref().and_then(|automaton| {
            automaton
                .find_overlapping_iter(user_input)
                .map(|m| self.pattern_rows[m.pattern().as_usize()])
                .min()
        });

        match matched_row {
            Some(row) => {
                let intent = FALLBACK_TABLE[row].0;
                debug!(intent, "fallback keyword matched");
                StateUpdate::none()
                    .with_intent(intent)
                    .with_module_data(keys::INTENT_CONFIDENCE, json!(FALLBACK_MATCH_CONFIDENCE))
                    .with_module_data(keys::REQUIRES_CLARIFICATION, json!(false))
                    .with_module_data(
                        keys::CLASSIFICATION_SOURCE,
                        json!(ClassificationSource::Fallback.as_str()),
                    )
            }
            None => {
                debug!("fallback matched nothing, defaulting to general chat");
                // No clarification question here: the clarification workflow
                // supplies its default when the key is absent.
                StateUpdate::none()
                    .with_intent(intents::GENERAL_CHAT)
                    .with_module_data(keys::INTENT_CONFIDENCE, json!(FALLBACK_DEFAULT_CONFIDENCE))
                    .with_module_data(keys::REQUIRES_CLARIFICATION, json!(true))
                    .with_module_data(
                        keys::CLASSIFICATION_SOURCE,
                        json!(ClassificationSource::Fallback.as_str()),
                    )
            }
        }
    }

    async fn classify_via_service(&self, user_input: &str) -> Result<StateUpdate> {
        let classification = self.service.classify_intent(user_input).await?;
        let entities = self.service.extract_entities(user_input).await?;

        debug!(
            intent = %classification.intent,
            confidence = classification.confidence,
            "model classification"
        );

        let mut update = StateUpdate::none()
            .with_intent(classification.intent)
            .with_entities(entities)
            .with_module_data(keys::INTENT_CONFIDENCE, json!(classification.confidence))
            .with_module_data(
                keys::REQUIRES_CLARIFICATION,
                json!(classification.requires_clarification),
            )
            .with_module_data(
                keys::CLASSIFICATION_SOURCE,
                json!(ClassificationSource::Model.as_str()),
            );

        if let Some(question) = classification.clarification_question {
            update = update.with_module_data(keys::CLARIFICATION_QUESTION, json!(question));
        }

        Ok(update)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use hearth_state::ExtractedEntities;

    use super::*;
    use crate::client::IntentClassification;
    use crate::error::IntentError;

    /// Service that always fails, forcing the keyword fallback.
    struct FailingService;

    #[async_trait]
    impl ClassificationService for FailingService {
        async fn classify_intent(&self, _user_input: &str) -> Result<IntentClassification> {
            Err(IntentError::Request {
                reason: "connection refused".to_string(),
            })
        }

        async fn extract_entities(&self, _user_input: &str) -> Result<ExtractedEntities> {
            Err(IntentError::Request {
                reason: "connection refused".to_string(),
            })
        }
    }

    /// Service that answers intents but fails entity extraction.
    struct HalfBrokenService;

    #[async_trait]
    impl ClassificationService for HalfBrokenService {
        async fn classify_intent(&self, _user_input: &str) -> Result<IntentClassification> {
            Ok(IntentClassification {
                intent: intents::WEATHER_QUERY.to_string(),
                confidence: 0.93,
                requires_clarification: false,
                clarification_question: None,
            })
        }

        async fn extract_entities(&self, _user_input: &str) -> Result<ExtractedEntities> {
            Err(IntentError::Parse {
                reason: "garbage reply".to_string(),
            })
        }
    }

    /// Service with a scripted successful answer.
    struct ScriptedService;

    #[async_trait]
    impl ClassificationService for ScriptedService {
        async fn classify_intent(&self, _user_input: &str) -> Result<IntentClassification> {
            Ok(IntentClassification {
                intent: intents::DEVICE_CONTROL.to_string(),
                confidence: 0.95,
                requires_clarification: false,
                clarification_question: None,
            })
        }

        async fn extract_entities(&self, _user_input: &str) -> Result<ExtractedEntities> {
            Ok(ExtractedEntities {
                device_name: Some("灯".to_string()),
                action: Some("打开".to_string()),
                location: Some("客厅".to_string()),
                ..ExtractedEntities::default()
            })
        }
    }

    fn classified(update: &StateUpdate) -> (&str, f64, bool, &str) {
        let intent = update.primary_intent.as_deref().unwrap();
        let confidence = update.module_data[keys::INTENT_CONFIDENCE].as_f64().unwrap();
        let clarify = update.module_data[keys::REQUIRES_CLARIFICATION]
            .as_bool()
            .unwrap();
        let source = update.module_data[keys::CLASSIFICATION_SOURCE]
            .as_str()
            .unwrap();
        (intent, confidence, clarify, source)
    }

    #[tokio::test]
    async fn fallback_classifies_weather_keywords() {
        let classifier = IntentClassifier::new(Arc::new(FailingService));
        let state = ConversationState::new("今天天气怎么样");

        let update = classifier.classify(&state).await;

        let (intent, confidence, clarify, source) = classified(&update);
        assert_eq!(intent, intents::WEATHER_QUERY);
        assert!((confidence - 0.7).abs() < f64::EPSILON);
        assert!(!clarify);
        assert_eq!(source, "fallback");
        assert!(update.extracted_entities.is_empty());
    }

    #[tokio::test]
    async fn fallback_classifies_device_keywords() {
        let classifier = IntentClassifier::new(Arc::new(FailingService));
        let state = ConversationState::new("把客厅的灯打开");

        let update = classifier.classify(&state).await;

        let (intent, _, clarify, source) = classified(&update);
        assert_eq!(intent, intents::DEVICE_CONTROL);
        assert!(!clarify);
        assert_eq!(source, "fallback");
    }

    #[tokio::test]
    async fn fallback_defaults_to_general_chat_with_clarification() {
        let classifier = IntentClassifier::new(Arc::new(FailingService));
        let state = ConversationState::new("呃");

        let update = classifier.classify(&state).await;

        let (intent, confidence, clarify, source) = classified(&update);
        assert_eq!(intent, intents::GENERAL_CHAT);
        assert!((confidence - 0.5).abs() < f64::EPSILON);
        assert!(clarify);
        assert_eq!(source, "fallback");
        // The fallback never invents a question; the clarification workflow
        // provides its default instead.
        assert!(!update.module_data.contains_key(keys::CLARIFICATION_QUESTION));
    }

    #[tokio::test]
    async fn fallback_prefers_earlier_table_rows() {
        let classifier = IntentClassifier::new(Arc::new(FailingService));
        // Contains keywords of both the weather row and the device row;
        // the weather row comes first in the table and must win.
        let state = ConversationState::new("天气冷了请打开暖气");

        let update = classifier.classify(&state).await;

        assert_eq!(
            update.primary_intent.as_deref(),
            Some(intents::WEATHER_QUERY)
        );
    }

    #[tokio::test]
    async fn fallback_matches_ascii_keywords_case_insensitively() {
        let classifier = IntentClassifier::new(Arc::new(FailingService));
        let state = ConversationState::new("What's the WEATHER like tomorrow?");

        let update = classifier.classify(&state).await;

        assert_eq!(
            update.primary_intent.as_deref(),
            Some(intents::WEATHER_QUERY)
        );
    }

    #[tokio::test]
    async fn entity_extraction_failure_falls_back_entirely() {
        let classifier = IntentClassifier::new(Arc::new(HalfBrokenService));
        let state = ConversationState::new("把客厅的灯打开");

        let update = classifier.classify(&state).await;

        // The half-answered model result is discarded; the fallback row for
        // device keywords wins.
        let (intent, _, _, source) = classified(&update);
        assert_eq!(intent, intents::DEVICE_CONTROL);
        assert_eq!(source, "fallback");
    }

    #[tokio::test]
    async fn model_classification_carries_entities_and_source() {
        let classifier = IntentClassifier::new(Arc::new(ScriptedService));
        let state = ConversationState::new("把客厅的灯打开");

        let update = classifier.classify(&state).await;

        let (intent, confidence, clarify, source) = classified(&update);
        assert_eq!(intent, intents::DEVICE_CONTROL);
        assert!((confidence - 0.95).abs() < f64::EPSILON);
        assert!(!clarify);
        assert_eq!(source, "model");
        assert_eq!(update.extracted_entities.device_name.as_deref(), Some("灯"));
        assert_eq!(update.extracted_entities.action.as_deref(), Some("打开"));
        assert_eq!(
            update.extracted_entities.location.as_deref(),
            Some("客厅")
        );
    }

    #[test]
    fn direct_fallback_probe_is_synchronous() {
        let classifier = IntentClassifier::new(Arc::new(FailingService));

        let update = classifier.fallback("提醒我明天开会");

        assert_eq!(
            update.primary_intent.as_deref(),
            Some(intents::SCHEDULE_MANAGEMENT)
        );
    }
}
