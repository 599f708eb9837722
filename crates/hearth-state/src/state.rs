//! Per-turn conversation state and its merge rules.
//!
//! A turn starts from a fresh [`ConversationState`] holding the raw user
//! input. The classifier and exactly one workflow node each contribute a
//! [`StateUpdate`]; [`ConversationState::apply`] merges updates with explicit
//! per-field rules so later writers extend earlier ones instead of silently
//! clobbering them. The raw `user_input`, `turn_id`, and `timestamp` are
//! fixed at turn creation and cannot be touched by any update.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Module-data keys
// ---------------------------------------------------------------------------

/// Well-known `module_data` keys shared across pipeline steps.
///
/// Any key not listed here belongs to a single writer and is named after it
/// (for example the weather node writes its payload under `"weather"`).
pub mod keys {
    /// Classifier confidence in the chosen intent, in `[0.0, 1.0]`.
    pub const INTENT_CONFIDENCE: &str = "intent_confidence";
    /// Whether the router must divert this turn to clarification.
    pub const REQUIRES_CLARIFICATION: &str = "requires_clarification";
    /// The question to ask the user when clarification is required.
    pub const CLARIFICATION_QUESTION: &str = "clarification_question";
    /// Which classification path ran: `"model"` or `"fallback"`.
    pub const CLASSIFICATION_SOURCE: &str = "classification_source";
    /// Set by a node that ended the turn waiting for more detail.
    pub const AWAITING_CLARIFICATION: &str = "awaiting_clarification";
}

// ---------------------------------------------------------------------------
// Workflow identifiers
// ---------------------------------------------------------------------------

/// The closed set of workflows a turn can be routed to.
///
/// The router owns the intent-label → `WorkflowId` table; everything else
/// treats this as an opaque identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowId {
    #[serde(rename = "weather_workflow")]
    Weather,
    #[serde(rename = "information_workflow")]
    Information,
    #[serde(rename = "device_control_workflow")]
    DeviceControl,
    #[serde(rename = "scene_workflow")]
    Scene,
    #[serde(rename = "schedule_workflow")]
    Schedule,
    #[serde(rename = "emergency_workflow")]
    Emergency,
    #[serde(rename = "general_chat_workflow")]
    GeneralChat,
    #[serde(rename = "clarification_workflow")]
    Clarification,
}

impl WorkflowId {
    /// Stable string form, used in logs and in `active_workflow`.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowId::Weather => "weather_workflow",
            WorkflowId::Information => "information_workflow",
            WorkflowId::DeviceControl => "device_control_workflow",
            WorkflowId::Scene => "scene_workflow",
            WorkflowId::Schedule => "schedule_workflow",
            WorkflowId::Emergency => "emergency_workflow",
            WorkflowId::GeneralChat => "general_chat_workflow",
            WorkflowId::Clarification => "clarification_workflow",
        }
    }

    /// All workflow identifiers, in routing-table order.
    pub fn all() -> &'static [WorkflowId] {
        &[
            WorkflowId::Weather,
            WorkflowId::Information,
            WorkflowId::DeviceControl,
            WorkflowId::Scene,
            WorkflowId::Schedule,
            WorkflowId::Emergency,
            WorkflowId::GeneralChat,
            WorkflowId::Clarification,
        ]
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Extracted entities
// ---------------------------------------------------------------------------

/// The fixed entity slots the classifier can fill from an utterance.
///
/// Absent means "not found in this utterance". Slot values are kept verbatim
/// as the classifier produced them; nodes interpret them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    /// City a weather or information query refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_name: Option<String>,

    /// Device a control command targets ("客厅的灯", "空调", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// Action to perform ("打开", "关闭", ...) or scene name to activate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Time expression for schedules and reminders ("明天早上八点", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_expression: Option<String>,

    /// Location within the home ("客厅", "卧室", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ExtractedEntities {
    /// True when no slot is filled.
    pub fn is_empty(&self) -> bool {
        self.city_name.is_none()
            && self.device_name.is_none()
            && self.action.is_none()
            && self.time_expression.is_none()
            && self.location.is_none()
    }

    /// Merge `newer` into `self`: a filled slot in `newer` overrides the same
    /// slot here, an empty slot in `newer` leaves the prior value alone.
    pub fn merge(&mut self, newer: ExtractedEntities) {
        if newer.city_name.is_some() {
            self.city_name = newer.city_name;
        }
        if newer.device_name.is_some() {
            self.device_name = newer.device_name;
        }
        if newer.action.is_some() {
            self.action = newer.action;
        }
        if newer.time_expression.is_some() {
            self.time_expression = newer.time_expression;
        }
        if newer.location.is_some() {
            self.location = newer.location;
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation state
// ---------------------------------------------------------------------------

/// The unit of work threaded through one turn of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Turn identifier for log correlation.
    pub turn_id: Uuid,

    /// The raw user utterance, stored verbatim at turn creation and never
    /// overwritten by any later step.
    pub user_input: String,

    /// Intent label chosen by the classifier; empty until classification.
    #[serde(default)]
    pub primary_intent: String,

    /// Entity slots filled by the classifier (and carried over from a prior
    /// turn when the caller continues a conversation).
    #[serde(default)]
    pub extracted_entities: ExtractedEntities,

    /// Scratch space for per-step payloads; see [`keys`] for shared keys.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub module_data: Map<String, Value>,

    /// Final natural-language output; empty until a workflow node sets it.
    #[serde(default)]
    pub assistant_response: String,

    /// Workflow chosen by the router, recorded for observability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_workflow: Option<WorkflowId>,

    /// Set when a node failed in a way it could not silently recover from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// RFC 3339 turn creation time, set once.
    pub timestamp: String,
}

impl ConversationState {
    /// Start a fresh turn for `user_input`.
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            turn_id: Uuid::now_v7(),
            user_input: user_input.into(),
            primary_intent: String::new(),
            extracted_entities: ExtractedEntities::default(),
            module_data: Map::new(),
            assistant_response: String::new(),
            active_workflow: None,
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Start a turn that continues from `prior`.
    ///
    /// Only the entity slots carry over, so an answer to a clarification
    /// question can fill a slot the previous turn was missing. Intent,
    /// module data, and the response always start empty.
    pub fn continuing(user_input: impl Into<String>, prior: &ConversationState) -> Self {
        let mut state = Self::new(user_input);
        state.extracted_entities = prior.extracted_entities.clone();
        state
    }

    /// True once the classifier has set an intent.
    pub fn classified(&self) -> bool {
        !self.primary_intent.is_empty()
    }

    /// Classifier confidence, when recorded.
    pub fn intent_confidence(&self) -> Option<f64> {
        self.module_data.get(keys::INTENT_CONFIDENCE).and_then(Value::as_f64)
    }

    /// Whether the classifier asked for clarification. Defaults to `false`
    /// when unset.
    pub fn requires_clarification(&self) -> bool {
        self.module_data
            .get(keys::REQUIRES_CLARIFICATION)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The clarification question recorded by the classifier, if any.
    pub fn clarification_question(&self) -> Option<&str> {
        self.module_data
            .get(keys::CLARIFICATION_QUESTION)
            .and_then(Value::as_str)
    }

    /// Merge a partial update into this state.
    ///
    /// Rules, per field:
    /// - `primary_intent`, `assistant_response`, `active_workflow`, `error`:
    ///   overwrite when the update carries a value, keep otherwise.
    /// - `extracted_entities`: slot-wise merge ([`ExtractedEntities::merge`]).
    /// - `module_data`: key-wise insert; the same key overrides, other keys
    ///   survive.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(intent) = update.primary_intent {
            self.primary_intent = intent;
        }
        self.extracted_entities.merge(update.extracted_entities);
        for (key, value) in update.module_data {
            self.module_data.insert(key, value);
        }
        if let Some(response) = update.assistant_response {
            self.assistant_response = response;
        }
        if let Some(workflow) = update.active_workflow {
            self.active_workflow = Some(workflow);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
    }
}

// ---------------------------------------------------------------------------
// State updates
// ---------------------------------------------------------------------------

/// A typed partial update contributed by the classifier or a workflow node.
///
/// Absent fields leave the state untouched; `user_input`, `turn_id`, and
/// `timestamp` are not representable here and therefore cannot be changed
/// after turn creation.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub primary_intent: Option<String>,
    pub extracted_entities: ExtractedEntities,
    pub module_data: Map<String, Value>,
    pub assistant_response: Option<String>,
    pub active_workflow: Option<WorkflowId>,
    pub error: Option<String>,
}

impl StateUpdate {
    /// An update that changes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set the classified intent label.
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.primary_intent = Some(intent.into());
        self
    }

    /// Set the entity slots to merge in.
    pub fn with_entities(mut self, entities: ExtractedEntities) -> Self {
        self.extracted_entities = entities;
        self
    }

    /// Record one module-data entry.
    pub fn with_module_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.module_data.insert(key.into(), value);
        self
    }

    /// Set the assistant response.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.assistant_response = Some(response.into());
        self
    }

    /// Record the routed workflow.
    pub fn with_workflow(mut self, workflow: WorkflowId) -> Self {
        self.active_workflow = Some(workflow);
        self
    }

    /// Record a non-recoverable node failure.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
