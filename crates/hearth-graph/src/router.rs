//! Intent-to-workflow routing.

use tracing::debug;

use hearth_intent::intents;
use hearth_state::WorkflowId;

/// Map a classified intent to the workflow that handles it.
///
/// Total and pure: every `(intent, requires_clarification)` pair maps to
/// exactly one workflow. A turn flagged for clarification routes to the
/// clarification workflow regardless of its intent, and unknown intent
/// labels fall through to general chat instead of failing the turn.
pub fn route(primary_intent: &str, requires_clarification: bool) -> WorkflowId {
    if requires_clarification {
        return WorkflowId::Clarification;
    }

    match primary_intent {
        intents::WEATHER_QUERY => WorkflowId::Weather,
        intents::INFORMATION_QUERY => WorkflowId::Information,
        intents::DEVICE_CONTROL => WorkflowId::DeviceControl,
        intents::SCENE_ACTIVATION => WorkflowId::Scene,
        intents::SCHEDULE_MANAGEMENT => WorkflowId::Schedule,
        intents::EMERGENCY_ALERT => WorkflowId::Emergency,
        intents::GENERAL_CHAT => WorkflowId::GeneralChat,
        other => {
            debug!(intent = other, "unknown intent label, routing to general chat");
            WorkflowId::GeneralChat
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
