//! Schedule and reminder node.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use hearth_state::{ConversationState, StateUpdate, WorkflowId, keys};

use super::WorkflowNode;

/// Confirms a reminder when the turn carries a time expression, otherwise
/// asks for one. Persisting and firing reminders is the job of the home's
/// scheduler service, not this node.
pub struct ScheduleNode;

#[async_trait]
impl WorkflowNode for ScheduleNode {
    fn id(&self) -> WorkflowId {
        WorkflowId::Schedule
    }

    async fn run(&self, state: &ConversationState) -> StateUpdate {
        let entities = &state.extracted_entities;

        let Some(time) = entities.time_expression.as_deref() else {
            debug!("schedule request without a time expression");
            return StateUpdate::none()
                .with_module_data(keys::AWAITING_CLARIFICATION, json!(true))
                .with_response("请问您想在什么时间设置提醒？");
        };

        let response = match entities.action.as_deref() {
            Some(action) => format!("⏰ 好的，将在{time}提醒您{action}。"),
            None => format!("⏰ 好的，已为您设置{time}的提醒。"),
        };

        StateUpdate::none()
            .with_module_data(
                "schedule",
                json!({
                    "time_expression": time,
                    "action": entities.action,
                }),
            )
            .with_response(response)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
