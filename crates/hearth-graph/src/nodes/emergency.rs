//! Emergency alert node.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use hearth_state::{ConversationState, StateUpdate, WorkflowId};

use super::WorkflowNode;

/// Acknowledges an emergency immediately. Never asks follow-up questions:
/// in an emergency a counter-question costs time, so the node acknowledges
/// with whatever context it has.
pub struct EmergencyNode;

#[async_trait]
impl WorkflowNode for EmergencyNode {
    fn id(&self) -> WorkflowId {
        WorkflowId::Emergency
    }

    async fn run(&self, state: &ConversationState) -> StateUpdate {
        warn!(turn_id = %state.turn_id, input = %state.user_input, "emergency alert raised");

        StateUpdate::none()
            .with_module_data(
                "emergency",
                json!({
                    "acknowledged": true,
                    "location": state.extracted_entities.location,
                }),
            )
            .with_response("🚨 已收到您的紧急求助，正在通知您的紧急联系人，请保持冷静并确保自身安全。")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acknowledges_without_follow_up() {
        let state = ConversationState::new("家里煤气泄漏了");

        let update = EmergencyNode.run(&state).await;

        let response = update.assistant_response.as_deref().unwrap();
        assert!(response.starts_with("🚨"));
        assert_eq!(update.module_data["emergency"]["acknowledged"], true);
    }
}
