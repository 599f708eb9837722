//! Device control and scene activation nodes.
//!
//! Both are pure: they confirm the command when the required entities are
//! present and ask a follow-up question otherwise. Actual device side
//! effects live behind the home's own automation bus, outside this crate.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use hearth_state::{ConversationState, StateUpdate, WorkflowId, keys};

use super::WorkflowNode;

// ---------------------------------------------------------------------------
// Device control
// ---------------------------------------------------------------------------

/// Confirms a device command, or asks which device/action is meant.
pub struct DeviceControlNode;

#[async_trait]
impl WorkflowNode for DeviceControlNode {
    fn id(&self) -> WorkflowId {
        WorkflowId::DeviceControl
    }

    async fn run(&self, state: &ConversationState) -> StateUpdate {
        let entities = &state.extracted_entities;

        match (entities.device_name.as_deref(), entities.action.as_deref()) {
            (Some(device), Some(action)) => StateUpdate::none()
                .with_module_data(
                    "device_control",
                    json!({
                        "device": device,
                        "action": action,
                        "location": entities.location,
                    }),
                )
                .with_response(format!("✅ 已{action}{device}。")),
            (device, action) => {
                debug!(
                    has_device = device.is_some(),
                    has_action = action.is_some(),
                    "device control entities incomplete"
                );
                StateUpdate::none()
                    .with_module_data(keys::AWAITING_CLARIFICATION, json!(true))
                    .with_response("请告诉我您想控制哪个设备，执行什么操作？")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scene activation
// ---------------------------------------------------------------------------

/// Confirms a scene activation, or asks which scene is meant. The scene
/// name arrives in the `action` entity slot.
pub struct SceneNode;

#[async_trait]
impl WorkflowNode for SceneNode {
    fn id(&self) -> WorkflowId {
        WorkflowId::Scene
    }

    async fn run(&self, state: &ConversationState) -> StateUpdate {
        match state.extracted_entities.action.as_deref() {
            Some(scene) => StateUpdate::none()
                .with_module_data("scene", json!({ "name": scene }))
                .with_response(format!("✅ 已为您激活{scene}模式。")),
            None => StateUpdate::none()
                .with_module_data(keys::AWAITING_CLARIFICATION, json!(true))
                .with_response("请问您想激活哪个场景模式？"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use hearth_state::ExtractedEntities;

    use super::*;

    fn state_with_entities(entities: ExtractedEntities) -> ConversationState {
        let mut state = ConversationState::new("测试输入");
        state.extracted_entities = entities;
        state
    }

    #[tokio::test]
    async fn confirms_complete_device_command() {
        let state = state_with_entities(ExtractedEntities {
            device_name: Some("客厅的灯".to_string()),
            action: Some("打开".to_string()),
            ..ExtractedEntities::default()
        });

        let update = DeviceControlNode.run(&state).await;

        assert_eq!(
            update.assistant_response.as_deref(),
            Some("✅ 已打开客厅的灯。")
        );
        assert_eq!(update.module_data["device_control"]["device"], "客厅的灯");
        assert!(!update.module_data.contains_key(keys::AWAITING_CLARIFICATION));
    }

    #[tokio::test]
    async fn asks_when_device_missing() {
        let state = state_with_entities(ExtractedEntities {
            action: Some("打开".to_string()),
            ..ExtractedEntities::default()
        });

        let update = DeviceControlNode.run(&state).await;

        assert_eq!(
            update.assistant_response.as_deref(),
            Some("请告诉我您想控制哪个设备，执行什么操作？")
        );
        assert_eq!(update.module_data[keys::AWAITING_CLARIFICATION], true);
    }

    #[tokio::test]
    async fn asks_when_action_missing() {
        let state = state_with_entities(ExtractedEntities {
            device_name: Some("空调".to_string()),
            ..ExtractedEntities::default()
        });

        let update = DeviceControlNode.run(&state).await;

        assert_eq!(
            update.assistant_response.as_deref(),
            Some("请告诉我您想控制哪个设备，执行什么操作？")
        );
    }

    #[tokio::test]
    async fn activates_named_scene() {
        let state = state_with_entities(ExtractedEntities {
            action: Some("影院".to_string()),
            ..ExtractedEntities::default()
        });

        let update = SceneNode.run(&state).await;

        assert_eq!(
            update.assistant_response.as_deref(),
            Some("✅ 已为您激活影院模式。")
        );
        assert_eq!(update.module_data["scene"]["name"], "影院");
    }

    #[tokio::test]
    async fn asks_which_scene_when_unnamed() {
        let state = state_with_entities(ExtractedEntities::default());

        let update = SceneNode.run(&state).await;

        assert_eq!(
            update.assistant_response.as_deref(),
            Some("请问您想激活哪个场景模式？")
        );
        assert_eq!(update.module_data[keys::AWAITING_CLARIFICATION], true);
    }
}
