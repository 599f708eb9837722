//! General chat and clarification nodes.

use async_trait::async_trait;
use serde_json::json;

use hearth_state::{ConversationState, StateUpdate, WorkflowId, keys};

use super::WorkflowNode;

/// Canned replies, matched exactly against the trimmed utterance.
const CANNED_REPLIES: &[(&str, &str)] = &[
    (
        "你好",
        "您好！我是您的家庭助手，可以帮您查询天气、控制设备、管理日程等。",
    ),
    (
        "你是谁",
        "我是您的智能家庭助手，专注于家居环境管理和生活便利服务。",
    ),
    ("谢谢", "不客气！随时为您服务。"),
];

/// Reply for anything the canned table does not cover.
const DEFAULT_CHAT_REPLY: &str = "我理解您的意思，但还在学习如何更好地为您服务。";

/// Question asked when the classifier wanted clarification but recorded no
/// question of its own.
const DEFAULT_CLARIFICATION_QUESTION: &str = "请提供更多详细信息以便我更好地帮助您。";

// ---------------------------------------------------------------------------
// General chat
// ---------------------------------------------------------------------------

/// Small-talk sink for greetings and anything unrecognized.
pub struct GeneralChatNode;

#[async_trait]
impl WorkflowNode for GeneralChatNode {
    fn id(&self) -> WorkflowId {
        WorkflowId::GeneralChat
    }

    async fn run(&self, state: &ConversationState) -> StateUpdate {
        let trimmed = state.user_input.trim();

        let reply = CANNED_REPLIES
            .iter()
            .find(|(pattern, _)| *pattern == trimmed)
            .map(|(_, reply)| *reply)
            .unwrap_or(DEFAULT_CHAT_REPLY);

        StateUpdate::none().with_response(reply)
    }
}

// ---------------------------------------------------------------------------
// Clarification
// ---------------------------------------------------------------------------

/// Asks the question the classifier recorded, or a default one.
pub struct ClarificationNode;

#[async_trait]
impl WorkflowNode for ClarificationNode {
    fn id(&self) -> WorkflowId {
        WorkflowId::Clarification
    }

    async fn run(&self, state: &ConversationState) -> StateUpdate {
        let question = state
            .clarification_question()
            .unwrap_or(DEFAULT_CLARIFICATION_QUESTION);

        StateUpdate::none()
            .with_module_data(keys::AWAITING_CLARIFICATION, json!(true))
            .with_response(question)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use hearth_state::keys;

    use super::*;

    #[tokio::test]
    async fn greets_on_exact_match() {
        let state = ConversationState::new("你好");

        let update = GeneralChatNode.run(&state).await;

        assert_eq!(
            update.assistant_response.as_deref(),
            Some("您好！我是您的家庭助手，可以帮您查询天气、控制设备、管理日程等。")
        );
    }

    #[tokio::test]
    async fn matching_trims_surrounding_whitespace() {
        let state = ConversationState::new("  谢谢  ");

        let update = GeneralChatNode.run(&state).await;

        assert_eq!(
            update.assistant_response.as_deref(),
            Some("不客气！随时为您服务。")
        );
    }

    #[tokio::test]
    async fn unmatched_input_gets_default_reply() {
        let state = ConversationState::new("给我讲个笑话");

        let update = GeneralChatNode.run(&state).await;

        assert_eq!(update.assistant_response.as_deref(), Some(DEFAULT_CHAT_REPLY));
    }

    #[tokio::test]
    async fn clarification_echoes_recorded_question() {
        let mut state = ConversationState::new("调一下");
        state.module_data.insert(
            keys::CLARIFICATION_QUESTION.to_string(),
            json!("您想调节哪个设备？"),
        );

        let update = ClarificationNode.run(&state).await;

        assert_eq!(
            update.assistant_response.as_deref(),
            Some("您想调节哪个设备？")
        );
        assert_eq!(update.module_data[keys::AWAITING_CLARIFICATION], true);
    }

    #[tokio::test]
    async fn clarification_falls_back_to_default_question() {
        let state = ConversationState::new("呃");

        let update = ClarificationNode.run(&state).await;

        assert_eq!(
            update.assistant_response.as_deref(),
            Some(DEFAULT_CLARIFICATION_QUESTION)
        );
    }
}
