//! Workflow nodes.
//!
//! Each node handles exactly one workflow and produces a [`StateUpdate`]
//! for the turn. Nodes are infallible by contract: whatever goes wrong
//! inside (missing capability, remote failure, missing entities) turns into
//! a degraded or clarifying response, never an error out of the node.

mod chat;
mod control;
mod emergency;
mod information;
mod schedule;

pub use chat::{ClarificationNode, GeneralChatNode};
pub use control::{DeviceControlNode, SceneNode};
pub use emergency::EmergencyNode;
pub use information::{InformationNode, WeatherNode};
pub use schedule::ScheduleNode;

use std::sync::Arc;

use async_trait::async_trait;

use hearth_capability::CapabilityCatalog;
use hearth_state::{ConversationState, StateUpdate, WorkflowId};

/// One workflow handler.
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    /// The workflow this node implements.
    fn id(&self) -> WorkflowId;

    /// Produce the node's update for the turn.
    async fn run(&self, state: &ConversationState) -> StateUpdate;
}

/// Build the full production node set.
pub fn standard_nodes(
    catalog: Arc<CapabilityCatalog>,
    default_city: &str,
) -> Vec<Arc<dyn WorkflowNode>> {
    vec![
        Arc::new(WeatherNode::new(Arc::clone(&catalog), default_city)),
        Arc::new(InformationNode::new(catalog)),
        Arc::new(DeviceControlNode),
        Arc::new(SceneNode),
        Arc::new(ScheduleNode),
        Arc::new(EmergencyNode),
        Arc::new(GeneralChatNode),
        Arc::new(ClarificationNode),
    ]
}

#[cfg(test)]
mod tests {
    use hearth_capability::{ArgStrictness, SessionConfig, SessionManager};

    use super::*;

    #[test]
    fn standard_set_covers_every_workflow() {
        let endpoint = "http://127.0.0.1:9".parse().unwrap();
        let session = SessionManager::new(SessionConfig::new(endpoint)).unwrap();
        let catalog = Arc::new(CapabilityCatalog::new(
            Arc::new(session),
            ArgStrictness::Lenient,
        ));

        let nodes = standard_nodes(catalog, "东莞");
        let mut ids: Vec<&str> = nodes.iter().map(|n| n.id().as_str()).collect();
        ids.sort_unstable();

        let mut expected: Vec<&str> = WorkflowId::all().iter().map(|w| w.as_str()).collect();
        expected.sort_unstable();

        assert_eq!(ids, expected);
    }
}
