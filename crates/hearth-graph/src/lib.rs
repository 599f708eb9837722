//! Turn orchestration for the Hearth assistant.
//!
//! The graph takes one raw utterance per turn and threads a
//! [`hearth_state::ConversationState`] through three fixed stages:
//!
//! - **Classify** -- [`hearth_intent::IntentClassifier`], which never fails.
//! - **Route** -- [`route`], a pure intent → workflow mapping.
//! - **Execute** -- exactly one [`WorkflowNode`], under a turn budget.
//!
//! Every turn terminates with a non-empty `assistant_response`;
//! [`AssistantGraph::process_turn`] returns the final state and never
//! errors.

mod error;
mod graph;
mod nodes;
mod router;

pub use error::{GraphError, Result};
pub use graph::{AssistantGraph, DEFAULT_CITY, DEFAULT_TURN_TIMEOUT, GraphConfig};
pub use nodes::{
    ClarificationNode, DeviceControlNode, EmergencyNode, GeneralChatNode, InformationNode,
    SceneNode, ScheduleNode, WeatherNode, WorkflowNode, standard_nodes,
};
pub use router::route;
