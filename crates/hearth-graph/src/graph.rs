//! The assistant's turn orchestration graph.
//!
//! One turn flows strictly forward: classifier → router → exactly one
//! workflow node → terminal state. There are no node-to-node hops, no
//! cycles, and no re-entry into classification. [`AssistantGraph`] owns all
//! collaborators explicitly: the classifier, the capability session, the
//! adapter catalog, and the node registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use hearth_capability::{ArgStrictness, CapabilityCatalog, CapabilityError, SessionManager};
use hearth_intent::IntentClassifier;
use hearth_state::{ConversationState, StateUpdate, WorkflowId};

use crate::error::{GraphError, Result};
use crate::nodes::{WorkflowNode, standard_nodes};
use crate::router::route;

/// Default budget for one full turn, classification included.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(20);

/// City used for weather questions that name none.
pub const DEFAULT_CITY: &str = "东莞";

/// Response of last resort, used when a workflow times out, is missing, or
/// terminates without producing any text.
const DEGRADED_RESPONSE: &str = "抱歉，我这边出了点小问题，请稍后再试。";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Construction-time tuning for [`AssistantGraph`].
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Budget for one workflow node run.
    pub turn_timeout: Duration,

    /// City used when a weather question names none.
    pub default_city: String,

    /// How strictly capability arguments are validated.
    pub strictness: ArgStrictness,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            default_city: DEFAULT_CITY.to_string(),
            strictness: ArgStrictness::Lenient,
        }
    }
}

impl GraphConfig {
    /// Override the per-turn node budget.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Override the default weather city.
    pub fn with_default_city(mut self, city: impl Into<String>) -> Self {
        self.default_city = city.into();
        self
    }

    /// Override argument validation strictness.
    pub fn with_strictness(mut self, strictness: ArgStrictness) -> Self {
        self.strictness = strictness;
        self
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// The per-turn orchestrator.
///
/// Stateless across turns: every [`AssistantGraph::process_turn`] call takes
/// `&self` and threads its own [`ConversationState`], so one graph value may
/// serve concurrent turns.
pub struct AssistantGraph {
    classifier: IntentClassifier,
    session: Arc<SessionManager>,
    catalog: Arc<CapabilityCatalog>,
    nodes: HashMap<WorkflowId, Arc<dyn WorkflowNode>>,
    turn_timeout: Duration,
}

impl AssistantGraph {
    /// Wire up the graph with the standard node set.
    pub fn new(
        classifier: IntentClassifier,
        session: Arc<SessionManager>,
        config: GraphConfig,
    ) -> Self {
        let catalog = Arc::new(CapabilityCatalog::new(
            Arc::clone(&session),
            config.strictness,
        ));

        let mut nodes: HashMap<WorkflowId, Arc<dyn WorkflowNode>> = HashMap::new();
        for node in standard_nodes(Arc::clone(&catalog), &config.default_city) {
            nodes.insert(node.id(), node);
        }

        Self {
            classifier,
            session,
            catalog,
            nodes,
            turn_timeout: config.turn_timeout,
        }
    }

    /// Replace the node registered for `node.id()`.
    pub fn with_node(mut self, node: Arc<dyn WorkflowNode>) -> Self {
        self.nodes.insert(node.id(), node);
        self
    }

    /// Eagerly connect to the capability server and adapt its catalog.
    ///
    /// Returns the number of capabilities discovered. Connection and
    /// discovery failures are tolerated here: the session reconnects lazily
    /// on first use, so a server that is down at start-up only costs a
    /// warning. A duplicate capability name is the one fatal case, because
    /// invocation routing would be ambiguous for as long as the process
    /// lives.
    pub async fn warm_up(&self) -> Result<usize> {
        match self.catalog.actions().await {
            Ok(actions) => {
                info!(capabilities = actions.len(), "capability catalog ready");
                Ok(actions.len())
            }
            Err(CapabilityError::DuplicateCapability { name }) => {
                Err(GraphError::DuplicateCapability { name })
            }
            Err(e) => {
                warn!(error = %e, "capability warm-up failed, will retry on first use");
                Ok(0)
            }
        }
    }

    /// Process one user turn to a terminal state.
    ///
    /// Never fails and never panics: classification absorbs its own errors,
    /// nodes degrade internally, and the graph substitutes an apologetic
    /// response for anything that still goes wrong (timeout, missing node,
    /// empty response).
    pub async fn process_turn(
        &self,
        user_input: &str,
        prior_state: Option<&ConversationState>,
    ) -> ConversationState {
        let mut state = match prior_state {
            Some(prior) => ConversationState::continuing(user_input, prior),
            None => ConversationState::new(user_input),
        };

        // Classify. Infallible by contract.
        let update = self.classifier.classify(&state).await;
        state.apply(update);

        // Route and record the decision before the node runs, so a timed-out
        // turn still shows where it was headed.
        let workflow = route(&state.primary_intent, state.requires_clarification());
        info!(
            turn_id = %state.turn_id,
            intent = %state.primary_intent,
            workflow = %workflow,
            "turn routed"
        );
        state.apply(StateUpdate::none().with_workflow(workflow));

        // Run exactly one node under the turn budget.
        let update = match self.nodes.get(&workflow) {
            Some(node) => {
                match tokio::time::timeout(self.turn_timeout, node.run(&state)).await {
                    Ok(update) => update,
                    Err(_) => {
                        warn!(turn_id = %state.turn_id, workflow = %workflow, "workflow timed out");
                        StateUpdate::none()
                            .with_response(DEGRADED_RESPONSE)
                            .with_error(format!("workflow {workflow} timed out"))
                    }
                }
            }
            None => {
                error!(workflow = %workflow, "no node registered for workflow");
                StateUpdate::none()
                    .with_response(DEGRADED_RESPONSE)
                    .with_error(format!("no node registered for {workflow}"))
            }
        };
        state.apply(update);

        // Termination invariant: a turn always ends with something to say.
        if state.assistant_response.is_empty() {
            warn!(turn_id = %state.turn_id, workflow = %workflow, "workflow produced no response");
            state.apply(
                StateUpdate::none()
                    .with_response(DEGRADED_RESPONSE)
                    .with_error(format!("workflow {workflow} produced no response")),
            );
        }

        debug!(
            turn_id = %state.turn_id,
            chars = state.assistant_response.chars().count(),
            "turn complete"
        );
        state
    }

    /// Close the capability session. Idempotent; in-flight capability calls
    /// may observe a session error.
    pub async fn shutdown(&self) {
        self.session.close().await;
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
