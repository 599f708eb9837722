//! Adaptation of remote capability descriptors into local actions.
//!
//! [`adapt`] turns each [`CapabilityDescriptor`] into an independent
//! [`CapabilityAction`]: an immutable record holding the capability's name,
//! its decoded parameter schema, and a handle to the owning session.  The
//! action validates arguments locally before touching the network and
//! absorbs every invocation failure into a textual [`ActionOutcome`], so a
//! single broken capability can never abort a listing or a turn.
//!
//! [`CapabilityCatalog`] owns the adapted set, caching it against the
//! session epoch and rebuilding after a reconnect, when the server may be
//! announcing different schemas.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{CapabilityError, Result};
use crate::protocol::{CapabilityDescriptor, ParamSchema};
use crate::session::SessionManager;

// ---------------------------------------------------------------------------
// Argument strictness
// ---------------------------------------------------------------------------

/// How an adapted action treats arguments that its schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgStrictness {
    /// Unknown arguments are dropped before the call.
    #[default]
    Lenient,
    /// Unknown arguments fail validation.
    Strict,
}

// ---------------------------------------------------------------------------
// Capability actions
// ---------------------------------------------------------------------------

/// Outcome of an adapted invocation: always text, never an error.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// Result text on success, a best-effort error message on failure.
    pub text: String,
    /// True when the call failed anywhere between validation and the remote.
    pub is_error: bool,
}

/// A locally callable wrapper around one remote capability.
#[derive(Clone)]
pub struct CapabilityAction {
    name: String,
    description: String,
    schema: ParamSchema,
    strictness: ArgStrictness,
    session: Arc<SessionManager>,
}

impl CapabilityAction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    /// Validate `arguments` and invoke the remote capability.
    ///
    /// Failures never propagate: validation errors, session errors, and
    /// remote errors all come back as an [`ActionOutcome`] with `is_error`
    /// set and a textual message, logged at warn level.
    pub async fn invoke(&self, arguments: Map<String, Value>) -> ActionOutcome {
        match self.try_invoke(arguments).await {
            Ok(text) => ActionOutcome {
                text,
                is_error: false,
            },
            Err(e) => {
                warn!(capability = %self.name, error = %e, "capability invocation degraded");
                ActionOutcome {
                    text: format!("capability error: {e}"),
                    is_error: true,
                }
            }
        }
    }

    async fn try_invoke(&self, arguments: Map<String, Value>) -> Result<String> {
        let validated = self.validate(arguments)?;
        self.session.ensure_connected().await?;
        self.session.invoke(&self.name, validated).await
    }

    /// Check `arguments` against the decoded schema.  Returns the map to
    /// send: under [`ArgStrictness::Lenient`] undeclared keys are removed,
    /// under [`ArgStrictness::Strict`] they fail.
    fn validate(&self, mut arguments: Map<String, Value>) -> Result<Map<String, Value>> {
        for spec in self.schema.params() {
            match arguments.get(&spec.name) {
                Some(value) => {
                    if !spec.param_type.matches(value) {
                        return Err(CapabilityError::InvalidArguments {
                            capability: self.name.clone(),
                            reason: format!(
                                "argument `{}` expects {}",
                                spec.name,
                                spec.param_type.as_str()
                            ),
                        });
                    }
                }
                None if spec.required => {
                    return Err(CapabilityError::InvalidArguments {
                        capability: self.name.clone(),
                        reason: format!("missing required argument `{}`", spec.name),
                    });
                }
                None => {}
            }
        }

        let unknown: Vec<String> = arguments
            .keys()
            .filter(|key| self.schema.get(key).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            match self.strictness {
                ArgStrictness::Strict => {
                    return Err(CapabilityError::InvalidArguments {
                        capability: self.name.clone(),
                        reason: format!("unknown arguments: {}", unknown.join(", ")),
                    });
                }
                ArgStrictness::Lenient => {
                    for key in unknown {
                        arguments.remove(&key);
                    }
                }
            }
        }

        Ok(arguments)
    }
}

impl fmt::Debug for CapabilityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityAction")
            .field("name", &self.name)
            .field("params", &self.schema.params().len())
            .field("strictness", &self.strictness)
            .finish()
    }
}

/// Build one action per descriptor.
///
/// Schema decoding happens here, so unsupported parameter types and name
/// collisions surface at adapt time -- before anything is invoked -- rather
/// than mid-turn.
pub fn adapt(
    session: &Arc<SessionManager>,
    descriptors: &[CapabilityDescriptor],
    strictness: ArgStrictness,
) -> Result<Vec<CapabilityAction>> {
    let mut actions: Vec<CapabilityAction> = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        if actions.iter().any(|a| a.name == descriptor.name) {
            return Err(CapabilityError::DuplicateCapability {
                name: descriptor.name.clone(),
            });
        }
        let schema = ParamSchema::decode(&descriptor.input_schema, &descriptor.name)?;
        actions.push(CapabilityAction {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            schema,
            strictness,
            session: Arc::clone(session),
        });
    }
    Ok(actions)
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

struct CachedActions {
    epoch: u64,
    actions: Arc<Vec<CapabilityAction>>,
}

/// The adapted action set for one session, rebuilt when the session epoch
/// moves (reconnects may change the remote schema set).
pub struct CapabilityCatalog {
    session: Arc<SessionManager>,
    strictness: ArgStrictness,
    cache: tokio::sync::Mutex<Option<CachedActions>>,
}

impl CapabilityCatalog {
    pub fn new(session: Arc<SessionManager>, strictness: ArgStrictness) -> Self {
        Self {
            session,
            strictness,
            cache: tokio::sync::Mutex::new(None),
        }
    }

    /// The session this catalog adapts for.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Current action set, connecting and adapting as needed.
    pub async fn actions(&self) -> Result<Arc<Vec<CapabilityAction>>> {
        let info = self.session.ensure_connected().await?;

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.epoch == info.epoch
        {
            return Ok(Arc::clone(&cached.actions));
        }

        let descriptors = self.session.list_capabilities().await?;
        let actions = Arc::new(adapt(&self.session, &descriptors, self.strictness)?);
        info!(
            count = actions.len(),
            epoch = info.epoch,
            "capability actions adapted"
        );
        *cache = Some(CachedActions {
            epoch: info.epoch,
            actions: Arc::clone(&actions),
        });
        Ok(actions)
    }

    /// Look up an action by exact name.
    pub async fn find(&self, name: &str) -> Result<Option<CapabilityAction>> {
        let actions = self.actions().await?;
        Ok(actions.iter().find(|a| a.name() == name).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
