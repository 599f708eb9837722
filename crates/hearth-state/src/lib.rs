//! Conversation state for the Hearth orchestration pipeline.
//!
//! This crate defines the unit of work threaded through every step of a
//! turn:
//!
//! - **[`ConversationState`]** -- the per-turn record carrying the raw user
//!   input, the classified intent, extracted entities, scratch module data,
//!   and the final assistant response.
//! - **[`StateUpdate`]** -- a typed partial update produced by the classifier
//!   and by workflow nodes, merged via [`ConversationState::apply`] with
//!   explicit per-field overwrite-vs-accumulate rules.
//! - **[`ExtractedEntities`]** -- the fixed set of optional entity slots the
//!   classifier can fill.
//! - **[`WorkflowId`]** -- the closed set of workflow identifiers the router
//!   can choose.

pub mod state;

pub use state::{
    ConversationState, ExtractedEntities, StateUpdate, WorkflowId, keys,
};
