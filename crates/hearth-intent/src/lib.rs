//! Intent classification for the Hearth assistant.
//!
//! This crate decides **what the user wants** before any workflow runs:
//!
//! - [`ChatClassifier`] asks an OpenAI-compatible model for the intent and
//!   the entity slots of an utterance.
//! - [`IntentClassifier`] wraps any [`ClassificationService`] and absorbs
//!   every failure into an ordered keyword fallback, so classification
//!   never fails a turn.
//!
//! The output is a [`hearth_state::StateUpdate`] the caller merges into the
//! turn's conversation state.

mod classifier;
mod client;
mod error;

pub use classifier::{ClassificationSource, IntentClassifier, intents};
pub use client::{
    ChatClassifier, ClassificationService, ClassifierConfig, DEFAULT_CLASSIFIER_TIMEOUT,
    IntentClassification, parse_entity_reply, parse_intent_reply,
};
pub use error::{IntentError, Result};
