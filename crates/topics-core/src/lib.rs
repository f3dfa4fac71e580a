//! Core of the topics client: data model, error taxonomy, retry policy and
//! the optimistic controller that keeps a visible topic list in step with a
//! remote collection.
//!
//! Transport lives behind [`TopicsApi`]; this crate does no I/O of its own.

/// Remote collection contract.
pub mod api;
/// Async command/event channel primitives.
pub mod channel;
/// Visible collection with optimistic bookkeeping.
pub mod collection;
/// Optimistic controller and its command loop.
pub mod controller;
/// Stable error types and HTTP classification helpers.
pub mod error;
/// Input validation and settlement normalization.
pub mod normalization;
/// Backoff policy and the shared retry wrapper.
pub mod retry;
/// Frontend-facing types (topics, commands, events, snapshots).
pub mod types;

pub use api::TopicsApi;
pub use channel::{EventStream, TopicsChannelError, TopicsChannels};
pub use collection::{LocalKey, Presence, TopicCollection};
pub use controller::{ControllerSettings, PendingMutation, TopicsController, run_command_loop};
pub use error::{TopicsError, TopicsErrorCategory, classify_http_status};
pub use normalization::{
    MIN_BODY_CHARS, MIN_TITLE_CHARS, SettleOutcome, normalize_settle_outcome,
    normalize_topic_input,
};
pub use retry::RetryPolicy;
pub use types::{
    MutationAck, MutationKind, SyncState, Topic, TopicInput, TopicRef, TopicView, TopicsCommand,
    TopicsEvent, TopicsSnapshot,
};
