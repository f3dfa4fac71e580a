use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TopicsError;

/// Topic as stored by the remote service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// Server-assigned identity.
    pub id: u64,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub body: String,
    /// Owning user, when the service reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

/// Mutable subset of a topic submitted on create/update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicInput {
    pub title: String,
    pub body: String,
}

impl TopicInput {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Identity of an entry in the visible collection.
///
/// Provisional ids are handed out locally before the server acknowledges a
/// create and never collide with server ids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TopicRef {
    /// Identity assigned by the remote service.
    Remote(u64),
    /// Client-side placeholder awaiting server acknowledgement.
    Provisional(u64),
}

impl TopicRef {
    /// Server id, when this ref is durable.
    pub fn remote_id(self) -> Option<u64> {
        match self {
            Self::Remote(id) => Some(id),
            Self::Provisional(_) => None,
        }
    }

    pub fn is_provisional(self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

impl fmt::Display for TopicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(id) => write!(f, "#{id}"),
            Self::Provisional(id) => write!(f, "tmp-{id}"),
        }
    }
}

/// Reconciliation state of a collection entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncState {
    /// Matches the last known server state.
    Confirmed,
    /// Created locally, waiting for the server to assign an id.
    PendingCreate,
    /// Edited locally, waiting for the server to accept the edit.
    PendingUpdate,
    /// Removed locally, waiting for the server to confirm the delete.
    PendingDelete,
}

/// Display row for one visible topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicView {
    pub id: TopicRef,
    pub title: String,
    pub body: String,
    pub user_id: Option<u64>,
    pub sync: SyncState,
}

/// Everything a frontend needs to render the topics screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TopicsSnapshot {
    /// Visible topics in display order.
    pub topics: Vec<TopicView>,
    /// A full reload is in progress.
    pub loading: bool,
    /// Sticky error message; cleared by the next refresh or `clear_error`.
    pub error: Option<String>,
    /// Transient success notice, dismissed automatically.
    pub success: Option<String>,
}

/// Kind of optimistic mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// Command channel input accepted by the controller loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TopicsCommand {
    /// Reload the whole collection from the server.
    Refresh,
    /// Create a topic.
    Create {
        /// Raw form input.
        input: TopicInput,
    },
    /// Edit an existing topic.
    Update {
        /// Target entry.
        id: TopicRef,
        /// Raw form input.
        input: TopicInput,
    },
    /// Delete a topic.
    Delete {
        /// Target entry.
        id: TopicRef,
        /// Whether the user accepted the destructive-action prompt.
        confirmed: bool,
    },
}

/// Settlement report for one background mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MutationAck {
    /// Mutation kind.
    pub kind: MutationKind,
    /// Ref the mutation was initiated against.
    pub target: TopicRef,
    /// Ref of the entry after settlement, when it is still present.
    pub resolved: Option<TopicRef>,
    /// Stable error code when the mutation was rolled back.
    pub error_code: Option<String>,
    /// `true` when the entry vanished before the mutation could apply.
    pub superseded: bool,
}

/// Event channel output emitted by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TopicsEvent {
    /// Observable state after a change.
    Snapshot(TopicsSnapshot),
    /// A background mutation finished.
    MutationSettled(MutationAck),
    /// A command was refused before touching state.
    CommandRejected(TopicsError),
}
