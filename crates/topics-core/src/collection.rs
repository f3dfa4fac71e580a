use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::types::{SyncState, Topic, TopicInput, TopicRef, TopicView};

/// Stable local handle for a collection entry.
///
/// Unlike `TopicRef`, it survives the provisional → remote transition, which
/// makes it the key for per-entry sequencing.
pub type LocalKey = u64;

/// Where an entry was found when a background result came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// In the visible collection.
    Visible,
    /// Removed locally, delete not yet confirmed.
    Tombstoned,
    /// Gone for good (delete confirmed, create failed, dropped by a reload, or
    /// replaced by a newer entry with the same server id).
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fields {
    title: String,
    body: String,
}

impl Fields {
    fn from_input(input: &TopicInput) -> Self {
        Self {
            title: input.title.clone(),
            body: input.body.clone(),
        }
    }

    fn from_topic(topic: &Topic) -> Self {
        Self {
            title: topic.title.clone(),
            body: topic.body.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: LocalKey,
    id: TopicRef,
    // Provisional ref kept after confirmation so stale UI refs still resolve.
    alias: Option<TopicRef>,
    user_id: Option<u64>,
    shown: Fields,
    confirmed: Fields,
    pending_updates: u32,
    latest_update: u64,
}

impl Entry {
    fn answers_to(&self, id: TopicRef) -> bool {
        self.id == id || self.alias == Some(id)
    }

    fn view(&self, deleting: bool) -> TopicView {
        let sync = if deleting {
            SyncState::PendingDelete
        } else if self.id.is_provisional() {
            SyncState::PendingCreate
        } else if self.pending_updates > 0 {
            SyncState::PendingUpdate
        } else {
            SyncState::Confirmed
        };
        TopicView {
            id: self.id,
            title: self.shown.title.clone(),
            body: self.shown.body.clone(),
            user_id: self.user_id,
            sync,
        }
    }

    fn settle_update(&mut self, token: u64) -> bool {
        self.pending_updates = self.pending_updates.saturating_sub(1);
        self.latest_update == token
    }
}

#[derive(Debug, Clone)]
struct Tombstone {
    entry: Entry,
    index: usize,
    after: Option<LocalKey>,
}

/// Visible topic list plus the bookkeeping needed to reconcile or roll back
/// optimistic changes.
#[derive(Debug, Clone, Default)]
pub struct TopicCollection {
    entries: Vec<Entry>,
    tombstones: HashMap<LocalKey, Tombstone>,
    next_key: LocalKey,
    next_provisional: u64,
    next_update_token: u64,
}

impl TopicCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible rows in display order.
    pub fn views(&self) -> Vec<TopicView> {
        self.entries.iter().map(|entry| entry.view(false)).collect()
    }

    /// Entries hidden locally while their delete is in flight.
    pub fn pending_deletes(&self) -> Vec<TopicView> {
        let mut tombstones: Vec<&Tombstone> = self.tombstones.values().collect();
        tombstones.sort_by_key(|tombstone| tombstone.index);
        tombstones
            .into_iter()
            .map(|tombstone| tombstone.entry.view(true))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge a server listing into the collection.
    ///
    /// The listing decides membership and order for confirmed entries, with
    /// three exceptions for work still in flight: pending creates stay on top,
    /// pending edits keep their visible fields over the listed ones, and
    /// pending deletes stay hidden. Duplicate server ids keep their first
    /// occurrence.
    pub fn replace_all(&mut self, topics: Vec<Topic>) {
        let (mut next, listed): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.id.is_provisional());
        let mut previous: HashMap<TopicRef, Entry> =
            listed.into_iter().map(|entry| (entry.id, entry)).collect();
        let hidden: HashSet<TopicRef> = self
            .tombstones
            .values()
            .map(|tombstone| tombstone.entry.id)
            .filter(|id| !id.is_provisional())
            .collect();

        for topic in topics {
            let remote = TopicRef::Remote(topic.id);
            if next.iter().any(|entry| entry.id == remote) {
                warn!(topic_id = topic.id, "dropping duplicate topic from listing");
                continue;
            }
            if hidden.contains(&remote) {
                continue;
            }
            let fields = Fields::from_topic(&topic);
            let entry = match previous.remove(&remote) {
                Some(mut entry) => {
                    if entry.pending_updates == 0 {
                        entry.shown = fields.clone();
                    }
                    entry.confirmed = fields;
                    entry.user_id = topic.user_id.or(entry.user_id);
                    entry
                }
                None => Entry {
                    key: self.allocate_key(),
                    id: remote,
                    alias: None,
                    user_id: topic.user_id,
                    shown: fields.clone(),
                    confirmed: fields,
                    pending_updates: 0,
                    latest_update: 0,
                },
            };
            next.push(entry);
        }
        self.entries = next;
    }

    /// Resolve a visible entry by its current or provisional ref.
    pub fn find(&self, id: TopicRef) -> Option<LocalKey> {
        self.entries
            .iter()
            .find(|entry| entry.answers_to(id))
            .map(|entry| entry.key)
    }

    pub fn view(&self, key: LocalKey) -> Option<TopicView> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.view(false))
    }

    /// Current ref of an entry, visible or tombstoned.
    pub fn current_ref(&self, key: LocalKey) -> Option<TopicRef> {
        self.entry(key).map(|(entry, _)| entry.id)
    }

    /// Server id of an entry, visible or tombstoned.
    pub fn remote_id(&self, key: LocalKey) -> Option<u64> {
        self.current_ref(key).and_then(TopicRef::remote_id)
    }

    pub fn presence(&self, key: LocalKey) -> Presence {
        self.entry(key)
            .map_or(Presence::Missing, |(_, presence)| presence)
    }

    /// Prepend a pending-create entry.
    pub fn insert_provisional(&mut self, input: &TopicInput) -> (LocalKey, TopicRef) {
        let key = self.allocate_key();
        self.next_provisional += 1;
        let id = TopicRef::Provisional(self.next_provisional);
        let fields = Fields::from_input(input);
        self.entries.insert(
            0,
            Entry {
                key,
                id,
                alias: None,
                user_id: None,
                shown: fields.clone(),
                confirmed: fields,
                pending_updates: 0,
                latest_update: 0,
            },
        );
        (key, id)
    }

    /// Adopt the server's record for a pending-create entry.
    ///
    /// Any other entry already holding the same server id, visible or pending
    /// delete, is dropped so identities stay unique.
    pub fn confirm_create(&mut self, key: LocalKey, topic: Topic) -> Presence {
        let remote = TopicRef::Remote(topic.id);
        let presence = match self.entry_mut(key) {
            Some((entry, presence)) => {
                entry.alias = Some(entry.id);
                entry.id = remote;
                entry.user_id = topic.user_id;
                entry.confirmed = Fields::from_topic(&topic);
                if entry.pending_updates == 0 {
                    entry.shown = entry.confirmed.clone();
                }
                presence
            }
            None => return Presence::Missing,
        };

        let before = self.entries.len() + self.tombstones.len();
        self.entries
            .retain(|entry| entry.key == key || entry.id != remote);
        self.tombstones
            .retain(|other, tombstone| *other == key || tombstone.entry.id != remote);
        if self.entries.len() + self.tombstones.len() != before {
            warn!(topic_id = topic.id, "server reused an id already on screen; keeping newest");
        }
        presence
    }

    /// Drop an entry whose create failed.
    pub fn discard_provisional(&mut self, key: LocalKey) -> Presence {
        if let Some(idx) = self.entries.iter().position(|entry| entry.key == key) {
            self.entries.remove(idx);
            return Presence::Visible;
        }
        if self.tombstones.remove(&key).is_some() {
            return Presence::Tombstoned;
        }
        Presence::Missing
    }

    /// Show edited fields immediately; returns a token identifying this edit.
    pub fn begin_update(&mut self, key: LocalKey, input: &TopicInput) -> Option<u64> {
        self.next_update_token += 1;
        let token = self.next_update_token;
        let entry = self.entries.iter_mut().find(|entry| entry.key == key)?;
        entry.shown = Fields::from_input(input);
        entry.pending_updates += 1;
        entry.latest_update = token;
        Some(token)
    }

    /// Record the server's version of an edited entry.
    ///
    /// Visible fields follow the server only when no later edit is pending.
    pub fn reconcile_update(&mut self, key: LocalKey, token: u64, topic: Topic) -> Presence {
        let Some((entry, presence)) = self.entry_mut(key) else {
            return Presence::Missing;
        };
        let latest = entry.settle_update(token);
        entry.confirmed = Fields::from_topic(&topic);
        if topic.user_id.is_some() {
            entry.user_id = topic.user_id;
        }
        if latest {
            entry.shown = entry.confirmed.clone();
        }
        presence
    }

    /// Undo a failed edit by returning to the last confirmed fields.
    pub fn rollback_update(&mut self, key: LocalKey, token: u64) -> Presence {
        let Some((entry, presence)) = self.entry_mut(key) else {
            return Presence::Missing;
        };
        if entry.settle_update(token) {
            entry.shown = entry.confirmed.clone();
        }
        presence
    }

    /// Hide a visible entry pending delete confirmation.
    pub fn tombstone(&mut self, key: LocalKey) -> bool {
        let Some(index) = self.entries.iter().position(|entry| entry.key == key) else {
            return false;
        };
        let after = index
            .checked_sub(1)
            .map(|prev| self.entries[prev].key);
        let entry = self.entries.remove(index);
        self.tombstones.insert(key, Tombstone { entry, index, after });
        true
    }

    /// Forget a tombstoned entry once the server confirmed the delete.
    pub fn finalize_delete(&mut self, key: LocalKey) -> bool {
        self.tombstones.remove(&key).is_some()
    }

    /// Put a tombstoned entry back where it was.
    pub fn restore(&mut self, key: LocalKey) -> bool {
        let Some(tombstone) = self.tombstones.remove(&key) else {
            return false;
        };
        let index = match tombstone.after {
            None => 0,
            Some(after) => self
                .entries
                .iter()
                .position(|entry| entry.key == after)
                .map_or(tombstone.index.min(self.entries.len()), |pos| pos + 1),
        };
        self.entries.insert(index, tombstone.entry);
        true
    }

    fn allocate_key(&mut self) -> LocalKey {
        self.next_key += 1;
        self.next_key
    }

    fn entry(&self, key: LocalKey) -> Option<(&Entry, Presence)> {
        if let Some(entry) = self.entries.iter().find(|entry| entry.key == key) {
            return Some((entry, Presence::Visible));
        }
        self.tombstones
            .get(&key)
            .map(|tombstone| (&tombstone.entry, Presence::Tombstoned))
    }

    fn entry_mut(&mut self, key: LocalKey) -> Option<(&mut Entry, Presence)> {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.key == key) {
            return Some((entry, Presence::Visible));
        }
        self.tombstones
            .get_mut(&key)
            .map(|tombstone| (&mut tombstone.entry, Presence::Tombstoned))
    }
}
