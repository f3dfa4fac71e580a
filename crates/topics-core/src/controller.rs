//! Optimistic topic controller.
//!
//! Every mutation is applied to the visible collection first, then confirmed
//! or rolled back by a background task once the remote call settles.
//! Mutations on the same entry run strictly in the order they were started;
//! entries never wait on each other.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::TopicsApi,
    collection::{LocalKey, Presence, TopicCollection},
    error::{TopicsError, TopicsErrorCategory},
    normalization::{SettleOutcome, normalize_settle_outcome, normalize_topic_input},
    types::{
        MutationAck, MutationKind, Topic, TopicInput, TopicRef, TopicView, TopicsCommand,
        TopicsEvent, TopicsSnapshot,
    },
};

pub const MSG_CREATED: &str = "Tópico criado!";
pub const MSG_UPDATED: &str = "Tópico atualizado!";
pub const MSG_DELETED: &str = "Tópico excluído!";
pub const MSG_SAVE_FAILED: &str = "Não foi possível salvar. Tente novamente.";
pub const MSG_DELETE_FAILED: &str = "Falha ao excluir. Tente novamente.";
pub const MSG_LOAD_FAILED: &str = "Não foi possível carregar os tópicos. Verifique sua conexão.";

const DEFAULT_SUCCESS_NOTICE_MS: u64 = 2_500;

/// Controller tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// How long a success notice stays visible.
    pub success_notice_ttl: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            success_notice_ttl: Duration::from_millis(DEFAULT_SUCCESS_NOTICE_MS),
        }
    }
}

/// Handle to a mutation whose optimistic effect is already visible.
#[derive(Debug)]
pub struct PendingMutation {
    target: TopicRef,
    handle: JoinHandle<MutationAck>,
}

impl PendingMutation {
    /// Ref the mutation was started against.
    pub fn target(&self) -> TopicRef {
        self.target
    }

    /// Wait for the background call to confirm or roll back.
    pub async fn settled(self) -> Result<MutationAck, TopicsError> {
        self.handle.await.map_err(|err| {
            TopicsError::new(
                TopicsErrorCategory::Internal,
                "mutation_task_failed",
                err.to_string(),
            )
        })
    }
}

#[derive(Debug)]
struct Lane {
    seq: u64,
    done: Option<oneshot::Receiver<()>>,
}

/// Place in an entry's mutation queue.
#[derive(Debug)]
struct LaneTicket {
    key: LocalKey,
    seq: u64,
    wait_for: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

impl LaneTicket {
    async fn wait_turn(&mut self) {
        if let Some(previous) = self.wait_for.take() {
            // A dropped sender (panicked predecessor) also releases the lane.
            let _ = previous.await;
        }
    }
}

#[derive(Debug, Default)]
struct ControllerState {
    collection: TopicCollection,
    loading: bool,
    error: Option<String>,
    success: Option<String>,
    notice_seq: u64,
    refresh_seq: u64,
    refreshes_in_flight: u32,
    lanes: HashMap<LocalKey, Lane>,
    next_lane_seq: u64,
}

impl ControllerState {
    fn snapshot(&self) -> TopicsSnapshot {
        TopicsSnapshot {
            topics: self.collection.views(),
            loading: self.loading,
            error: self.error.clone(),
            success: self.success.clone(),
        }
    }

    fn join_lane(&mut self, key: LocalKey) -> LaneTicket {
        self.next_lane_seq += 1;
        let seq = self.next_lane_seq;
        let (done, rx) = oneshot::channel();
        let wait_for = self
            .lanes
            .insert(
                key,
                Lane {
                    seq,
                    done: Some(rx),
                },
            )
            .and_then(|previous| previous.done);
        LaneTicket {
            key,
            seq,
            wait_for,
            done,
        }
    }

    fn leave_lane(&mut self, ticket: LaneTicket) {
        if self.lanes.get(&ticket.key).map(|lane| lane.seq) == Some(ticket.seq) {
            self.lanes.remove(&ticket.key);
        }
        let _ = ticket.done.send(());
    }
}

struct Shared<A> {
    api: A,
    state: Mutex<ControllerState>,
    events: broadcast::Sender<TopicsEvent>,
    settings: ControllerSettings,
}

/// Keeps the visible topic list in step with a [`TopicsApi`].
///
/// Mutating methods spawn Tokio tasks and must be called from within a
/// runtime.
pub struct TopicsController<A> {
    shared: Arc<Shared<A>>,
}

impl<A> Clone for TopicsController<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: TopicsApi + 'static> TopicsController<A> {
    pub fn new(
        api: A,
        events: broadcast::Sender<TopicsEvent>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                state: Mutex::new(ControllerState::default()),
                events,
                settings,
            }),
        }
    }

    /// Current observable state.
    pub fn snapshot(&self) -> TopicsSnapshot {
        self.lock_state().snapshot()
    }

    /// Entries hidden while their delete is in flight.
    pub fn pending_deletes(&self) -> Vec<TopicView> {
        self.lock_state().collection.pending_deletes()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopicsEvent> {
        self.shared.events.subscribe()
    }

    pub fn clear_error(&self) {
        let mut state = self.lock_state();
        if state.error.take().is_some() {
            self.publish(&state);
        }
    }

    pub fn dismiss_success(&self) {
        let mut state = self.lock_state();
        if state.success.take().is_some() {
            self.publish(&state);
        }
    }

    /// Fetch one topic straight from the server, bypassing the collection.
    pub async fn get_topic(&self, id: u64) -> Result<Topic, TopicsError> {
        self.shared.api.get(id).await
    }

    /// Merge the server listing into the visible collection.
    ///
    /// Mutations still in flight keep their optimistic state (see
    /// [`TopicCollection::replace_all`]). When refreshes overlap, only the most
    /// recently started one is applied. On failure the collection is left
    /// untouched and a sticky error is set so the UI can offer a retry.
    pub async fn refresh(&self) -> Result<(), TopicsError> {
        let seq = {
            let mut state = self.lock_state();
            state.refresh_seq += 1;
            state.refreshes_in_flight += 1;
            state.loading = true;
            state.error = None;
            self.publish(&state);
            state.refresh_seq
        };

        let result = self.shared.api.list().await;

        let mut state = self.lock_state();
        state.refreshes_in_flight = state.refreshes_in_flight.saturating_sub(1);
        state.loading = state.refreshes_in_flight > 0;
        if seq != state.refresh_seq {
            debug!(seq, latest = state.refresh_seq, "discarding superseded listing");
            self.publish(&state);
            return result.map(drop);
        }
        match result {
            Ok(topics) => {
                info!(count = topics.len(), "topics loaded");
                state.collection.replace_all(topics);
                self.publish(&state);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "loading topics failed");
                state.error = Some(MSG_LOAD_FAILED.to_owned());
                self.publish(&state);
                Err(err)
            }
        }
    }

    /// Validate, show a provisional entry at the front, and create it remotely.
    pub fn create_topic(&self, input: TopicInput) -> Result<PendingMutation, TopicsError> {
        let input = normalize_topic_input(input)?;

        let (key, target, ticket) = {
            let mut state = self.lock_state();
            let (key, target) = state.collection.insert_provisional(&input);
            let ticket = state.join_lane(key);
            self.publish(&state);
            (key, target, ticket)
        };
        debug!(%target, "optimistic create applied");

        let this = self.clone();
        let handle = tokio::spawn(async move { this.run_create(key, target, input, ticket).await });
        Ok(PendingMutation { target, handle })
    }

    /// Validate, rewrite the entry in place, and update it remotely.
    ///
    /// Returns `Ok(None)` when `id` is not on screen.
    pub fn update_topic(
        &self,
        id: TopicRef,
        input: TopicInput,
    ) -> Result<Option<PendingMutation>, TopicsError> {
        let input = normalize_topic_input(input)?;

        let (key, token, ticket) = {
            let mut state = self.lock_state();
            let Some(key) = state.collection.find(id) else {
                debug!(%id, "update target is not visible; ignoring");
                return Ok(None);
            };
            let Some(token) = state.collection.begin_update(key, &input) else {
                return Ok(None);
            };
            let ticket = state.join_lane(key);
            self.publish(&state);
            (key, token, ticket)
        };
        debug!(%id, "optimistic update applied");

        let this = self.clone();
        let handle =
            tokio::spawn(async move { this.run_update(key, token, id, input, ticket).await });
        Ok(Some(PendingMutation { target: id, handle }))
    }

    /// Ask `confirm`, hide the entry, and delete it remotely.
    ///
    /// Returns `None` when `id` is not on screen or the user declined.
    pub fn delete_topic<F>(&self, id: TopicRef, confirm: F) -> Option<PendingMutation>
    where
        F: FnOnce(&TopicView) -> bool,
    {
        let view = {
            let state = self.lock_state();
            let key = state.collection.find(id)?;
            state.collection.view(key)?
        };
        if !confirm(&view) {
            debug!(%id, "delete declined");
            return None;
        }

        let (key, ticket) = {
            let mut state = self.lock_state();
            let key = state.collection.find(id)?;
            if !state.collection.tombstone(key) {
                return None;
            }
            let ticket = state.join_lane(key);
            self.publish(&state);
            (key, ticket)
        };
        debug!(%id, "optimistic delete applied");

        let this = self.clone();
        let handle = tokio::spawn(async move { this.run_delete(key, id, ticket).await });
        Some(PendingMutation { target: id, handle })
    }

    async fn run_create(
        self,
        key: LocalKey,
        target: TopicRef,
        input: TopicInput,
        mut ticket: LaneTicket,
    ) -> MutationAck {
        ticket.wait_turn().await;
        let result = self.shared.api.create(&input).await;

        let outcome = {
            let mut state = self.lock_state();
            let outcome = match result {
                Ok(topic) => {
                    let resolved = TopicRef::Remote(topic.id);
                    match state.collection.confirm_create(key, topic) {
                        Presence::Missing => SettleOutcome::Superseded,
                        presence => {
                            info!(%target, %resolved, "topic created");
                            if presence == Presence::Visible {
                                self.raise_success(&mut state, MSG_CREATED);
                            }
                            SettleOutcome::Applied {
                                resolved: Some(resolved),
                            }
                        }
                    }
                }
                Err(error) => {
                    warn!(%target, error = %error, "create failed; removing provisional entry");
                    match state.collection.discard_provisional(key) {
                        Presence::Missing => SettleOutcome::Superseded,
                        _ => {
                            state.error = Some(MSG_SAVE_FAILED.to_owned());
                            SettleOutcome::Failed { error }
                        }
                    }
                }
            };
            state.leave_lane(ticket);
            self.publish(&state);
            outcome
        };

        self.settle(MutationKind::Create, target, outcome)
    }

    async fn run_update(
        self,
        key: LocalKey,
        token: u64,
        target: TopicRef,
        input: TopicInput,
        mut ticket: LaneTicket,
    ) -> MutationAck {
        ticket.wait_turn().await;

        let remote_id = {
            let mut state = self.lock_state();
            match (
                state.collection.presence(key),
                state.collection.remote_id(key),
            ) {
                (Presence::Visible, Some(remote_id)) => remote_id,
                _ => {
                    // Deleted, reloaded, or its create failed while queued.
                    debug!(%target, "update superseded before sending");
                    state.collection.rollback_update(key, token);
                    state.leave_lane(ticket);
                    self.publish(&state);
                    drop(state);
                    return self.settle(MutationKind::Update, target, SettleOutcome::Superseded);
                }
            }
        };

        let result = self.shared.api.update(remote_id, &input).await;

        let outcome = {
            let mut state = self.lock_state();
            let outcome = match result {
                Ok(topic) => match state.collection.reconcile_update(key, token, topic) {
                    Presence::Visible => {
                        info!(topic_id = remote_id, "topic updated");
                        self.raise_success(&mut state, MSG_UPDATED);
                        SettleOutcome::Applied {
                            resolved: state.collection.current_ref(key),
                        }
                    }
                    _ => SettleOutcome::Superseded,
                },
                Err(error) => {
                    warn!(topic_id = remote_id, error = %error, "update failed; rolling back");
                    match state.collection.rollback_update(key, token) {
                        Presence::Visible => {
                            state.error = Some(MSG_SAVE_FAILED.to_owned());
                            SettleOutcome::Failed { error }
                        }
                        _ => SettleOutcome::Superseded,
                    }
                }
            };
            state.leave_lane(ticket);
            self.publish(&state);
            outcome
        };

        self.settle(MutationKind::Update, target, outcome)
    }

    async fn run_delete(self, key: LocalKey, target: TopicRef, mut ticket: LaneTicket) -> MutationAck {
        ticket.wait_turn().await;

        let remote_id = {
            let mut state = self.lock_state();
            match (
                state.collection.presence(key),
                state.collection.remote_id(key),
            ) {
                (Presence::Tombstoned, Some(remote_id)) => remote_id,
                _ => {
                    debug!(%target, "delete superseded before sending");
                    state.leave_lane(ticket);
                    self.publish(&state);
                    drop(state);
                    return self.settle(MutationKind::Delete, target, SettleOutcome::Superseded);
                }
            }
        };

        let result = self.shared.api.remove(remote_id).await;

        let outcome = {
            let mut state = self.lock_state();
            let outcome = match result {
                Ok(()) => {
                    if state.collection.finalize_delete(key) {
                        info!(topic_id = remote_id, "topic deleted");
                        self.raise_success(&mut state, MSG_DELETED);
                        SettleOutcome::Applied { resolved: None }
                    } else {
                        SettleOutcome::Superseded
                    }
                }
                Err(error) => {
                    warn!(topic_id = remote_id, error = %error, "delete failed; restoring entry");
                    if state.collection.restore(key) {
                        state.error = Some(MSG_DELETE_FAILED.to_owned());
                        SettleOutcome::Failed { error }
                    } else {
                        SettleOutcome::Superseded
                    }
                }
            };
            state.leave_lane(ticket);
            self.publish(&state);
            outcome
        };

        self.settle(MutationKind::Delete, target, outcome)
    }

    fn raise_success(&self, state: &mut ControllerState, message: &str) {
        state.notice_seq += 1;
        let seq = state.notice_seq;
        state.success = Some(message.to_owned());

        let this = self.clone();
        let ttl = self.shared.settings.success_notice_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut state = this.lock_state();
            if state.notice_seq == seq && state.success.take().is_some() {
                this.publish(&state);
            }
        });
    }

    fn settle(&self, kind: MutationKind, target: TopicRef, outcome: SettleOutcome) -> MutationAck {
        let ack = normalize_settle_outcome(kind, target, outcome);
        let _ = self
            .shared
            .events
            .send(TopicsEvent::MutationSettled(ack.clone()));
        ack
    }

    fn reject(&self, error: TopicsError) {
        debug!(code = %error.code, "command rejected");
        let _ = self.shared.events.send(TopicsEvent::CommandRejected(error));
    }

    fn publish(&self, state: &ControllerState) {
        let _ = self
            .shared
            .events
            .send(TopicsEvent::Snapshot(state.snapshot()));
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drain commands into `controller` until every sender is dropped.
pub async fn run_command_loop<A: TopicsApi + 'static>(
    controller: TopicsController<A>,
    mut commands: mpsc::Receiver<TopicsCommand>,
) {
    debug!("topics command loop started");
    while let Some(command) = commands.recv().await {
        debug!(command = command_kind(&command), "handling command");
        match command {
            TopicsCommand::Refresh => {
                let controller = controller.clone();
                tokio::spawn(async move {
                    // Failure is already reflected in the snapshot.
                    let _ = controller.refresh().await;
                });
            }
            TopicsCommand::Create { input } => {
                if let Err(err) = controller.create_topic(input) {
                    controller.reject(err);
                }
            }
            TopicsCommand::Update { id, input } => {
                if let Err(err) = controller.update_topic(id, input) {
                    controller.reject(err);
                }
            }
            TopicsCommand::Delete { id, confirmed } => {
                let _ = controller.delete_topic(id, |_| confirmed);
            }
        }
    }
    debug!("topics command loop stopped");
}

fn command_kind(command: &TopicsCommand) -> &'static str {
    match command {
        TopicsCommand::Refresh => "refresh",
        TopicsCommand::Create { .. } => "create",
        TopicsCommand::Update { .. } => "update",
        TopicsCommand::Delete { .. } => "delete",
    }
}
