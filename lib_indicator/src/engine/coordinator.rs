//! # Sync Coordinator
//!
//! Owns one [`IndicatorState`] and sequences everything that mutates it:
//!
//! 1. **Bootstrap**: identity → field metadata → roster → initial front. The
//!    snapshot is assembled in temporaries and committed in one step, so a
//!    failure at any stage leaves nothing half-applied.
//! 2. **Buffering**: stream events that arrive before a snapshot is published
//!    (or while a re-sync is fetching) are queued and replayed in receipt order.
//! 3. **Re-sync**: an activation for a member missing from the roster triggers
//!    a fresh snapshot fetch. A member that is still unknown after a
//!    successful re-sync is remembered and ignored from then on. A failed
//!    re-sync drops the triggering event and leaves the member re-syncable.
//!
//! All mutation happens on the task driving the coordinator; suspension only
//! happens while awaiting the collaborator or the event channel.

use std::collections::{HashSet, VecDeque};

use tokio::sync::mpsc;

use super::active_set::ActiveSet;
use super::errors::{BootstrapStage, SyncError};
use super::model::{FieldId, FrontChange, MemberId, MemberRecord, Projection};
use super::roster::RosterStore;
use super::source::{resolve_field, FrontEntry, RosterSource};
use super::tracker::{ApplyOutcome, IndicatorState};

/// Summary of a published snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapHandle {
    /// The resolved system id.
    pub system_id: String,
    /// The resolved indicator field.
    pub field_id: FieldId,
    /// Members in the roster.
    pub members: usize,
    /// Members fronting at snapshot time.
    pub active: usize,
}

/// A fully fetched snapshot that has not been committed yet.
struct Snapshot {
    system_id: String,
    field: FieldId,
    roster: RosterStore,
    active: ActiveSet,
    unresolved: HashSet<MemberId>,
}

/// Runs the four collaborator reads in order and assembles a snapshot.
async fn fetch_snapshot<S: RosterSource>(source: &S, field_name: &str) -> Result<Snapshot, SyncError> {
    let identity = source
        .fetch_identity()
        .await
        .map_err(SyncError::at(BootstrapStage::Identity))?;

    let fields = source
        .fetch_field_metadata(&identity.id)
        .await
        .map_err(SyncError::at(BootstrapStage::FieldMetadata))?;
    let field = resolve_field(&fields, field_name)
        .cloned()
        .ok_or_else(|| SyncError::FieldNotFound(field_name.to_string()))?;

    let members = source
        .fetch_roster(&identity.id)
        .await
        .map_err(SyncError::at(BootstrapStage::Roster))?;
    let roster = RosterStore::from_records(members.into_iter().map(MemberRecord::from));

    let front = source
        .fetch_initial_front()
        .await
        .map_err(SyncError::at(BootstrapStage::InitialFront))?;

    let mut unresolved = HashSet::new();
    let mut fronting = Vec::new();
    for entry in front.into_iter().filter(FrontEntry::is_live) {
        let id = entry.content.member;
        if roster.contains(&id) {
            fronting.push(id);
        } else {
            tracing::debug!(member = %id, "Initial front entry is not a roster member; skipping.");
            unresolved.insert(id);
        }
    }

    Ok(Snapshot {
        system_id: identity.id,
        field,
        roster,
        active: ActiveSet::from_ids(fronting),
        unresolved,
    })
}

/// Sequences bootstrap, stream events and re-syncs for one system.
pub struct SyncCoordinator<S> {
    source: S,
    field_name: String,
    state: Option<IndicatorState>,
    pending: VecDeque<FrontChange>,
    unresolved: HashSet<MemberId>,
    notify: mpsc::UnboundedSender<Projection>,
}

impl<S: RosterSource> SyncCoordinator<S> {
    /// Creates a coordinator that has not bootstrapped yet.
    ///
    /// Every projection change is sent on `notify`.
    pub fn new(source: S, field_name: impl Into<String>, notify: mpsc::UnboundedSender<Projection>) -> Self {
        Self {
            source,
            field_name: field_name.into(),
            state: None,
            pending: VecDeque::new(),
            unresolved: HashSet::new(),
            notify,
        }
    }

    /// The published state, once bootstrap has succeeded.
    pub fn state(&self) -> Option<&IndicatorState> {
        self.state.as_ref()
    }

    /// Events waiting for a snapshot.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Fetches and publishes the initial snapshot without listening for
    /// stream events meanwhile. Events already submitted are replayed.
    pub async fn bootstrap(&mut self) -> Result<BootstrapHandle, SyncError> {
        let snapshot = fetch_snapshot(&self.source, &self.field_name).await?;
        let handle = self.commit(snapshot);
        self.settle(None).await;
        Ok(handle)
    }

    /// Fetches and publishes the initial snapshot while queueing whatever
    /// arrives on `events` in the meantime, then replays the queue.
    pub async fn bootstrap_with(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<FrontChange>,
    ) -> Result<BootstrapHandle, SyncError> {
        let snapshot =
            Self::fetch_buffered(&self.source, &self.field_name, &mut self.pending, Some(&mut *events)).await?;
        let handle = self.commit(snapshot);
        tracing::info!(
            system = %handle.system_id,
            field = %handle.field_id,
            members = handle.members,
            active = handle.active,
            buffered = self.pending.len(),
            "Bootstrap complete."
        );
        self.settle(Some(events)).await;
        Ok(handle)
    }

    /// Feeds one stream event. Queued until a snapshot is published.
    pub async fn submit(&mut self, change: FrontChange) {
        self.pending.push_back(change);
        self.settle(None).await;
    }

    /// Bootstraps, then applies stream events until the channel closes.
    ///
    /// Only a bootstrap failure ends this early.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<FrontChange>) -> Result<(), SyncError> {
        self.bootstrap_with(&mut events).await?;

        while let Some(change) = events.recv().await {
            self.pending.push_back(change);
            self.settle(Some(&mut events)).await;
        }

        tracing::info!("Front event channel closed; coordinator stopping.");
        Ok(())
    }

    /// Awaits a snapshot fetch, moving stream events into `pending` while it runs.
    async fn fetch_buffered(
        source: &S,
        field_name: &str,
        pending: &mut VecDeque<FrontChange>,
        events: Option<&mut mpsc::UnboundedReceiver<FrontChange>>,
    ) -> Result<Snapshot, SyncError> {
        let fetch = fetch_snapshot(source, field_name);
        let Some(events) = events else {
            return fetch.await;
        };

        tokio::pin!(fetch);
        loop {
            tokio::select! {
                result = &mut fetch => return result,
                Some(change) = events.recv() => {
                    tracing::trace!(member = %change.member, live = change.live, "Queued front change during fetch.");
                    pending.push_back(change);
                }
            }
        }
    }

    /// Publishes a snapshot. The first commit creates the state; later ones
    /// replace roster, field and active set but keep the projection cache.
    fn commit(&mut self, snapshot: Snapshot) -> BootstrapHandle {
        let handle = BootstrapHandle {
            system_id: snapshot.system_id,
            field_id: snapshot.field.clone(),
            members: snapshot.roster.len(),
            active: snapshot.active.len(),
        };

        let roster = &snapshot.roster;
        self.unresolved.retain(|id| !roster.contains(id));
        self.unresolved.extend(snapshot.unresolved);

        let emitted = if let Some(state) = self.state.as_mut() {
            state.replace_snapshot(snapshot.field, snapshot.roster, snapshot.active)
        } else {
            let mut state = IndicatorState::new(snapshot.field, snapshot.roster, snapshot.active);
            let first = state.recompute();
            self.state = Some(state);
            first
        };
        if let Some(projection) = emitted {
            self.emit(projection);
        }
        handle
    }

    /// Applies queued events in order, re-syncing when one names an unknown member.
    async fn settle(&mut self, mut events: Option<&mut mpsc::UnboundedReceiver<FrontChange>>) {
        if self.state.is_none() {
            return;
        }

        while let Some(change) = self.pending.pop_front() {
            let Some(trigger) = self.apply(change) else {
                continue;
            };

            tracing::info!(member = %trigger.member, "Activation for unknown member; re-syncing roster.");
            if !self.resync(events.as_deref_mut()).await {
                // Dropped; the member's next activation tries again.
                continue;
            }

            let known = self
                .state
                .as_ref()
                .is_some_and(|s| s.roster().contains(&trigger.member));
            if known {
                self.pending.push_front(trigger);
            } else {
                tracing::warn!(member = %trigger.member, "Member still unknown after re-sync; ignoring its activations.");
                self.unresolved.insert(trigger.member);
            }
        }
    }

    /// Applies one change. Returns it back when it needs a re-sync first.
    fn apply(&mut self, change: FrontChange) -> Option<FrontChange> {
        if change.live && self.unresolved.contains(&change.member) {
            tracing::trace!(member = %change.member, "Ignoring activation for unresolvable member.");
            return None;
        }

        let state = self.state.as_mut()?;
        match state.apply_activation(change.member, change.live) {
            ApplyOutcome::Applied(Some(projection)) => {
                self.emit(projection);
                None
            }
            ApplyOutcome::Applied(None) => None,
            ApplyOutcome::UnknownMember(member) => Some(FrontChange { member, live: true }),
        }
    }

    /// Fetches a fresh snapshot and commits it. A failure keeps the current
    /// state. Returns whether a snapshot was committed.
    async fn resync(&mut self, events: Option<&mut mpsc::UnboundedReceiver<FrontChange>>) -> bool {
        match Self::fetch_buffered(&self.source, &self.field_name, &mut self.pending, events).await {
            Ok(snapshot) => {
                let handle = self.commit(snapshot);
                tracing::info!(members = handle.members, active = handle.active, "Re-sync complete.");
                true
            }
            Err(e) => {
                tracing::warn!("Re-sync failed, keeping current state: {}", e);
                false
            }
        }
    }

    fn emit(&self, projection: Projection) {
        tracing::info!(?projection, "Indicator projection changed.");
        if self.notify.send(projection).is_err() {
            tracing::warn!("Projection consumer has gone away; change not delivered.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::source::{CustomField, MemberPayload, SystemIdentity};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    #[derive(Clone)]
    struct FakeSource {
        fields: Vec<CustomField>,
        members: Arc<Mutex<Vec<MemberPayload>>>,
        front: Arc<Mutex<Vec<FrontEntry>>>,
        fail_at: Arc<Mutex<Option<BootstrapStage>>>,
        /// Blocks the n-th (1-based) initial front fetch until notified.
        front_gate: Option<(usize, Arc<Notify>)>,
        front_calls: Arc<AtomicUsize>,
        identity_calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn new(members: serde_json::Value, front: serde_json::Value) -> Self {
            Self {
                fields: serde_json::from_value(json!([
                    { "id": "f-pronouns", "content": { "name": "Pronouns" } },
                    { "id": "f-sig", "content": { "name": "Sign-off" } }
                ]))
                .unwrap(),
                members: Arc::new(Mutex::new(serde_json::from_value(members).unwrap())),
                front: Arc::new(Mutex::new(serde_json::from_value(front).unwrap())),
                fail_at: Arc::new(Mutex::new(None)),
                front_gate: None,
                front_calls: Arc::new(AtomicUsize::new(0)),
                identity_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn check(&self, stage: BootstrapStage) -> anyhow::Result<()> {
            if *self.fail_at.lock().unwrap() == Some(stage) {
                anyhow::bail!("simulated {stage} outage");
            }
            Ok(())
        }
    }

    impl RosterSource for FakeSource {
        async fn fetch_identity(&self) -> anyhow::Result<SystemIdentity> {
            self.identity_calls.fetch_add(1, Ordering::SeqCst);
            self.check(BootstrapStage::Identity)?;
            Ok(SystemIdentity { id: "sys-1".to_string() })
        }

        async fn fetch_field_metadata(&self, _system_id: &str) -> anyhow::Result<Vec<CustomField>> {
            self.check(BootstrapStage::FieldMetadata)?;
            Ok(self.fields.clone())
        }

        async fn fetch_roster(&self, _system_id: &str) -> anyhow::Result<Vec<MemberPayload>> {
            self.check(BootstrapStage::Roster)?;
            Ok(self.members.lock().unwrap().clone())
        }

        async fn fetch_initial_front(&self) -> anyhow::Result<Vec<FrontEntry>> {
            let call = self.front_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((gated_call, gate)) = &self.front_gate {
                if call == *gated_call {
                    gate.notified().await;
                }
            }
            self.check(BootstrapStage::InitialFront)?;
            Ok(self.front.lock().unwrap().clone())
        }
    }

    fn roster_ab() -> serde_json::Value {
        json!([
            { "id": "A", "content": { "info": { "f-sig": "🟢" } } },
            { "id": "B", "content": { "info": { "f-sig": "🔵" } } },
            { "id": "N", "content": { "info": { "f-pronouns": "they" } } }
        ])
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Projection>) -> Vec<Projection> {
        let mut out = Vec::new();
        while let Ok(p) = rx.try_recv() {
            out.push(p);
        }
        out
    }

    fn p(symbols: &[&str]) -> Projection {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn bootstrap_publishes_and_emits_initial_projection() {
        let source = FakeSource::new(
            roster_ab(),
            json!([
                { "content": { "member": "B" } },
                { "content": { "member": "custom-front" } },
                { "content": { "member": "A", "live": false } }
            ]),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = SyncCoordinator::new(source, "Sign-off", tx);

        let handle = coordinator.bootstrap().await.unwrap();

        assert_eq!(handle.system_id, "sys-1");
        assert_eq!(handle.field_id, FieldId::from("f-sig"));
        assert_eq!(handle.members, 3);
        assert_eq!(handle.active, 1);
        assert_eq!(drain(&mut rx), vec![p(&["🔵"])]);
    }

    #[tokio::test]
    async fn missing_field_fails_without_publishing() {
        let source = FakeSource::new(roster_ab(), json!([{ "content": { "member": "A" } }]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = SyncCoordinator::new(source, "Colour", tx);

        let err = coordinator.bootstrap().await.unwrap_err();

        assert!(matches!(err, SyncError::FieldNotFound(ref name) if name == "Colour"));
        assert_eq!(err.stage(), BootstrapStage::FieldMetadata);
        assert!(coordinator.state().is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn failed_stage_is_reported_and_nothing_is_applied() {
        let mut source = FakeSource::new(roster_ab(), json!([{ "content": { "member": "A" } }]));
        *source.fail_at.lock().unwrap() = Some(BootstrapStage::InitialFront);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = SyncCoordinator::new(source, "Sign-off", tx);

        coordinator.submit(FrontChange::new("B", true)).await;
        let err = coordinator.bootstrap().await.unwrap_err();

        assert!(matches!(err, SyncError::Bootstrap { stage: BootstrapStage::InitialFront, .. }));
        assert!(coordinator.state().is_none());
        assert_eq!(coordinator.pending_len(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn events_before_bootstrap_are_replayed_in_order() {
        let source = FakeSource::new(roster_ab(), json!([]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = SyncCoordinator::new(source, "Sign-off", tx);

        coordinator.submit(FrontChange::new("A", true)).await;
        coordinator.submit(FrontChange::new("A", false)).await;
        coordinator.submit(FrontChange::new("B", true)).await;
        assert_eq!(coordinator.pending_len(), 3);
        assert!(drain(&mut rx).is_empty());

        coordinator.bootstrap().await.unwrap();

        assert_eq!(coordinator.pending_len(), 0);
        assert_eq!(drain(&mut rx), vec![p(&["🟢"]), p(&["🔵"])]);
    }

    #[tokio::test]
    async fn run_buffers_stream_events_while_bootstrap_is_in_flight() {
        let mut source = FakeSource::new(roster_ab(), json!([{ "content": { "member": "A" } }]));
        let gate = Arc::new(Notify::new());
        source.front_gate = Some((1, gate.clone()));

        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let coordinator = SyncCoordinator::new(source, "Sign-off", notify_tx);
        let task = tokio::spawn(coordinator.run(event_rx));

        event_tx.send(FrontChange::new("B", true)).unwrap();
        event_tx.send(FrontChange::new("A", false)).unwrap();
        tokio::task::yield_now().await;
        gate.notify_one();
        drop(event_tx);

        task.await.unwrap().unwrap();
        assert_eq!(drain(&mut notify_rx), vec![p(&["🟢"]), p(&["🟢", "🔵"]), p(&["🔵"])]);
    }

    #[tokio::test]
    async fn unknown_activation_triggers_resync() {
        let source = FakeSource::new(roster_ab(), json!([{ "content": { "member": "A" } }]));
        let members = source.members.clone();
        let calls = source.identity_calls.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = SyncCoordinator::new(source, "Sign-off", tx);
        coordinator.bootstrap().await.unwrap();
        assert_eq!(drain(&mut rx), vec![p(&["🟢"])]);

        // C joins the system after bootstrap.
        members.lock().unwrap().push(
            serde_json::from_value(json!({ "id": "C", "content": { "info": { "f-sig": "🟣" } } })).unwrap(),
        );
        coordinator.submit(FrontChange::new("C", true)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(drain(&mut rx), vec![p(&["🟢", "🟣"])]);
        assert!(coordinator.state().unwrap().active().contains(&MemberId::from("C")));
    }

    #[tokio::test]
    async fn failed_resync_leaves_member_resyncable() {
        let source = FakeSource::new(roster_ab(), json!([{ "content": { "member": "A" } }]));
        let members = source.members.clone();
        let fail_at = source.fail_at.clone();
        let calls = source.identity_calls.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = SyncCoordinator::new(source, "Sign-off", tx);
        coordinator.bootstrap().await.unwrap();
        assert_eq!(drain(&mut rx), vec![p(&["🟢"])]);

        members.lock().unwrap().push(
            serde_json::from_value(json!({ "id": "C", "content": { "info": { "f-sig": "🟣" } } })).unwrap(),
        );
        *fail_at.lock().unwrap() = Some(BootstrapStage::Roster);
        coordinator.submit(FrontChange::new("C", true)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(drain(&mut rx).is_empty());
        assert!(!coordinator.state().unwrap().active().contains(&MemberId::from("C")));
        assert_eq!(coordinator.pending_len(), 0);

        // Outage over: the next activation re-syncs and lands.
        *fail_at.lock().unwrap() = None;
        coordinator.submit(FrontChange::new("C", false)).await;
        coordinator.submit(FrontChange::new("C", true)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(drain(&mut rx), vec![p(&["🟢", "🟣"])]);
        assert!(coordinator.state().unwrap().active().contains(&MemberId::from("C")));
    }

    #[tokio::test]
    async fn run_queues_stream_events_during_resync_and_replays_in_order() {
        let mut source = FakeSource::new(roster_ab(), json!([{ "content": { "member": "A" } }]));
        let gate = Arc::new(Notify::new());
        source.front_gate = Some((2, gate.clone()));
        let members = source.members.clone();
        let front_calls = source.front_calls.clone();

        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let coordinator = SyncCoordinator::new(source, "Sign-off", notify_tx);
        let task = tokio::spawn(coordinator.run(event_rx));

        assert_eq!(notify_rx.recv().await, Some(p(&["🟢"])));

        members.lock().unwrap().push(
            serde_json::from_value(json!({ "id": "C", "content": { "info": { "f-sig": "🟣" } } })).unwrap(),
        );
        event_tx.send(FrontChange::new("C", true)).unwrap();

        // Wait until the re-sync is parked on its initial front fetch.
        while front_calls.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        event_tx.send(FrontChange::new("B", true)).unwrap();
        event_tx.send(FrontChange::new("A", false)).unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(notify_rx.try_recv().is_err());

        gate.notify_one();
        drop(event_tx);
        task.await.unwrap().unwrap();

        assert_eq!(
            drain(&mut notify_rx),
            vec![p(&["🟢", "🟣"]), p(&["🟢", "🟣", "🔵"]), p(&["🟣", "🔵"])]
        );
    }

    #[tokio::test]
    async fn member_still_unknown_after_resync_is_not_resynced_again() {
        let source = FakeSource::new(roster_ab(), json!([]));
        let calls = source.identity_calls.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = SyncCoordinator::new(source, "Sign-off", tx);
        coordinator.bootstrap().await.unwrap();

        coordinator.submit(FrontChange::new("ghost", true)).await;
        coordinator.submit(FrontChange::new("ghost", true)).await;
        coordinator.submit(FrontChange::new("A", true)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!coordinator.state().unwrap().active().contains(&MemberId::from("ghost")));
        assert_eq!(drain(&mut rx), vec![p(&["🟢"])]);
    }

    #[tokio::test]
    async fn initial_front_custom_fronts_never_trigger_resync() {
        let source = FakeSource::new(roster_ab(), json!([{ "content": { "member": "custom-front" } }]));
        let calls = source.identity_calls.clone();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut coordinator = SyncCoordinator::new(source, "Sign-off", tx);
        coordinator.bootstrap().await.unwrap();

        coordinator.submit(FrontChange::new("custom-front", false)).await;
        coordinator.submit(FrontChange::new("custom-front", true)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
