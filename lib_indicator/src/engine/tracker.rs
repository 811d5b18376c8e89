//! # Indicator State
//!
//! One explicit instance of everything the engine mutates: the roster, the
//! resolved indicator field, the active set and the projection cache. Several
//! instances can live side by side; nothing here is global.

use super::active_set::ActiveSet;
use super::model::{FieldId, MemberId, Projection};
use super::projection::ProjectionEngine;
use super::roster::RosterStore;

/// Result of applying one activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The activation was applied (possibly as a no-op). Carries the
    /// projection to announce, if the emission rule produced one.
    Applied(Option<Projection>),
    /// Activation of a member the roster does not know. Nothing was applied;
    /// the caller should treat this as a re-sync signal.
    UnknownMember(MemberId),
}

/// Roster, field, active set and projection cache for one system.
#[derive(Debug, Clone)]
pub struct IndicatorState {
    field: FieldId,
    roster: RosterStore,
    active: ActiveSet,
    projection: ProjectionEngine,
}

impl IndicatorState {
    /// Wraps a freshly published snapshot. Nothing has been emitted yet.
    pub fn new(field: FieldId, roster: RosterStore, active: ActiveSet) -> Self {
        Self {
            field,
            roster,
            active,
            projection: ProjectionEngine::new(),
        }
    }

    /// Applies one activation and re-evaluates the projection.
    ///
    /// Only members present in the roster are ever inserted.
    pub fn apply_activation(&mut self, id: MemberId, is_active: bool) -> ApplyOutcome {
        if is_active && !self.roster.contains(&id) {
            return ApplyOutcome::UnknownMember(id);
        }

        if self.active.apply(id.clone(), is_active) {
            tracing::debug!(member = %id, is_active, "Active set changed.");
        }
        ApplyOutcome::Applied(self.recompute())
    }

    /// Replaces roster, field and active set with a new snapshot while
    /// keeping the last recorded projection, then re-evaluates.
    pub fn replace_snapshot(
        &mut self,
        field: FieldId,
        roster: RosterStore,
        active: ActiveSet,
    ) -> Option<Projection> {
        self.field = field;
        self.roster = roster;
        self.active = active;
        self.recompute()
    }

    /// Re-evaluates the projection against the current inputs.
    pub fn recompute(&mut self) -> Option<Projection> {
        self.projection
            .recompute(&self.roster, &self.active, &self.field)
    }

    /// The resolved indicator field.
    pub fn field(&self) -> &FieldId {
        &self.field
    }

    /// The roster store.
    pub fn roster(&self) -> &RosterStore {
        &self.roster
    }

    /// The active set.
    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    /// The most recently recorded projection.
    pub fn last_emitted(&self) -> &[String] {
        self.projection.last_emitted()
    }
}
