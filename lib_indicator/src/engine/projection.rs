//! # Projection Engine
//!
//! Derives the indicator list from the roster and the active set, and decides
//! whether a freshly derived list is worth announcing.
//!
//! ## Emission rule
//! - Same as the last recorded projection: nothing happens.
//! - Different and non-empty: recorded and returned for emission.
//! - Different and empty: recorded silently, nothing returned. Recording the
//!   empty list is what lets a later return to a previously announced list be
//!   detected as a change.

use super::active_set::ActiveSet;
use super::model::{FieldId, Projection};
use super::roster::RosterStore;

/// Maps the active set to symbols in activation order, skipping members
/// without a symbol for `field`.
pub fn project(roster: &RosterStore, active: &ActiveSet, field: &FieldId) -> Projection {
    active
        .iter()
        .filter_map(|id| roster.symbol_for(id, field))
        .map(str::to_owned)
        .collect()
}

/// Caches the last recorded projection for change detection.
#[derive(Debug, Clone, Default)]
pub struct ProjectionEngine {
    last_emitted: Projection,
}

impl ProjectionEngine {
    /// An engine that has recorded nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derives the projection and applies the emission rule.
    pub fn recompute(
        &mut self,
        roster: &RosterStore,
        active: &ActiveSet,
        field: &FieldId,
    ) -> Option<Projection> {
        let next = project(roster, active, field);
        if next == self.last_emitted {
            return None;
        }

        self.last_emitted = next;
        if self.last_emitted.is_empty() {
            tracing::debug!("Projection became empty; recorded without emitting.");
            None
        } else {
            Some(self.last_emitted.clone())
        }
    }

    /// The most recently recorded projection.
    pub fn last_emitted(&self) -> &[String] {
        &self.last_emitted
    }
}
