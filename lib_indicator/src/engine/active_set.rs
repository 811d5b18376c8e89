//! # Active-Set Tracker
//!
//! Holds the members currently fronting. Iteration follows first-activation
//! order so that identical sets always project to identical sequences.

use super::model::MemberId;

/// Insertion-ordered set of fronting members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet {
    order: Vec<MemberId>,
}

impl ActiveSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from ids in activation order, dropping repeats.
    pub fn from_ids(ids: impl IntoIterator<Item = MemberId>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.apply(id, true);
        }
        set
    }

    /// Moves `id` into the requested state.
    ///
    /// Activating appends to the end of the order, deactivating removes. A
    /// request for the state the member is already in is a no-op, since the
    /// stream may redeliver the same event after a reconnect.
    ///
    /// Returns `true` when the set actually changed.
    pub fn apply(&mut self, id: MemberId, is_active: bool) -> bool {
        let position = self.order.iter().position(|m| *m == id);
        match (is_active, position) {
            (true, None) => {
                self.order.push(id);
                true
            }
            (false, Some(index)) => {
                self.order.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Whether `id` is fronting.
    pub fn contains(&self, id: &MemberId) -> bool {
        self.order.contains(id)
    }

    /// Members in first-activation order.
    pub fn iter(&self) -> impl Iterator<Item = &MemberId> + '_ {
        self.order.iter()
    }

    /// Number of fronting members.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nobody is fronting.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
