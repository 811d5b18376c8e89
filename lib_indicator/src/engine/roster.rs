//! # Roster Store
//!
//! The authoritative member → field values mapping. Built once per snapshot
//! and replaced wholesale on re-sync; the stream never touches it.

use std::collections::HashMap;

use super::model::{FieldId, MemberId, MemberRecord};

/// All members of the system, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct RosterStore {
    members: HashMap<MemberId, MemberRecord>,
}

impl RosterStore {
    /// Builds a store from fetched records. A later duplicate id replaces an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = MemberRecord>) -> Self {
        let members = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self { members }
    }

    /// Looks up a member.
    pub fn get(&self, id: &MemberId) -> Option<&MemberRecord> {
        self.members.get(id)
    }

    /// Whether the member exists in the roster.
    pub fn contains(&self, id: &MemberId) -> bool {
        self.members.contains_key(id)
    }

    /// The indicator symbol of `id` for `field`, if the member exists and has one.
    pub fn symbol_for(&self, id: &MemberId, field: &FieldId) -> Option<&str> {
        self.get(id).and_then(|record| record.symbol(field))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the roster holds no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
