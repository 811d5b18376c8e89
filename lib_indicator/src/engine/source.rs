//! # Roster Source
//!
//! The read-only REST collaborator the coordinator bootstraps from, and the
//! payload shapes it returns. The remote schema belongs to the collaborator;
//! only the fields the engine reads are modelled here.

use std::collections::HashMap;
use std::future::Future;

use serde::Deserialize;
use serde_json::Value;

use super::model::{FieldId, MemberId, MemberRecord};

/// Four idempotent reads that together form a snapshot.
pub trait RosterSource: Send + Sync {
    /// The authenticated system's identity.
    fn fetch_identity(&self) -> impl Future<Output = anyhow::Result<SystemIdentity>> + Send;

    /// Custom field definitions of the system.
    fn fetch_field_metadata(
        &self,
        system_id: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<CustomField>>> + Send;

    /// Every member of the system.
    fn fetch_roster(
        &self,
        system_id: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<MemberPayload>>> + Send;

    /// The members fronting right now.
    fn fetch_initial_front(&self) -> impl Future<Output = anyhow::Result<Vec<FrontEntry>>> + Send;
}

/// `GET me`
#[derive(Debug, Clone, Deserialize)]
pub struct SystemIdentity {
    /// The system id used by the other endpoints.
    pub id: String,
}

/// One entry of `GET customFields/{system}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomField {
    /// The field id members' `info` maps are keyed by.
    pub id: FieldId,
    /// Field definition; missing on malformed entries.
    #[serde(default)]
    pub content: Option<CustomFieldContent>,
}

/// Definition body of a custom field.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomFieldContent {
    /// Human-readable field name.
    #[serde(default)]
    pub name: Option<String>,
}

impl CustomField {
    /// The field's display name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.name.as_deref())
    }
}

/// Returns the id of the first field named `name`.
pub fn resolve_field<'a>(fields: &'a [CustomField], name: &str) -> Option<&'a FieldId> {
    fields.iter().find(|f| f.name() == Some(name)).map(|f| &f.id)
}

/// One entry of `GET members/{system}`.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberPayload {
    /// Member id.
    pub id: MemberId,
    /// Member body; custom field values live under `info`.
    #[serde(default)]
    pub content: MemberContent,
}

/// Body of a member payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberContent {
    /// Field id → raw value.
    #[serde(default)]
    pub info: HashMap<String, Value>,
}

impl From<MemberPayload> for MemberRecord {
    /// Keeps only non-empty string values; anything else counts as absent.
    fn from(payload: MemberPayload) -> Self {
        let field_values = payload
            .content
            .info
            .into_iter()
            .filter_map(|(field, value)| match value {
                Value::String(s) if !s.is_empty() => Some((FieldId(field), s)),
                _ => None,
            })
            .collect();
        MemberRecord {
            id: payload.id,
            field_values,
        }
    }
}

/// One entry of `GET fronters/`.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontEntry {
    /// Front body.
    pub content: FrontEntryContent,
}

/// Body of a fronters entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontEntryContent {
    /// The fronting member (or custom front) id.
    pub member: MemberId,
    /// Present on some entries; `Some(false)` marks an entry that is not live.
    #[serde(default)]
    pub live: Option<bool>,
}

impl FrontEntry {
    /// Whether this entry should count as fronting.
    pub fn is_live(&self) -> bool {
        self.content.live != Some(false)
    }
}
