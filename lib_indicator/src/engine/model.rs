use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque member identifier, stable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

/// Opaque identifier of the custom field holding each member's indicator symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Borrows the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(MemberId);
string_id!(FieldId);

/// A member as known to the roster store.
///
/// Only fields that hold a usable symbol are kept in `field_values`; a field
/// missing from the map is the "absent" case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    /// The member's identity.
    pub id: MemberId,
    /// Field id → symbol for every field with a non-empty value.
    pub field_values: HashMap<FieldId, String>,
}

impl MemberRecord {
    /// Creates a record with no field values.
    pub fn new(id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            field_values: HashMap::new(),
        }
    }

    /// Builder-style helper setting one field value.
    pub fn with_field(mut self, field: impl Into<FieldId>, symbol: impl Into<String>) -> Self {
        self.field_values.insert(field.into(), symbol.into());
        self
    }

    /// The symbol stored for `field`, if any.
    pub fn symbol(&self, field: &FieldId) -> Option<&str> {
        self.field_values.get(field).map(String::as_str)
    }
}

/// One front activation or deactivation decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontChange {
    /// The member whose front state changed.
    pub member: MemberId,
    /// `true` when the member started fronting.
    pub live: bool,
}

impl FrontChange {
    /// Shorthand constructor.
    pub fn new(member: impl Into<MemberId>, live: bool) -> Self {
        Self {
            member: member.into(),
            live,
        }
    }
}

/// The externally visible, order-stable list of indicator symbols.
pub type Projection = Vec<String>;
