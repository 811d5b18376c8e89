//! # Sync Engine Module
//!
//! The state synchronization and change-detection engine. It reconciles a
//! REST snapshot of the system with a concurrently arriving stream of front
//! changes and announces the indicator projection only when it visibly changes.
//!
//! ## Components (leaf first):
//!
//! - **`roster`**: the authoritative member → field values mapping.
//! - **`active_set`**: the ordered set of members currently fronting.
//! - **`projection`**: the pure projection function plus the last-emitted cache.
//! - **`tracker`**: one explicit instance tying the three together.
//! - **`source`**: the read-only REST collaborator contract used for snapshots.
//! - **`coordinator`**: bootstrap ordering, pre-bootstrap buffering and re-sync.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Identifiers, member records and stream change events.
pub mod model;
/// Error taxonomy for bootstrap and re-sync.
pub mod errors;
/// The member roster keyed by member id.
pub mod roster;
/// Insertion-ordered set of fronting members.
pub mod active_set;
/// Projection derivation and change detection.
pub mod projection;
/// Per-instance state: roster, active set, field id and projection cache.
pub mod tracker;
/// The REST collaborator contract and its payload shapes.
pub mod source;
/// Bootstrap orchestration and stream event sequencing.
pub mod coordinator;

// --- Public API Re-exports ---
pub use active_set::ActiveSet;
pub use coordinator::{BootstrapHandle, SyncCoordinator};
pub use errors::{BootstrapStage, SyncError};
pub use model::{FieldId, FrontChange, MemberId, MemberRecord, Projection};
pub use projection::ProjectionEngine;
pub use roster::RosterStore;
pub use source::RosterSource;
pub use tracker::{ApplyOutcome, IndicatorState};
