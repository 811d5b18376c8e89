//! # lib_indicator
//!
//! Keeps a live, locally cached view of who is fronting in a Simply Plural
//! system and turns every externally visible change of that view into a
//! compact list of indicator symbols.
//!
//! The crate is split by folder, each behind its own feature:
//! - **`engine`**: roster store, active-set tracking, projection change
//!   detection and the [`engine::SyncCoordinator`] that owns them.
//! - **`retrieve`**: the retrying HTTP client and the REST collaborator used
//!   for bootstrap snapshots.
//! - **`ingestors`**: the authenticated WebSocket session that streams front
//!   changes into the engine.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

#[cfg(feature = "engine")]
pub mod engine;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "ingestors")]
pub mod ingestors;
