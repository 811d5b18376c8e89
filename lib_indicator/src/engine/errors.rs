use std::fmt;

use thiserror::Error;

/// The bootstrap step that was running when a snapshot fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStage {
    /// Resolving the system id.
    Identity,
    /// Fetching custom field metadata.
    FieldMetadata,
    /// Fetching the member roster.
    Roster,
    /// Fetching the members fronting right now.
    InitialFront,
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapStage::Identity => "identity",
            BootstrapStage::FieldMetadata => "field metadata",
            BootstrapStage::Roster => "roster",
            BootstrapStage::InitialFront => "initial front",
        };
        f.write_str(name)
    }
}

/// Failures that stop a bootstrap (or a re-sync) from publishing a snapshot.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A collaborator call failed or returned an unexpected payload.
    #[error("bootstrap failed at the {stage} stage: {cause:#}")]
    Bootstrap {
        /// The step that failed.
        stage: BootstrapStage,
        /// The underlying network or decode failure.
        cause: anyhow::Error,
    },

    /// No custom field matches the configured indicator field name.
    #[error("no custom field is named '{0}'")]
    FieldNotFound(String),
}

impl SyncError {
    pub(crate) fn at(stage: BootstrapStage) -> impl FnOnce(anyhow::Error) -> SyncError {
        move |cause| SyncError::Bootstrap { stage, cause }
    }

    /// The stage a bootstrap failure belongs to. `FieldNotFound` is reported
    /// as a field metadata failure.
    pub fn stage(&self) -> BootstrapStage {
        match self {
            SyncError::Bootstrap { stage, .. } => *stage,
            SyncError::FieldNotFound(_) => BootstrapStage::FieldMetadata,
        }
    }
}
