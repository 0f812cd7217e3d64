use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod error;
pub mod paths;
pub mod recovery;

pub use error::{QuarantineError, Result};

// Re-export key recovery types
pub use recovery::{
    detect_extension, recover, AllowedExtensions, GroupOutcome, RecoveryConfig, RecoveryEngine,
    RecoveryProgress, RecoveryStage, SegmentOutcome, SignatureDetector,
};

pub use paths::{FixedPathLimit, PathLimit, SystemPathLimit};

/// Outcome of one recovery run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineReport {
    /// Files written to the destination, in processing order
    pub recovered: Vec<PathBuf>,
    /// Source paths that could not be recovered
    pub skipped: Vec<PathBuf>,
    /// Number of quarantine files found under the root
    pub total: usize,
    pub generated_at: DateTime<Utc>,
}

impl QuarantineReport {
    /// One-line summary as printed by the CLI
    pub fn summary(&self, root: &Path, destination: &Path) -> String {
        format!(
            "Converted {} of {} files from '{}' to '{}'.",
            self.recovered.len(),
            self.total,
            root.display(),
            destination.display()
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
