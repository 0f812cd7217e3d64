//! Error type shared by the quarantine pipeline

use std::path::PathBuf;

/// Failures the pipeline can report.
///
/// Only scanning the root and preparing the destination propagate these to the
/// caller. Everything that happens to a single file or segment group is caught
/// by the engine and turned into a skip record.
#[derive(Debug, thiserror::Error)]
pub enum QuarantineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Root folder '{}' not found", .0.display())]
    MissingRoot(PathBuf),
}

pub type Result<T> = std::result::Result<T, QuarantineError>;
