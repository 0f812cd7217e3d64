/// End-to-end quarantine recovery
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{QuarantineError, Result};
use crate::paths::{
    long_path, safe_copy, shorten_destination, unique_destination, PathLimit, SystemPathLimit,
};
use crate::recovery::reassembly::reassemble_group;
use crate::recovery::segments::{scan_segments, CompleteFile, SegmentGroup};
use crate::recovery::signatures::{AllowedExtensions, SignatureDetector};
use crate::QuarantineReport;

/// Recovery engine configuration
#[derive(Debug, Clone, Default)]
pub struct RecoveryConfig {
    pub allowed_extensions: AllowedExtensions,
    pub detector: SignatureDetector,
}

impl RecoveryConfig {
    pub fn with_allowed_extensions(mut self, allowed: AllowedExtensions) -> Self {
        self.allowed_extensions = allowed;
        self
    }

    pub fn with_detector(mut self, detector: SignatureDetector) -> Self {
        self.detector = detector;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    Scanning,
    CopyingSegments,
    ReassemblingArchives,
    Complete,
}

#[derive(Debug, Clone)]
pub struct RecoveryProgress {
    pub stage: RecoveryStage,
    /// Units (complete files plus groups) handled so far
    pub processed: usize,
    pub units: usize,
    pub recovered: usize,
    pub skipped: usize,
}

/// What became of one complete single-segment file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    Recovered(PathBuf),
    Skipped(PathBuf),
}

/// What became of one segment group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    Recovered(Vec<PathBuf>),
    /// Representative path is the terminal segment
    Skipped(PathBuf),
}

/// Quarantine recovery engine
pub struct RecoveryEngine {
    config: RecoveryConfig,
    path_limit: Box<dyn PathLimit>,
    progress_callback: Option<Box<dyn Fn(RecoveryProgress)>>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

impl RecoveryEngine {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            path_limit: Box::new(SystemPathLimit),
            progress_callback: None,
        }
    }

    /// Replace the platform path limit, e.g. with a `FixedPathLimit`
    pub fn with_path_limit(mut self, limit: impl PathLimit + 'static) -> Self {
        self.path_limit = Box::new(limit);
        self
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(RecoveryProgress) + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    fn emit_progress(&self, progress: RecoveryProgress) {
        if let Some(ref callback) = self.progress_callback {
            callback(progress);
        }
    }

    /// Recover every quarantined file under `root` into `destination`.
    ///
    /// Fails only when `root` cannot be scanned or `destination` cannot be
    /// created. Everything else ends up in the report's skipped list.
    pub fn recover(&self, root: &Path, destination: &Path) -> Result<QuarantineReport> {
        if !long_path(root).is_dir() {
            return Err(QuarantineError::MissingRoot(root.to_path_buf()));
        }
        let limit = self.path_limit.effective_limit();

        let destination = shorten_destination(destination, limit);
        fs::create_dir_all(long_path(&destination))?;

        self.emit_progress(RecoveryProgress {
            stage: RecoveryStage::Scanning,
            processed: 0,
            units: 0,
            recovered: 0,
            skipped: 0,
        });
        let scan = scan_segments(
            root,
            &self.config.detector,
            &self.config.allowed_extensions,
        )?;

        let units = scan.complete.len() + scan.groups.len();
        let mut recovered = Vec::new();
        let mut skipped = scan.skipped;
        let mut processed = 0;

        for file in &scan.complete {
            match self.recover_complete(file, &destination, limit) {
                SegmentOutcome::Recovered(path) => recovered.push(path),
                SegmentOutcome::Skipped(path) => skipped.push(path),
            }
            processed += 1;
            self.emit_progress(RecoveryProgress {
                stage: RecoveryStage::CopyingSegments,
                processed,
                units,
                recovered: recovered.len(),
                skipped: skipped.len(),
            });
        }

        for group in &scan.groups {
            match self.recover_group(group, &destination, limit) {
                GroupOutcome::Recovered(paths) => recovered.extend(paths),
                GroupOutcome::Skipped(path) => skipped.push(path),
            }
            processed += 1;
            self.emit_progress(RecoveryProgress {
                stage: RecoveryStage::ReassemblingArchives,
                processed,
                units,
                recovered: recovered.len(),
                skipped: skipped.len(),
            });
        }

        self.emit_progress(RecoveryProgress {
            stage: RecoveryStage::Complete,
            processed,
            units,
            recovered: recovered.len(),
            skipped: skipped.len(),
        });

        tracing::info!(
            "Recovered {} of {} quarantine files from {} ({} skipped)",
            recovered.len(),
            scan.total,
            root.display(),
            skipped.len()
        );

        Ok(QuarantineReport {
            recovered,
            skipped,
            total: scan.total,
            generated_at: Utc::now(),
        })
    }

    /// Copy a complete single-segment file under its detected extension
    pub fn recover_complete(
        &self,
        file: &CompleteFile,
        destination: &Path,
        limit: usize,
    ) -> SegmentOutcome {
        let Some(target) = unique_destination(destination, &file.output_name(), limit) else {
            tracing::warn!(
                "No free name for {} within {} characters",
                file.segment.path.display(),
                limit
            );
            return SegmentOutcome::Skipped(file.segment.path.clone());
        };
        match safe_copy(&file.segment.path, &target, limit) {
            Ok(written) => {
                tracing::debug!("{} -> {}", file.segment.path.display(), written.display());
                SegmentOutcome::Recovered(written)
            }
            Err(e) => {
                tracing::warn!("Failed to copy {}: {}", file.segment.path.display(), e);
                SegmentOutcome::Skipped(file.segment.path.clone())
            }
        }
    }

    /// Reassemble a group and copy the media it yields
    pub fn recover_group(
        &self,
        group: &SegmentGroup,
        destination: &Path,
        limit: usize,
    ) -> GroupOutcome {
        let Some(terminal) = group.terminal() else {
            return GroupOutcome::Recovered(Vec::new());
        };
        let representative = terminal.path.clone();

        let reassembly = match reassemble_group(
            group,
            &self.config.detector,
            &self.config.allowed_extensions,
        ) {
            Ok(reassembly) => reassembly,
            Err(QuarantineError::Archive(e)) => {
                tracing::warn!(
                    "Skipping invalid zip archive {}: {}",
                    representative.display(),
                    e
                );
                return GroupOutcome::Skipped(representative);
            }
            Err(e) => {
                tracing::warn!("Failed to reassemble {}: {}", representative.display(), e);
                return GroupOutcome::Skipped(representative);
            }
        };

        let mut copied = Vec::new();
        for entry in &reassembly.entries {
            let Some(name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let Some(target) = unique_destination(destination, &name, limit) else {
                tracing::warn!("No free name for extracted {} within {} characters", name, limit);
                continue;
            };
            match safe_copy(entry, &target, limit) {
                Ok(written) => copied.push(written),
                Err(e) => tracing::warn!("Failed to copy extracted {}: {}", entry.display(), e),
            }
        }

        if copied.is_empty() {
            tracing::warn!(
                "No media recovered from {} ({} segments)",
                representative.display(),
                group.len()
            );
            return GroupOutcome::Skipped(representative);
        }
        GroupOutcome::Recovered(copied)
    }
}

/// Recover with the default configuration and the platform path limit
pub fn recover(root: &Path, destination: &Path) -> Result<QuarantineReport> {
    RecoveryEngine::default().recover(root, destination)
}
