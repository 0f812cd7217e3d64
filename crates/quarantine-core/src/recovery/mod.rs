/// Quarantine recovery pipeline: detection, grouping, reassembly, orchestration
pub mod engine;
pub mod reassembly;
pub mod segments;
pub mod signatures;

pub use signatures::{
    detect_extension, AllowedExtensions, MediaSignature, SignatureDetector, MEDIA_SIGNATURES,
};

pub use segments::{
    classify, find_quarantine_files, scan_segments, Classification, CompleteFile,
    QuarantineSegment, SegmentGroup, SegmentScan,
};

pub use reassembly::{concatenate, reassemble_group, Reassembly, SPLIT_ARCHIVE_MARKER};

pub use engine::{
    recover, GroupOutcome, RecoveryConfig, RecoveryEngine, RecoveryProgress, RecoveryStage,
    SegmentOutcome,
};
