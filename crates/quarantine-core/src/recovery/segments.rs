/// Discovery and classification of quarantine segment files
///
/// The backup tool stores quarantined media as `<base>.zip_file_<N>`. Some of
/// these are whole media files that only lost their extension, others are
/// numbered pieces of a split zip archive. Classification separates the two
/// by looking at the leading bytes of each file.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::Result;
use crate::paths::long_path;
use crate::recovery::signatures::{AllowedExtensions, SignatureDetector};

/// Literal marker every quarantine file name carries
pub const SEGMENT_MARKER: &str = ".zip_file_";

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.+)\.zip_file_(\d+)$").expect("segment pattern is a valid regex")
    })
}

/// One numbered quarantine file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineSegment {
    pub path: PathBuf,
    /// Original file stem, without the `.zip_file_N` wrapper
    pub base: String,
    pub index: u64,
}

impl QuarantineSegment {
    /// Parse a segment from its file name. `None` if the name does not match.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let captures = segment_pattern().captures(name)?;
        let index = captures[2].parse::<u64>().ok()?;
        Some(Self {
            path: path.to_path_buf(),
            base: captures[1].to_string(),
            index,
        })
    }

    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Segments sharing a parent directory and base name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentGroup {
    pub directory: PathBuf,
    pub base: String,
    segments: Vec<QuarantineSegment>,
}

impl SegmentGroup {
    pub fn new(directory: PathBuf, base: String) -> Self {
        Self {
            directory,
            base,
            segments: Vec::new(),
        }
    }

    pub fn push(&mut self, segment: QuarantineSegment) {
        self.segments.push(segment);
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments sorted by ascending index
    pub fn ordered(&self) -> Vec<&QuarantineSegment> {
        let mut ordered: Vec<&QuarantineSegment> = self.segments.iter().collect();
        ordered.sort_by_key(|segment| segment.index);
        ordered
    }

    /// Highest-index segment, the final piece of the archive
    pub fn terminal(&self) -> Option<&QuarantineSegment> {
        self.segments.iter().max_by_key(|segment| segment.index)
    }

    /// All segments but the terminal one, ascending
    pub fn intermediates(&self) -> Vec<&QuarantineSegment> {
        let mut ordered = self.ordered();
        ordered.pop();
        ordered
    }
}

/// A segment that already holds a complete media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteFile {
    pub segment: QuarantineSegment,
    /// Detected extension, with leading dot
    pub extension: &'static str,
}

impl CompleteFile {
    /// Name the file gets in the destination
    pub fn output_name(&self) -> String {
        format!("{}{}", self.segment.base, self.extension)
    }
}

/// How a single segment is routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Complete(CompleteFile),
    ArchivePart(QuarantineSegment),
    Rejected(PathBuf),
}

/// Result of scanning a root directory
#[derive(Debug, Clone, Default)]
pub struct SegmentScan {
    /// Number of files carrying the segment marker, whatever their fate
    pub total: usize,
    pub complete: Vec<CompleteFile>,
    pub groups: Vec<SegmentGroup>,
    pub skipped: Vec<PathBuf>,
}

/// Find every regular file under `root` whose name carries the segment marker.
pub fn find_quarantine_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(long_path(root)).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let has_marker = entry
            .file_name()
            .to_str()
            .map(|name| name.contains(SEGMENT_MARKER))
            .unwrap_or(false);
        if has_marker {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Classify one quarantine file.
pub fn classify(
    path: &Path,
    detector: &SignatureDetector,
    allowed: &AllowedExtensions,
) -> Classification {
    let Some(segment) = QuarantineSegment::from_path(path) else {
        tracing::debug!("Not a quarantine segment name: {}", path.display());
        return Classification::Rejected(path.to_path_buf());
    };

    match detector.detect_extension(path) {
        Ok(Some(extension)) if allowed.contains(extension) => {
            tracing::debug!("{} is a complete {} file", path.display(), extension);
            Classification::Complete(CompleteFile { segment, extension })
        }
        Ok(Some(extension)) => {
            tracing::debug!("{} detected as disallowed {}", path.display(), extension);
            Classification::Rejected(path.to_path_buf())
        }
        Ok(None) => Classification::ArchivePart(segment),
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", path.display(), e);
            Classification::Rejected(path.to_path_buf())
        }
    }
}

/// Scan `root` and sort its quarantine files into complete files and groups.
pub fn scan_segments(
    root: &Path,
    detector: &SignatureDetector,
    allowed: &AllowedExtensions,
) -> Result<SegmentScan> {
    let paths = find_quarantine_files(root)?;
    let mut scan = SegmentScan {
        total: paths.len(),
        ..Default::default()
    };

    let mut group_index: HashMap<(PathBuf, String), usize> = HashMap::new();
    for path in &paths {
        match classify(path, detector, allowed) {
            Classification::Complete(file) => scan.complete.push(file),
            Classification::Rejected(path) => scan.skipped.push(path),
            Classification::ArchivePart(segment) => {
                let key = (segment.directory().to_path_buf(), segment.base.clone());
                let slot = *group_index.entry(key).or_insert_with(|| {
                    scan.groups.push(SegmentGroup::new(
                        segment.directory().to_path_buf(),
                        segment.base.clone(),
                    ));
                    scan.groups.len() - 1
                });
                scan.groups[slot].push(segment);
            }
        }
    }

    tracing::debug!(
        "Scanned {}: {} segment files, {} complete, {} groups, {} rejected",
        root.display(),
        scan.total,
        scan.complete.len(),
        scan.groups.len(),
        scan.skipped.len()
    );
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn segment(name: &str) -> Option<QuarantineSegment> {
        QuarantineSegment::from_path(Path::new(name))
    }

    #[test]
    fn test_segment_name_parsing() {
        let parsed = segment("/backup/IMG_0001.zip_file_3").unwrap();
        assert_eq!(parsed.base, "IMG_0001");
        assert_eq!(parsed.index, 3);
        assert_eq!(parsed.directory(), Path::new("/backup"));

        let dotted = segment("holiday.2019.final.zip_file_0").unwrap();
        assert_eq!(dotted.base, "holiday.2019.final");
        assert_eq!(dotted.index, 0);
    }

    #[test]
    fn test_segment_name_rejects() {
        assert!(segment("photo.zip_file_").is_none());
        assert!(segment("photo.zip_file_1a").is_none());
        assert!(segment(".zip_file_1").is_none());
        assert!(segment("photo.ZIP_FILE_1").is_none());
        assert!(segment("photo.zip_file_99999999999999999999999").is_none());
    }

    #[test]
    fn test_trailing_text_after_index_is_rejected() {
        assert!(segment("a.zip_file_1.bak").is_none());
        assert!(segment("a.zip_file_1 (copy)").is_none());

        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.zip_file_1.bak"), b"\xFF\xD8\xFFrest").unwrap();
        let scan = scan_segments(
            root.path(),
            &SignatureDetector::default(),
            &AllowedExtensions::default(),
        )
        .unwrap();

        assert_eq!(scan.total, 1);
        assert!(scan.complete.is_empty());
        assert_eq!(scan.skipped, vec![root.path().join("a.zip_file_1.bak")]);
    }

    #[test]
    fn test_group_ordering() {
        let mut group = SegmentGroup::new(PathBuf::from("/q"), "clip".to_string());
        for index in [3, 1, 10, 2] {
            group.push(segment(&format!("/q/clip.zip_file_{index}")).unwrap());
        }

        let order: Vec<u64> = group.ordered().iter().map(|s| s.index).collect();
        assert_eq!(order, vec![1, 2, 3, 10]);
        assert_eq!(group.terminal().unwrap().index, 10);
        let middle: Vec<u64> = group.intermediates().iter().map(|s| s.index).collect();
        assert_eq!(middle, vec![1, 2, 3]);
    }

    #[test]
    fn test_scan_classifies_segments() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        fs::write(root.path().join("pic.zip_file_1"), b"\xFF\xD8\xFFrest").unwrap();
        fs::write(root.path().join("doc.zip_file_1"), b"%PDF-1.4").unwrap();
        fs::write(root.path().join("odd.zip_file_x"), b"whatever").unwrap();
        fs::write(root.path().join("unrelated.txt"), b"ignored").unwrap();
        fs::write(nested.join("video.zip_file_1"), b"PK\x07\x08junk").unwrap();
        fs::write(nested.join("video.zip_file_2"), b"more junk").unwrap();
        fs::write(root.path().join("video.zip_file_1"), b"other junk").unwrap();

        let scan = scan_segments(
            root.path(),
            &SignatureDetector::default(),
            &AllowedExtensions::default(),
        )
        .unwrap();

        assert_eq!(scan.total, 6);
        assert_eq!(scan.complete.len(), 1);
        assert_eq!(scan.complete[0].output_name(), "pic.jpg");
        assert_eq!(scan.skipped.len(), 2);
        assert!(scan.skipped.contains(&root.path().join("doc.zip_file_1")));
        assert!(scan.skipped.contains(&root.path().join("odd.zip_file_x")));

        // Same base in different directories stays apart
        assert_eq!(scan.groups.len(), 2);
        let nested_group = scan
            .groups
            .iter()
            .find(|g| g.directory == nested)
            .unwrap();
        assert_eq!(nested_group.len(), 2);
    }
}
