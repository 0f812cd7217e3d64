/// Multi-part archive reassembly
///
/// A split quarantine archive is a classic multi-part zip whose pieces were
/// renamed to `<base>.zip_file_<N>`. The highest index is the final `.zip`
/// piece, the others are the `.z01`, `.z02`, ... parts. Joining them in order
/// yields a single-file zip that any reader can open.
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::error::Result;
use crate::paths::{long_path, FALLBACK_PATH_LIMIT};
use crate::recovery::segments::SegmentGroup;
use crate::recovery::signatures::{AllowedExtensions, SignatureDetector};

/// Marker the splitting tool writes at the start of the first part
pub const SPLIT_ARCHIVE_MARKER: [u8; 4] = *b"PK\x07\x08";

/// Multi-part zip name for the piece at `position` (1-based) of a split
/// archive, or the final `.zip` name for the terminal piece.
pub fn part_name(base: &str, position: usize, terminal: bool) -> String {
    if terminal {
        format!("{base}.zip")
    } else {
        format!("{base}.z{position:02}")
    }
}

/// Extracted media of one group, alive as long as its scratch area
#[derive(Debug)]
pub struct Reassembly {
    scratch: TempDir,
    /// Extracted files that passed extension repair and filtering
    pub entries: Vec<PathBuf>,
}

impl Reassembly {
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write the group's segments into `out` as one zip byte stream.
///
/// Intermediate parts go first in ascending index order, the terminal
/// segment last. A leading split marker on the first part is dropped.
pub fn concatenate(group: &SegmentGroup, out: &Path) -> io::Result<u64> {
    let mut writer = BufWriter::new(File::create(out)?);
    let mut written = 0u64;

    for (position, part) in group.intermediates().into_iter().enumerate() {
        tracing::debug!(
            "Part {} <- {}",
            part_name(&group.base, position + 1, false),
            part.path.display()
        );
        let mut reader = File::open(long_path(&part.path))?;
        if position == 0 {
            written += copy_without_marker(&mut reader, &mut writer)?;
        } else {
            written += io::copy(&mut reader, &mut writer)?;
        }
    }

    if let Some(terminal) = group.terminal() {
        tracing::debug!(
            "Part {} <- {}",
            part_name(&group.base, 0, true),
            terminal.path.display()
        );
        let mut reader = File::open(long_path(&terminal.path))?;
        written += io::copy(&mut reader, &mut writer)?;
    }

    writer.flush()?;
    Ok(written)
}

fn copy_without_marker<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let mut head = Vec::with_capacity(SPLIT_ARCHIVE_MARKER.len());
    reader
        .by_ref()
        .take(SPLIT_ARCHIVE_MARKER.len() as u64)
        .read_to_end(&mut head)?;

    let mut written = 0u64;
    if head != SPLIT_ARCHIVE_MARKER {
        writer.write_all(&head)?;
        written += head.len() as u64;
    }
    written += io::copy(reader, writer)?;
    Ok(written)
}

/// Extract every entry of the zip at `archive` into `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let count = zip.len();
    zip.extract(dest)?;
    Ok(count)
}

/// Repair and filter every file under `dir`, returning those allowed.
///
/// Renames stay inside the scratch area, so only the fallback limit applies.
/// The destination name is fitted later, when the file is copied out.
pub fn collect_media(
    dir: &Path,
    detector: &SignatureDetector,
    allowed: &AllowedExtensions,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let mut media = Vec::new();
    for file in files {
        let fixed = detector.repair_extension(&file, FALLBACK_PATH_LIMIT)?;
        if allowed.permits(&fixed) {
            media.push(fixed);
        } else {
            tracing::debug!("Discarding extracted {}", fixed.display());
        }
    }
    Ok(media)
}

/// Rebuild, extract and filter one segment group.
///
/// Any error means the group as a whole could not be recovered.
pub fn reassemble_group(
    group: &SegmentGroup,
    detector: &SignatureDetector,
    allowed: &AllowedExtensions,
) -> Result<Reassembly> {
    let scratch = tempfile::Builder::new().prefix("quarantine-").tempdir()?;

    let combined = scratch.path().join(format!("{}_combined.zip", group.base));
    let bytes = concatenate(group, &combined)?;
    tracing::debug!(
        "Combined {} segments of '{}' into {} bytes",
        group.len(),
        group.base,
        bytes
    );

    let extract_dir = scratch.path().join("extract");
    fs::create_dir(&extract_dir)?;
    let count = extract_archive(&combined, &extract_dir)?;
    tracing::debug!("Extracted {} entries from {}", count, combined.display());

    let entries = collect_media(&extract_dir, detector, allowed)?;
    Ok(Reassembly { scratch, entries })
}
