//! Path safety helpers for file systems with short path limits
//!
//! Destination names are fitted to the path limit once, by
//! [`unique_destination`]. Every copy and rename then goes through
//! [`safe_copy`] or [`safe_rename`], which add long-path addressing and refuse
//! a destination that still does not fit.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Limit used when the platform cannot tell us its own
pub const FALLBACK_PATH_LIMIT: usize = 4096;

/// Classic `MAX_PATH` on Windows
pub const WINDOWS_MAX_PATH: usize = 260;

#[cfg(windows)]
const VERBATIM_PREFIX: &str = r"\\?\";

/// Source of the maximum path length for the target file system
pub trait PathLimit {
    /// Maximum length of a full path string, or `None` if it cannot be determined
    fn max_path_length(&self) -> Option<usize>;

    /// Limit with the fallback applied
    fn effective_limit(&self) -> usize {
        self.max_path_length().unwrap_or(FALLBACK_PATH_LIMIT)
    }
}

/// Fixed limit, for constrained targets and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPathLimit(pub usize);

impl PathLimit for FixedPathLimit {
    fn max_path_length(&self) -> Option<usize> {
        Some(self.0)
    }
}

/// Limit queried from the running platform
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPathLimit;

impl PathLimit for SystemPathLimit {
    #[cfg(windows)]
    fn max_path_length(&self) -> Option<usize> {
        Some(WINDOWS_MAX_PATH)
    }

    #[cfg(unix)]
    fn max_path_length(&self) -> Option<usize> {
        let root = std::ffi::CStr::from_bytes_with_nul(b"/\0").ok()?;
        // SAFETY: `root` is a valid NUL-terminated string for the whole call.
        let value = unsafe { libc::pathconf(root.as_ptr(), libc::_PC_PATH_MAX) };
        usize::try_from(value).ok().filter(|limit| *limit > 0)
    }

    #[cfg(not(any(unix, windows)))]
    fn max_path_length(&self) -> Option<usize> {
        None
    }
}

/// Return `path` in a form the file system addresses without length checks.
///
/// On Windows absolute paths get the verbatim `\\?\` prefix. Elsewhere the
/// path is returned unchanged.
pub fn long_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let text = path.to_string_lossy();
        if path.is_absolute() && !text.starts_with(VERBATIM_PREFIX) {
            return PathBuf::from(format!("{VERBATIM_PREFIX}{text}"));
        }
    }
    path.to_path_buf()
}

fn char_len(path: &Path) -> usize {
    path.to_string_lossy().chars().count()
}

/// Split a file name into `(stem, ".ext")`, the extension being empty when absent
fn split_name(name: &Path) -> (String, String) {
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

/// Build `dir/stem{suffix}{ext}`, cutting the stem until the whole path fits.
/// The suffix and extension are never cut and at least one stem character stays.
fn fit_name(dir: &Path, stem: &str, suffix: &str, ext: &str, limit: usize) -> PathBuf {
    let full = dir.join(format!("{stem}{suffix}{ext}"));
    if char_len(&full) <= limit {
        return full;
    }

    let reserved = char_len(dir) + 1 + suffix.chars().count() + ext.chars().count();
    let available = limit.saturating_sub(reserved).max(1);
    let truncated: String = stem.chars().take(available).collect();
    dir.join(format!("{truncated}{suffix}{ext}"))
}

/// Shorten the final component of `path` so the full string fits in `limit`.
pub fn shorten_destination(path: &Path, limit: usize) -> PathBuf {
    if char_len(path) <= limit {
        return path.to_path_buf();
    }
    let Some(name) = path.file_name() else {
        return path.to_path_buf();
    };
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let (stem, ext) = split_name(Path::new(name));
    fit_name(parent, &stem, "", &ext, limit)
}

/// Pick a name inside `dir` that does not exist yet.
///
/// Tries `file_name`, then `stem_1.ext`, `stem_2.ext`, ... Candidates are
/// shortened before the existence check so the returned path already fits.
/// Returns `None` once a candidate cannot be made to fit `limit`.
pub fn unique_destination(dir: &Path, file_name: &str, limit: usize) -> Option<PathBuf> {
    let dir = long_path(dir);
    let (stem, ext) = split_name(Path::new(file_name));

    let mut counter = 0u32;
    loop {
        let suffix = if counter == 0 {
            String::new()
        } else {
            format!("_{counter}")
        };
        let candidate = fit_name(&dir, &stem, &suffix, &ext, limit);
        if char_len(&candidate) > limit {
            return None;
        }
        if !candidate.exists() {
            return Some(candidate);
        }
        counter += 1;
    }
}

fn check_fits(dest: &Path, limit: usize) -> io::Result<()> {
    if char_len(dest) > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} exceeds the {limit} character path limit", dest.display()),
        ));
    }
    Ok(())
}

/// Copy `src` to a destination picked by [`unique_destination`].
///
/// The name is used as given; a destination longer than `limit` is an error.
pub fn safe_copy(src: &Path, dest: &Path, limit: usize) -> io::Result<PathBuf> {
    let dest = long_path(dest);
    check_fits(&dest, limit)?;
    fs::copy(long_path(src), &dest)?;
    Ok(dest)
}

/// Rename `src` to a destination picked by [`unique_destination`].
pub fn safe_rename(src: &Path, dest: &Path, limit: usize) -> io::Result<PathBuf> {
    let dest = long_path(dest);
    check_fits(&dest, limit)?;
    fs::rename(long_path(src), &dest)?;
    Ok(dest)
}
