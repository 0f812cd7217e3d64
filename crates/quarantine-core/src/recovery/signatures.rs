/// Leading-byte file type detection and extension repair
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::paths::{safe_rename, unique_destination};

/// Number of leading bytes inspected
pub const HEADER_LEN: usize = 16;

/// One entry of the signature table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaSignature {
    pub magic: &'static [u8],
    pub offset: usize,
    pub extension: &'static str,
}

/// Ordered signature table. The first match wins.
pub const MEDIA_SIGNATURES: &[MediaSignature] = &[
    MediaSignature {
        magic: &[0xFF, 0xD8, 0xFF],
        offset: 0,
        extension: ".jpg",
    },
    MediaSignature {
        magic: &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        offset: 0,
        extension: ".png",
    },
    MediaSignature {
        magic: b"GIF87a",
        offset: 0,
        extension: ".gif",
    },
    MediaSignature {
        magic: b"GIF89a",
        offset: 0,
        extension: ".gif",
    },
    MediaSignature {
        magic: b"BM",
        offset: 0,
        extension: ".bmp",
    },
    MediaSignature {
        magic: b"%PDF",
        offset: 0,
        extension: ".pdf",
    },
    MediaSignature {
        magic: b"RIFF",
        offset: 0,
        extension: ".wav",
    },
    MediaSignature {
        magic: b"ID3",
        offset: 0,
        extension: ".mp3",
    },
    MediaSignature {
        magic: b"ftypqt",
        offset: 4,
        extension: ".mov",
    },
];

const WAVE_FORM: &[u8] = b"WAVE";
const FTYP_BOX: &[u8] = b"ftyp";

/// Signature detector over an immutable table
#[derive(Debug, Clone, Copy)]
pub struct SignatureDetector {
    signatures: &'static [MediaSignature],
}

impl Default for SignatureDetector {
    fn default() -> Self {
        Self::new(MEDIA_SIGNATURES)
    }
}

impl SignatureDetector {
    pub fn new(signatures: &'static [MediaSignature]) -> Self {
        Self { signatures }
    }

    pub fn signatures(&self) -> &'static [MediaSignature] {
        self.signatures
    }

    /// Detect the extension (with leading dot) of a header buffer.
    pub fn detect_bytes(&self, header: &[u8]) -> Option<&'static str> {
        let header = &header[..header.len().min(HEADER_LEN)];

        for signature in self.signatures {
            let end = signature.offset + signature.magic.len();
            if header.get(signature.offset..end) != Some(signature.magic) {
                continue;
            }
            // RIFF is also AVI and WebP; only the WAVE form counts.
            if signature.extension == ".wav" && header.get(8..12) != Some(WAVE_FORM) {
                continue;
            }
            return Some(signature.extension);
        }

        if header.len() >= 12 && &header[4..8] == FTYP_BOX {
            return Some(".mp4");
        }
        None
    }

    /// Detect the extension of the file at `path` from its first bytes.
    pub fn detect_extension(&self, path: &Path) -> io::Result<Option<&'static str>> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        File::open(path)?
            .take(HEADER_LEN as u64)
            .read_to_end(&mut header)?;
        Ok(self.detect_bytes(&header))
    }

    /// Rename `path` so its extension matches the detected type.
    ///
    /// Returns the path unchanged when nothing is detected or the extension
    /// already matches (ignoring case).
    pub fn repair_extension(&self, path: &Path, limit: usize) -> io::Result<PathBuf> {
        let Some(detected) = self.detect_extension(path)? else {
            return Ok(path.to_path_buf());
        };

        let current = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default();
        if current == detected {
            return Ok(path.to_path_buf());
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        let Some(target) = unique_destination(parent, &format!("{stem}{detected}"), limit) else {
            tracing::warn!("No room to rename {} to {}", path.display(), detected);
            return Ok(path.to_path_buf());
        };
        tracing::debug!("Repairing extension {} -> {}", path.display(), target.display());
        safe_rename(path, &target, limit)
    }
}

/// Detect the extension of `path` with the built-in table
pub fn detect_extension(path: &Path) -> io::Result<Option<&'static str>> {
    SignatureDetector::default().detect_extension(path)
}

/// The only extensions a recovered file may carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedExtensions {
    extensions: BTreeSet<String>,
}

impl Default for AllowedExtensions {
    fn default() -> Self {
        Self::new([".jpg", ".png", ".gif", ".bmp", ".mp4", ".mov", ".mp3", ".wav"])
    }
}

impl AllowedExtensions {
    /// Build a set from extensions; a missing leading dot is added.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        Self { extensions }
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.extensions.contains(&normalize_extension(extension))
    }

    /// Check the extension of a file name
    pub fn permits(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| self.contains(&ext.to_string_lossy()))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

fn normalize_extension(ext: &str) -> String {
    let lower = ext.to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::FALLBACK_PATH_LIMIT;
    use tempfile::TempDir;

    fn padded(prefix: &[u8]) -> Vec<u8> {
        let mut data = prefix.to_vec();
        data.resize(HEADER_LEN, 0);
        data
    }

    #[test]
    fn test_known_signatures() {
        let detector = SignatureDetector::default();
        assert_eq!(detector.detect_bytes(&padded(&[0xFF, 0xD8, 0xFF])), Some(".jpg"));
        assert_eq!(
            detector.detect_bytes(&padded(b"\x89PNG\r\n\x1a\n")),
            Some(".png")
        );
        assert_eq!(detector.detect_bytes(&padded(b"GIF87a")), Some(".gif"));
        assert_eq!(detector.detect_bytes(&padded(b"GIF89a")), Some(".gif"));
        assert_eq!(detector.detect_bytes(&padded(b"BM")), Some(".bmp"));
        assert_eq!(detector.detect_bytes(&padded(b"%PDF-1.7")), Some(".pdf"));
        assert_eq!(detector.detect_bytes(&padded(b"ID3")), Some(".mp3"));
    }

    #[test]
    fn test_wav_requires_wave_form() {
        let detector = SignatureDetector::default();
        let wav = padded(b"RIFF\x00\x00\x00\x00WAVE");
        assert_eq!(detector.detect_bytes(&wav), Some(".wav"));

        let avi = padded(b"RIFF\x00\x00\x00\x00AVI ");
        assert_ne!(detector.detect_bytes(&avi), Some(".wav"));
        assert_eq!(detector.detect_bytes(&avi), None);
    }

    #[test]
    fn test_mov_and_mp4() {
        let detector = SignatureDetector::default();
        assert_eq!(
            detector.detect_bytes(&padded(b"\x00\x00\x00\x14ftypqt  ")),
            Some(".mov")
        );
        assert_eq!(
            detector.detect_bytes(&padded(b"\x00\x00\x00\x18ftypisom")),
            Some(".mp4")
        );
        // Too short to be trusted as a generic ftyp container
        assert_eq!(detector.detect_bytes(b"\x00\x00\x00\x18ftyp"), None);
    }

    #[test]
    fn test_unknown_and_empty() {
        let detector = SignatureDetector::default();
        assert_eq!(detector.detect_bytes(b"not a zip"), None);
        assert_eq!(detector.detect_bytes(&[]), None);
        // Zip local header is not media
        assert_eq!(detector.detect_bytes(&padded(b"PK\x03\x04")), None);
    }

    #[test]
    fn test_detect_extension_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audio");
        std::fs::write(&path, padded(b"ID3")).unwrap();
        assert_eq!(detect_extension(&path).unwrap(), Some(".mp3"));
    }

    #[test]
    fn test_repair_extension() {
        let dir = TempDir::new().unwrap();
        let detector = SignatureDetector::default();

        let wrong = dir.path().join("photo.dat");
        std::fs::write(&wrong, padded(&[0xFF, 0xD8, 0xFF])).unwrap();
        let fixed = detector.repair_extension(&wrong, FALLBACK_PATH_LIMIT).unwrap();
        assert_eq!(fixed, dir.path().join("photo.jpg"));
        assert!(fixed.exists());
        assert!(!wrong.exists());

        let upper = dir.path().join("image.PNG");
        std::fs::write(&upper, padded(b"\x89PNG\r\n\x1a\n")).unwrap();
        assert_eq!(
            detector.repair_extension(&upper, FALLBACK_PATH_LIMIT).unwrap(),
            upper
        );

        let unknown = dir.path().join("notes.txt");
        std::fs::write(&unknown, b"plain text").unwrap();
        assert_eq!(
            detector.repair_extension(&unknown, FALLBACK_PATH_LIMIT).unwrap(),
            unknown
        );
    }

    #[test]
    fn test_repair_avoids_collisions() {
        let dir = TempDir::new().unwrap();
        let detector = SignatureDetector::default();
        std::fs::write(dir.path().join("clip.mp3"), b"existing").unwrap();

        let misnamed = dir.path().join("clip");
        std::fs::write(&misnamed, padded(b"ID3")).unwrap();
        let fixed = detector.repair_extension(&misnamed, FALLBACK_PATH_LIMIT).unwrap();
        assert_eq!(fixed, dir.path().join("clip_1.mp3"));
    }

    #[test]
    fn test_allowed_extensions() {
        let allowed = AllowedExtensions::default();
        assert!(allowed.contains(".jpg"));
        assert!(allowed.contains("JPG"));
        assert!(!allowed.contains(".pdf"));
        assert!(allowed.permits(Path::new("a/b/clip.MOV")));
        assert!(!allowed.permits(Path::new("a/b/noext")));
        assert_eq!(allowed.iter().count(), 8);
    }
}
