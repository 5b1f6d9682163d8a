//! Path helpers for downloads and picked files
//!
//! Remote display names are free-form text, so they are flattened into a single
//! path component before being joined under the download directory.

use std::path::{Path, PathBuf};

/// Replacement for names that cannot be used as a file name
const FALLBACK_FILE_NAME: &str = "download";

/// Turn a remote display name into a single safe path component.
///
/// Separators become `_`; empty names and `.`/`..` fall back to a fixed name.
/// The mapping is deterministic, so two files with the same display name map
/// to the same local path.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();

    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Local path for a download of `display_name`.
///
/// No collision handling: downloading two files with the same name writes
/// the same path.
pub fn local_download_path(download_dir: &Path, display_name: &str) -> PathBuf {
    download_dir.join(sanitize_file_name(display_name))
}

/// Last segment after the final `/` of a locator path or URI.
///
/// Returns the whole input when it has no `/`, and `None` when the input ends
/// with `/` (no segment to use).
pub fn last_path_segment(locator: &str) -> Option<&str> {
    let segment = match locator.rfind('/') {
        Some(idx) => &locator[idx + 1..],
        None => locator,
    };
    (!segment.is_empty()).then_some(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_file_name(".."), "download");
        assert_eq!(sanitize_file_name("   "), "download");
    }

    #[test]
    fn test_local_download_path_is_deterministic() {
        let dir = Path::new("/data/files");
        let first = local_download_path(dir, "notes.txt");
        let second = local_download_path(dir, "notes.txt");
        assert_eq!(first, second);
        assert_eq!(first, PathBuf::from("/data/files/notes.txt"));
    }

    #[test]
    fn test_download_path_stays_inside_dir() {
        let dir = Path::new("/data/files");
        let path = local_download_path(dir, "../../etc/passwd");
        assert_eq!(path.parent(), Some(dir));
    }

    #[test]
    fn test_last_path_segment() {
        assert_eq!(last_path_segment("/storage/emulated/0/doc.txt"), Some("doc.txt"));
        assert_eq!(last_path_segment("content://media/external/42"), Some("42"));
        assert_eq!(last_path_segment("plain.txt"), Some("plain.txt"));
        assert_eq!(last_path_segment("/dir/"), None);
    }
}
