//! Drive data types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// MIME type used whenever the real type cannot be determined
pub const WILDCARD_MIME: &str = "*/*";

/// Default number of entries requested per list call
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Snapshot of one remote file as returned by the store.
///
/// Instances are never updated; a newer list result produces new snapshots.
/// Operations always address files by `id`, so a stale copy held by the shell
/// is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Opaque, server-assigned identifier
    pub id: String,
    /// Display name (not unique)
    pub name: String,
    /// MIME type, absent when the store did not report one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl RemoteFile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type,
        }
    }

    /// MIME type with the wildcard fallback applied
    pub fn effective_mime_type(&self) -> &str {
        self.mime_type
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(WILDCARD_MIME)
    }
}

/// Parameters of a list call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page_size: u32,
    /// Per-file fields requested from the store
    pub fields: Vec<String>,
}

impl ListQuery {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    /// Field selector in the form the Drive API expects:
    /// `nextPageToken,files(id,name,mimeType)`
    pub fn fields_selector(&self) -> String {
        format!("nextPageToken,files({})", self.fields.join(","))
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            fields: vec!["id".into(), "name".into(), "mimeType".into()],
        }
    }
}

/// One page of a list result.
///
/// Only the first page is ever requested; `next_page_token` is surfaced so
/// callers can see that more files exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListPage {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Progress update sent after every copied chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    /// Transfer ID
    pub id: String,
    pub direction: TransferDirection,
    /// Human-readable source -> destination description
    pub label: String,
    pub transferred_bytes: u64,
}

/// Result of a finished download, handed to the notifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedFile {
    pub remote_id: String,
    pub local_path: PathBuf,
    /// Best-effort MIME type of the local file, `*/*` if unknown
    pub mime_type: String,
    pub bytes: u64,
}
