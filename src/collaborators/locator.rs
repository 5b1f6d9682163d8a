//! Content locators
//!
//! A locator is what the file picker (or the external editor) hands back: a
//! reference to local content that can be streamed, typed and named.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::drive::client::{byte_source, ByteSource};
use crate::drive::error::DriveError;
use crate::drive::path_utils::last_path_segment;
use crate::drive::types::WILDCARD_MIME;

/// Local content selected for upload
#[async_trait]
pub trait ContentLocator: Send + Sync {
    /// Path or URI string identifying the content
    fn locator(&self) -> &str;

    /// Open the content for reading
    async fn open(&self) -> Result<ByteSource, DriveError>;

    /// Resolved MIME type, if any
    fn mime_type(&self) -> Option<String>;

    /// Display name from metadata, if the locator has any
    fn display_name(&self) -> Option<String> {
        None
    }
}

/// MIME type to upload with: the resolved type, or `*/*`
pub fn effective_mime_type(locator: &dyn ContentLocator) -> String {
    locator
        .mime_type()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| WILDCARD_MIME.to_string())
}

/// Name to upload under: metadata display name, else the last path segment,
/// else the raw locator
pub fn effective_display_name(locator: &dyn ContentLocator) -> String {
    if let Some(name) = locator.display_name().filter(|n| !n.is_empty()) {
        return name;
    }
    let raw = locator.locator();
    last_path_segment(raw).unwrap_or(raw).to_string()
}

/// Extension-based MIME lookup
pub fn mime_from_path(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first_raw().map(str::to_string)
}

/// A file on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFileLocator {
    path: PathBuf,
    locator: String,
}

impl LocalFileLocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let locator = path.to_string_lossy().to_string();
        Self { path, locator }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ContentLocator for LocalFileLocator {
    fn locator(&self) -> &str {
        &self.locator
    }

    async fn open(&self) -> Result<ByteSource, DriveError> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(byte_source(file))
    }

    fn mime_type(&self) -> Option<String> {
        mime_from_path(&self.path)
    }
}

/// Content already held in memory, with optional resolver metadata
#[derive(Debug, Clone)]
pub struct BytesLocator {
    locator: String,
    content: Bytes,
    display_name: Option<String>,
    mime_type: Option<String>,
}

impl BytesLocator {
    pub fn new(locator: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            locator: locator.into(),
            content: content.into(),
            display_name: None,
            mime_type: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[async_trait]
impl ContentLocator for BytesLocator {
    fn locator(&self) -> &str {
        &self.locator
    }

    async fn open(&self) -> Result<ByteSource, DriveError> {
        Ok(byte_source(std::io::Cursor::new(self.content.clone())))
    }

    fn mime_type(&self) -> Option<String> {
        self.mime_type.clone()
    }

    fn display_name(&self) -> Option<String> {
        self.display_name.clone()
    }
}
