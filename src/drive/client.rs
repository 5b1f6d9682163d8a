//! Remote store contract
//!
//! Every component talks to the cloud through [`RemoteStore`]. Calls are
//! single-shot: a failure surfaces immediately and nothing is retried.

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::DriveError;
use super::types::{FileListPage, ListQuery, RemoteFile};

/// Owned byte stream moving to or from the remote store
pub type ByteSource = Pin<Box<dyn AsyncRead + Send>>;

/// Authenticated handle to the remote storage API
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the first page of files. The page token is never followed.
    async fn list(&self, query: &ListQuery) -> Result<FileListPage, DriveError>;

    /// Open the content of `id` as a stream.
    async fn get(&self, id: &str) -> Result<ByteSource, DriveError>;

    /// Create a new object. The store assigns the id; uploading the same
    /// name twice creates two objects.
    async fn create(
        &self,
        name: &str,
        mime_type: &str,
        content: ByteSource,
    ) -> Result<RemoteFile, DriveError>;

    /// Delete `id`. An id that no longer exists yields `NotFound`.
    async fn delete(&self, id: &str) -> Result<(), DriveError>;
}

/// Wrap any reader as a [`ByteSource`]
pub fn byte_source<R>(reader: R) -> ByteSource
where
    R: AsyncRead + Send + 'static,
{
    Box::pin(reader)
}
