//! Transfer engine
//!
//! Moves bytes between local streams and the remote store with a fixed-size
//! buffered copy. There is no resume: a failed transfer starts over from byte 0.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::client::{byte_source, ByteSource, RemoteStore};
use super::error::DriveError;
use super::path_utils::local_download_path;
use super::types::{DownloadedFile, RemoteFile, TransferDirection, TransferProgress, WILDCARD_MIME};
use crate::collaborators::locator::{
    effective_display_name, effective_mime_type, mime_from_path, ContentLocator,
};

/// Copy buffer size. Tunable, not part of any protocol.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// State of one upload or download, alive only for the copy loop
#[derive(Debug)]
pub struct TransferSession {
    pub id: String,
    pub direction: TransferDirection,
    /// `source -> destination`, for logs and progress
    pub label: String,
    pub transferred: u64,
}

impl TransferSession {
    pub fn new(direction: TransferDirection, label: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction,
            label,
            transferred: 0,
        }
    }

    fn progress(&self) -> TransferProgress {
        TransferProgress {
            id: self.id.clone(),
            direction: self.direction,
            label: self.label.clone(),
            transferred_bytes: self.transferred,
        }
    }
}

/// Reader wrapper counting the bytes pulled through it
struct CountingReader {
    inner: ByteSource,
    counter: Arc<AtomicU64>,
}

impl AsyncRead for CountingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let result = self.inner.as_mut().poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let read = (buf.filled().len() - before) as u64;
            self.counter.fetch_add(read, Ordering::Relaxed);
        }
        result
    }
}

/// Streams file content to and from a [`RemoteStore`]
#[derive(Debug, Clone)]
pub struct TransferEngine {
    chunk_size: usize,
    download_dir: PathBuf,
    progress_tx: Option<mpsc::Sender<TransferProgress>>,
}

impl TransferEngine {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            download_dir: download_dir.into(),
            progress_tx: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Report per-chunk progress on `tx`. A closed receiver is ignored.
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Copy `source` into `sink` until EOF and flush the sink.
    ///
    /// Returns the number of bytes copied. A read or write failure aborts the
    /// copy; whatever was already written stays in the sink.
    pub async fn copy<R, W>(&self, source: &mut R, sink: &mut W) -> Result<u64, DriveError>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut session = TransferSession::new(TransferDirection::Download, "stream".into());
        self.copy_session(&mut session, source, sink).await
    }

    async fn copy_session<R, W>(
        &self,
        session: &mut TransferSession,
        source: &mut R,
        sink: &mut W,
    ) -> Result<u64, DriveError>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let bytes_read = source.read(&mut buffer).await.map_err(|e| {
                warn!(
                    "Transfer {} read failed at {} bytes: {}",
                    session.id, session.transferred, e
                );
                DriveError::Io(e)
            })?;

            if bytes_read == 0 {
                break; // EOF
            }

            sink.write_all(&buffer[..bytes_read]).await.map_err(|e| {
                warn!(
                    "Transfer {} write failed at {} bytes: {}",
                    session.id, session.transferred, e
                );
                DriveError::Io(e)
            })?;

            session.transferred += bytes_read as u64;

            if let Some(ref tx) = self.progress_tx {
                let _ = tx.send(session.progress()).await;
            }
        }

        sink.flush().await?;
        Ok(session.transferred)
    }

    /// Download `file` into the download directory.
    ///
    /// The local path comes from the display name alone, so an earlier
    /// download of a same-named file is overwritten. A failed copy leaves the
    /// partial file behind.
    pub async fn download(
        &self,
        store: &dyn RemoteStore,
        file: &RemoteFile,
    ) -> Result<DownloadedFile, DriveError> {
        let local_path = local_download_path(&self.download_dir, &file.name);
        let mut session = TransferSession::new(
            TransferDirection::Download,
            format!("{} -> {}", file.id, local_path.display()),
        );
        info!("Starting download {}: {}", session.id, session.label);

        let mut source = store.get(&file.id).await?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let mut local_file = tokio::fs::File::create(&local_path).await?;

        let bytes = self
            .copy_session(&mut session, &mut source, &mut local_file)
            .await?;

        let mime_type = mime_from_path(&local_path).unwrap_or_else(|| WILDCARD_MIME.to_string());
        info!(
            "Download complete: {} ({} bytes, {})",
            local_path.display(),
            bytes,
            mime_type
        );

        Ok(DownloadedFile {
            remote_id: file.id.clone(),
            local_path,
            mime_type,
            bytes,
        })
    }

    /// Upload the content behind `locator` as a new remote object, named and
    /// typed from the locator.
    pub async fn upload(
        &self,
        store: &dyn RemoteStore,
        locator: &dyn ContentLocator,
    ) -> Result<RemoteFile, DriveError> {
        let name = effective_display_name(locator);
        let mime_type = effective_mime_type(locator);
        self.upload_as(store, locator, &name, &mime_type).await
    }

    /// Upload the content behind `locator` under an explicit name and type
    pub async fn upload_as(
        &self,
        store: &dyn RemoteStore,
        locator: &dyn ContentLocator,
        name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, DriveError> {
        let session = TransferSession::new(
            TransferDirection::Upload,
            format!("{} -> {}", locator.locator(), name),
        );
        info!("Starting upload {}: {} ({})", session.id, session.label, mime_type);

        let counter = Arc::new(AtomicU64::new(0));
        let source = byte_source(CountingReader {
            inner: locator.open().await?,
            counter: counter.clone(),
        });

        let created = store.create(name, mime_type, source).await?;
        let sent = counter.load(Ordering::Relaxed);

        if let Some(ref tx) = self.progress_tx {
            let mut done = session;
            done.transferred = sent;
            let _ = tx.send(done.progress()).await;
        }

        debug!("Upload sent {} bytes", sent);
        info!("Upload complete: {} -> {}", created.name, created.id);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::locator::BytesLocator;
    use crate::drive::memory::{MemoryRemoteStore, StoreOp};
    use tempfile::tempdir;

    /// Reader that yields some bytes, then fails
    struct FailingReader {
        remaining: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.remaining == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                )));
            }
            let n = self.remaining.min(buf.remaining()).min(100);
            buf.put_slice(&vec![7u8; n]);
            self.remaining -= n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_copy_counts_bytes_across_chunks() {
        let engine = TransferEngine::new("/unused");
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut source = &data[..];
        let mut sink = Vec::new();

        let copied = engine.copy(&mut source, &mut sink).await.unwrap();
        assert_eq!(copied, 5000);
        assert_eq!(sink, data);
    }

    #[tokio::test]
    async fn test_copy_reports_progress_per_chunk() {
        let (tx, mut rx) = mpsc::channel(16);
        let engine = TransferEngine::new("/unused").with_chunk_size(4).with_progress(tx);
        let mut source = &b"0123456789"[..];
        let mut sink = Vec::new();

        engine.copy(&mut source, &mut sink).await.unwrap();
        drop(engine);

        let mut updates = Vec::new();
        while let Some(p) = rx.recv().await {
            updates.push(p.transferred_bytes);
        }
        assert_eq!(updates, vec![4, 8, 10]);
    }

    #[tokio::test]
    async fn test_copy_failure_mid_stream_is_io_error() {
        let engine = TransferEngine::new("/unused");
        let mut source = FailingReader { remaining: 300 };
        let mut sink = Vec::new();

        let err = engine.copy(&mut source, &mut sink).await.unwrap_err();
        assert_eq!(err.kind(), "io");
        // Bytes copied before the failure are kept
        assert_eq!(sink.len(), 300);
    }

    #[tokio::test]
    async fn test_download_overwrites_same_name() {
        let temp = tempdir().unwrap();
        let store = MemoryRemoteStore::new();
        let first = store.insert("report.txt", "text/plain", b"first version".to_vec());
        let second = store.insert("report.txt", "text/plain", b"second".to_vec());
        let engine = TransferEngine::new(temp.path());

        let a = engine.download(&store, &first).await.unwrap();
        let b = engine.download(&store, &second).await.unwrap();

        assert_eq!(a.local_path, b.local_path);
        assert_eq!(std::fs::read(&b.local_path).unwrap(), b"second");
        assert_eq!(b.mime_type, "text/plain");
        assert_eq!(b.bytes, 6);
    }

    #[tokio::test]
    async fn test_download_unknown_extension_is_wildcard() {
        let temp = tempdir().unwrap();
        let store = MemoryRemoteStore::new();
        let file = store.insert("blob", "application/octet-stream", b"\x00\x01".to_vec());
        let engine = TransferEngine::new(temp.path());

        let downloaded = engine.download(&store, &file).await.unwrap();
        assert_eq!(downloaded.mime_type, "*/*");
    }

    #[tokio::test]
    async fn test_download_missing_file_creates_nothing() {
        let temp = tempdir().unwrap();
        let store = MemoryRemoteStore::new();
        let ghost = RemoteFile::new("gone", "ghost.txt", None);
        let engine = TransferEngine::new(temp.path());

        let err = engine.download(&store, &ghost).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!temp.path().join("ghost.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_uses_locator_name_and_type() {
        let store = MemoryRemoteStore::new();
        let engine = TransferEngine::new("/unused");
        let locator = BytesLocator::new("content://picker/9", &b"payload"[..])
            .with_display_name("doc.txt")
            .with_mime_type("text/plain");

        let created = engine.upload(&store, &locator).await.unwrap();
        assert_eq!(created.name, "doc.txt");
        assert_eq!(created.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(store.content(&created.id).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_upload_failure_creates_nothing() {
        let store = MemoryRemoteStore::new();
        store.inject_failure(StoreOp::Create, DriveError::Transport("503".into()));
        let engine = TransferEngine::new("/unused");
        let locator = BytesLocator::new("mem", &b"x"[..]);

        let err = engine.upload(&store, &locator).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert!(store.files().is_empty());
    }
}
