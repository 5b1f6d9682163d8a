//! In-memory remote store
//!
//! Keeps objects in insertion order, the way the Drive API returns them for a
//! fresh account. Besides serving as the offline backend of the CLI it can
//! inject failures and hold list calls open, which makes the documented
//! failure windows (edit data loss, stale refresh) reproducible.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tracing::debug;

use super::client::{byte_source, ByteSource, RemoteStore};
use super::error::DriveError;
use super::types::{FileListPage, ListQuery, RemoteFile};

/// Store operation, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Get,
    Create,
    Delete,
}

struct StoredObject {
    file: RemoteFile,
    content: Vec<u8>,
}

struct PendingGate {
    entered_tx: oneshot::Sender<()>,
    release_rx: oneshot::Receiver<()>,
}

#[derive(Default)]
struct MemoryState {
    objects: Vec<StoredObject>,
    next_id: u64,
    faults: HashMap<StoreOp, VecDeque<DriveError>>,
    list_gates: VecDeque<PendingGate>,
    calls: HashMap<StoreOp, usize>,
}

impl MemoryState {
    /// Count the call and pop the next injected failure for `op`, if any
    fn begin(&mut self, op: StoreOp) -> Result<(), DriveError> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.faults.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(err) => {
                debug!("Injected {:?} failure: {}", op, err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn insert(&mut self, name: &str, mime_type: &str, content: Vec<u8>) -> RemoteFile {
        self.next_id += 1;
        let file = RemoteFile::new(
            format!("mem-{:06}", self.next_id),
            name,
            Some(mime_type.to_string()),
        );
        self.objects.push(StoredObject {
            file: file.clone(),
            content,
        });
        file
    }
}

/// Handle returned by [`MemoryRemoteStore::pause_next_list`].
///
/// The paused list call captures its snapshot first, signals `entered`, then
/// waits for `release` before returning.
pub struct ListGate {
    entered_rx: oneshot::Receiver<()>,
    release_tx: oneshot::Sender<()>,
}

impl ListGate {
    /// Wait until the gated list call has captured its snapshot
    pub async fn entered(&mut self) {
        let _ = (&mut self.entered_rx).await;
    }

    /// Let the gated list call return
    pub fn release(self) {
        let _ = self.release_tx.send(());
    }
}

/// Remote store that lives entirely in memory
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without going through `create`
    pub fn insert(&self, name: &str, mime_type: &str, content: impl Into<Vec<u8>>) -> RemoteFile {
        self.state.lock().insert(name, mime_type, content.into())
    }

    /// Fail the next call of `op` with `err`. Multiple failures queue up.
    pub fn inject_failure(&self, op: StoreOp, err: DriveError) {
        self.state
            .lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Hold the next list call open until the returned gate is released
    pub fn pause_next_list(&self) -> ListGate {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.state.lock().list_gates.push_back(PendingGate {
            entered_tx,
            release_rx,
        });
        ListGate {
            entered_rx,
            release_tx,
        }
    }

    /// Current objects in store order
    pub fn files(&self) -> Vec<RemoteFile> {
        self.state
            .lock()
            .objects
            .iter()
            .map(|o| o.file.clone())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().objects.iter().any(|o| o.file.id == id)
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .objects
            .iter()
            .find(|o| o.file.id == id)
            .map(|o| o.content.clone())
    }

    /// Number of calls made for `op`, failed ones included
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list(&self, query: &ListQuery) -> Result<FileListPage, DriveError> {
        let (page, gate) = {
            let mut state = self.state.lock();
            state.begin(StoreOp::List)?;
            let limit = query.page_size as usize;
            let files: Vec<RemoteFile> = state
                .objects
                .iter()
                .take(limit)
                .map(|o| o.file.clone())
                .collect();
            let next_page_token = (state.objects.len() > limit).then(|| format!("offset-{}", limit));
            (
                FileListPage {
                    files,
                    next_page_token,
                },
                state.list_gates.pop_front(),
            )
        };

        if let Some(gate) = gate {
            let _ = gate.entered_tx.send(());
            let _ = gate.release_rx.await;
        }

        Ok(page)
    }

    async fn get(&self, id: &str) -> Result<ByteSource, DriveError> {
        let mut state = self.state.lock();
        state.begin(StoreOp::Get)?;
        let content = state
            .objects
            .iter()
            .find(|o| o.file.id == id)
            .map(|o| o.content.clone())
            .ok_or_else(|| DriveError::NotFound(id.to_string()))?;
        Ok(byte_source(std::io::Cursor::new(content)))
    }

    async fn create(
        &self,
        name: &str,
        mime_type: &str,
        mut content: ByteSource,
    ) -> Result<RemoteFile, DriveError> {
        self.state.lock().begin(StoreOp::Create)?;

        let mut data = Vec::new();
        content
            .read_to_end(&mut data)
            .await
            .map_err(|e| DriveError::Transport(format!("Upload body failed: {}", e)))?;

        let file = self.state.lock().insert(name, mime_type, data);
        debug!("Created {} ({})", file.name, file.id);
        Ok(file)
    }

    async fn delete(&self, id: &str) -> Result<(), DriveError> {
        let mut state = self.state.lock();
        state.begin(StoreOp::Delete)?;
        let before = state.objects.len();
        state.objects.retain(|o| o.file.id != id);
        if state.objects.len() == before {
            return Err(DriveError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
