//! Drive controller
//!
//! A single task owns the [`FileCatalog`] and the [`EditReconciler`]. Callers
//! talk to it through a cloneable [`ControllerHandle`] which sends commands
//! over an mpsc channel and waits on a oneshot reply.
//!
//! # Architecture
//!
//! ```text
//! ControllerHandle ──cmd──▶ ┌────────────────┐ ──spawn──▶ worker task
//!                           │  control loop  │              (list/get/
//!        reply ◀─────────── │ catalog, edit  │ ◀──result──  create/delete)
//!                           └────────────────┘
//! ```
//!
//! The loop never awaits remote or disk I/O. Every operation runs on its own
//! task and reports back exactly once. State only changes inside the loop,
//! so no locks guard the catalog or the pending edit.
//!
//! List results are applied in the order they complete. When two refreshes
//! overlap, the one that finishes last wins even if it was issued first.

pub mod edit;
pub mod events;
pub mod spawner;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::catalog::FileCatalog;
use crate::collaborators::auth::Authenticator;
use crate::collaborators::editor::{CommandEditorLauncher, EditorLauncher};
use crate::collaborators::locator::ContentLocator;
use crate::collaborators::notifier::{DownloadNotice, Notifier, TracingNotifier};
use crate::drive::client::RemoteStore;
use crate::drive::error::DriveError;
use crate::drive::transfer::TransferEngine;
use crate::drive::types::{DownloadedFile, FileListPage, ListQuery, RemoteFile};

use edit::{EditCompletion, EditOutcome, EditPhase, EditReconciler, EditSession, EditorSignal};
use events::{ControllerEvent, EventEmitter};
use spawner::{TaskSpawner, TokioSpawner};

pub use edit::EditError;

/// Pending commands before senders start waiting
const COMMAND_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, DriveError>>;

/// Commands sent to the control loop
enum ControllerCommand {
    /// List the first page and replace the catalog
    Refresh {
        reply: Option<Reply<Vec<RemoteFile>>>,
    },
    Upload {
        locator: Box<dyn ContentLocator>,
        reply: Reply<RemoteFile>,
    },
    Download {
        file: RemoteFile,
        reply: Reply<DownloadedFile>,
    },
    Delete {
        id: String,
        reply: Reply<()>,
    },
    /// Replies once the edit is reconciled or cancelled
    Edit {
        file: RemoteFile,
        reply: Reply<EditOutcome>,
    },
    Catalog {
        reply: Reply<Vec<RemoteFile>>,
    },
    EditPhase {
        reply: Reply<EditPhase>,
    },
    Shutdown,
}

/// Single-shot results reported by worker tasks and the editor
enum WorkerMessage {
    Listed {
        result: Result<FileListPage, DriveError>,
        reply: Option<Reply<Vec<RemoteFile>>>,
    },
    Uploaded {
        result: Result<RemoteFile, DriveError>,
        reply: Reply<RemoteFile>,
    },
    Downloaded {
        result: Result<DownloadedFile, DriveError>,
        reply: Reply<DownloadedFile>,
    },
    Deleted {
        id: String,
        result: Result<(), DriveError>,
        reply: Reply<()>,
    },
    EditDownloaded {
        edit_id: String,
        file: RemoteFile,
        result: Result<DownloadedFile, DriveError>,
    },
    EditorFinished {
        edit_id: String,
        signal: EditorSignal,
    },
    EditReconciled {
        edit_id: String,
        /// The original is gone, whatever happened to the upload
        old_deleted: bool,
        result: Result<RemoteFile, DriveError>,
    },
}

/// The requester of the outstanding edit, waiting for its outcome
struct PendingEdit {
    edit_id: String,
    file_id: String,
    reply: Reply<EditOutcome>,
}

/// Builds and starts the controller task
pub struct ControllerBuilder {
    store: Arc<dyn RemoteStore>,
    authenticator: Arc<dyn Authenticator>,
    engine: TransferEngine,
    notifier: Arc<dyn Notifier>,
    editor: Option<Arc<dyn EditorLauncher>>,
    spawner: Arc<dyn TaskSpawner>,
    list_query: ListQuery,
    events: EventEmitter,
}

impl ControllerBuilder {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        authenticator: Arc<dyn Authenticator>,
        engine: TransferEngine,
    ) -> Self {
        Self {
            store,
            authenticator,
            engine,
            notifier: Arc::new(TracingNotifier),
            editor: None,
            spawner: Arc::new(TokioSpawner),
            list_query: ListQuery::default(),
            events: EventEmitter::new(),
        }
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Defaults to [`CommandEditorLauncher::from_env`]
    pub fn editor(mut self, editor: Arc<dyn EditorLauncher>) -> Self {
        self.editor = Some(editor);
        self
    }

    pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn list_query(mut self, query: ListQuery) -> Self {
        self.list_query = query;
        self
    }

    pub fn events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Start the control loop.
    ///
    /// Fails with [`DriveError::Auth`] when no credential is available. The
    /// catalog starts empty; call [`ControllerHandle::refresh`] to fill it.
    pub fn spawn(self) -> Result<ControllerHandle, DriveError> {
        if self.authenticator.current_credential().is_none() {
            return Err(DriveError::Auth("No credential available".into()));
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();

        let editor = self
            .editor
            .unwrap_or_else(|| {
                Arc::new(CommandEditorLauncher::from_env().with_spawner(self.spawner.clone()))
            });

        let controller = Controller {
            store: self.store,
            engine: Arc::new(self.engine),
            notifier: self.notifier,
            editor,
            spawner: self.spawner.clone(),
            list_query: self.list_query,
            events: self.events.clone(),
            catalog: FileCatalog::new(),
            reconciler: EditReconciler::new(),
            pending_edit: None,
            worker_tx,
        };

        self.spawner
            .spawn("controller", Box::pin(controller.run(cmd_rx, worker_rx)));

        info!("Drive controller started");
        Ok(ControllerHandle {
            cmd_tx,
            events: self.events,
        })
    }
}

/// State owned by the control loop
struct Controller {
    store: Arc<dyn RemoteStore>,
    engine: Arc<TransferEngine>,
    notifier: Arc<dyn Notifier>,
    editor: Arc<dyn EditorLauncher>,
    spawner: Arc<dyn TaskSpawner>,
    list_query: ListQuery,
    events: EventEmitter,
    catalog: FileCatalog,
    reconciler: EditReconciler,
    pending_edit: Option<PendingEdit>,
    worker_tx: mpsc::UnboundedSender<WorkerMessage>,
}

/// Rejection for an edit that found the reconciler busy: names the file
/// whose edit is outstanding, like a rejected edit request does
fn edit_conflict(reconciler: &EditReconciler, requested_id: &str) -> DriveError {
    let busy_id = reconciler
        .pending()
        .map(|ctx| ctx.file.id.clone())
        .unwrap_or_else(|| requested_id.to_string());
    DriveError::EditInProgress(busy_id)
}

fn send_reply<T>(reply: Reply<T>, result: Result<T, DriveError>) {
    // The requester may have given up; the work is done either way
    let _ = reply.send(result);
}

impl Controller {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ControllerCommand>,
        mut worker_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(ControllerCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(msg) = worker_rx.recv() => self.handle_worker(msg),
            }
        }

        if let Some(pending) = self.pending_edit.take() {
            debug!("Dropping pending edit {} on shutdown", pending.edit_id);
        }
        info!("Drive controller stopped");
    }

    fn handle_command(&mut self, cmd: ControllerCommand) {
        match cmd {
            ControllerCommand::Refresh { reply } => self.start_refresh(reply),
            ControllerCommand::Upload { locator, reply } => self.start_upload(locator, reply),
            ControllerCommand::Download { file, reply } => self.start_download(file, reply),
            ControllerCommand::Delete { id, reply } => self.start_delete(id, reply),
            ControllerCommand::Edit { file, reply } => self.start_edit(file, reply),
            ControllerCommand::Catalog { reply } => send_reply(reply, Ok(self.catalog.current())),
            ControllerCommand::EditPhase { reply } => {
                send_reply(reply, Ok(self.reconciler.phase()))
            }
            ControllerCommand::Shutdown => {}
        }
    }

    fn handle_worker(&mut self, msg: WorkerMessage) {
        match msg {
            WorkerMessage::Listed { result, reply } => self.apply_list(result, reply),
            WorkerMessage::Uploaded { result, reply } => self.upload_done(result, reply),
            WorkerMessage::Downloaded { result, reply } => self.download_done(result, reply),
            WorkerMessage::Deleted { id, result, reply } => self.delete_done(id, result, reply),
            WorkerMessage::EditDownloaded {
                edit_id,
                file,
                result,
            } => self.edit_downloaded(edit_id, file, result),
            WorkerMessage::EditorFinished { edit_id, signal } => {
                self.editor_finished(edit_id, signal)
            }
            WorkerMessage::EditReconciled {
                edit_id,
                old_deleted,
                result,
            } => self.edit_reconciled(edit_id, old_deleted, result),
        }
    }

    fn spawn_worker<F>(&self, name: &'static str, work: F)
    where
        F: std::future::Future<Output = WorkerMessage> + Send + 'static,
    {
        let tx = self.worker_tx.clone();
        self.spawner.spawn(
            name,
            Box::pin(async move {
                if tx.send(work.await).is_err() {
                    debug!("Controller gone, dropping {} result", name);
                }
            }),
        );
    }

    // ── refresh ─────────────────────────────────────────────────────────

    fn start_refresh(&self, reply: Option<Reply<Vec<RemoteFile>>>) {
        let store = self.store.clone();
        let query = self.list_query.clone();
        self.spawn_worker("refresh", async move {
            let result = store.list(&query).await;
            WorkerMessage::Listed { result, reply }
        });
    }

    fn apply_list(
        &mut self,
        result: Result<FileListPage, DriveError>,
        reply: Option<Reply<Vec<RemoteFile>>>,
    ) {
        match result {
            Ok(page) => {
                let has_more = page.next_page_token.is_some();
                if let Some(token) = &page.next_page_token {
                    debug!("More files available (next page {}), not fetched", token);
                }
                self.catalog.replace(page.files);
                self.events.emit(ControllerEvent::CatalogRefreshed {
                    count: self.catalog.len(),
                    has_more,
                });
                if let Some(reply) = reply {
                    send_reply(reply, Ok(self.catalog.current()));
                }
            }
            Err(e) => {
                self.events.emit_failure("refresh", &e);
                if let Some(reply) = reply {
                    send_reply(reply, Err(e));
                }
            }
        }
    }

    // ── upload / download / delete ──────────────────────────────────────

    fn start_upload(&self, locator: Box<dyn ContentLocator>, reply: Reply<RemoteFile>) {
        let store = self.store.clone();
        let engine = self.engine.clone();
        self.spawn_worker("upload", async move {
            let result = engine.upload(&*store, &*locator).await;
            WorkerMessage::Uploaded { result, reply }
        });
    }

    fn upload_done(&mut self, result: Result<RemoteFile, DriveError>, reply: Reply<RemoteFile>) {
        match result {
            Ok(file) => {
                self.start_refresh(None);
                self.events
                    .emit(ControllerEvent::FileUploaded { file: file.clone() });
                send_reply(reply, Ok(file));
            }
            Err(e) => {
                self.events.emit_failure("upload", &e);
                send_reply(reply, Err(e));
            }
        }
    }

    fn start_download(&self, file: RemoteFile, reply: Reply<DownloadedFile>) {
        let store = self.store.clone();
        let engine = self.engine.clone();
        self.spawn_worker("download", async move {
            let result = engine.download(&*store, &file).await;
            WorkerMessage::Downloaded { result, reply }
        });
    }

    fn download_done(
        &mut self,
        result: Result<DownloadedFile, DriveError>,
        reply: Reply<DownloadedFile>,
    ) {
        match result {
            Ok(downloaded) => {
                self.notifier.notify(DownloadNotice::for_download(&downloaded));
                self.events.emit(ControllerEvent::DownloadCompleted {
                    file_id: downloaded.remote_id.clone(),
                    local_path: downloaded.local_path.to_string_lossy().to_string(),
                    mime_type: downloaded.mime_type.clone(),
                });
                send_reply(reply, Ok(downloaded));
            }
            Err(e) => {
                self.events.emit_failure("download", &e);
                send_reply(reply, Err(e));
            }
        }
    }

    fn start_delete(&self, id: String, reply: Reply<()>) {
        let store = self.store.clone();
        self.spawn_worker("delete", async move {
            let result = store.delete(&id).await;
            WorkerMessage::Deleted { id, result, reply }
        });
    }

    fn delete_done(&mut self, id: String, result: Result<(), DriveError>, reply: Reply<()>) {
        match result {
            Ok(()) => {
                self.start_refresh(None);
                self.events.emit(ControllerEvent::FileDeleted { file_id: id });
                send_reply(reply, Ok(()));
            }
            Err(e) => {
                self.events.emit_failure("delete", &e);
                send_reply(reply, Err(e));
            }
        }
    }

    // ── edit-replace ────────────────────────────────────────────────────

    fn start_edit(&mut self, file: RemoteFile, reply: Reply<EditOutcome>) {
        if let Some(pending) = &self.pending_edit {
            let err = DriveError::EditInProgress(pending.file_id.clone());
            self.events.emit_failure("edit", &err);
            send_reply(reply, Err(err));
            return;
        }

        let edit_id = uuid::Uuid::new_v4().to_string();
        info!("Edit {}: starting for {} ({})", edit_id, file.name, file.id);
        self.pending_edit = Some(PendingEdit {
            edit_id: edit_id.clone(),
            file_id: file.id.clone(),
            reply,
        });
        self.events.emit(ControllerEvent::EditStarted {
            edit_id: edit_id.clone(),
            file_id: file.id.clone(),
        });

        let store = self.store.clone();
        let engine = self.engine.clone();
        self.spawn_worker("edit-download", async move {
            let result = engine.download(&*store, &file).await;
            WorkerMessage::EditDownloaded {
                edit_id,
                file,
                result,
            }
        });
    }

    /// Reply to the edit requester if `edit_id` is still the pending edit
    fn resolve_edit(&mut self, edit_id: &str, result: Result<EditOutcome, DriveError>) {
        match self.pending_edit.take() {
            Some(pending) if pending.edit_id == edit_id => send_reply(pending.reply, result),
            other => {
                warn!("No requester waiting for edit {}", edit_id);
                self.pending_edit = other;
            }
        }
    }

    fn edit_downloaded(
        &mut self,
        edit_id: String,
        file: RemoteFile,
        result: Result<DownloadedFile, DriveError>,
    ) {
        let downloaded = match result {
            Ok(downloaded) => downloaded,
            Err(e) => {
                self.events.emit_failure("edit", &e);
                self.resolve_edit(&edit_id, Err(e));
                return;
            }
        };

        // The editor gets the remote type, not a guess from the working copy
        let mime_type = file.effective_mime_type().to_string();
        let file_id = file.id.clone();
        let transition = self
            .reconciler
            .downloaded(edit_id.clone(), file, downloaded.local_path.clone())
            .and_then(|()| self.reconciler.hand_off(&edit_id));
        if let Err(e) = transition {
            warn!("Edit {}: {}", edit_id, e);
            let err = edit_conflict(&self.reconciler, &file_id);
            self.reconciler.abandon(&edit_id);
            self.resolve_edit(&edit_id, Err(err));
            return;
        }

        let tx = self.worker_tx.clone();
        let signal_id = edit_id.clone();
        let completion = EditCompletion::new(edit_id.clone(), move |signal| {
            let _ = tx.send(WorkerMessage::EditorFinished {
                edit_id: signal_id,
                signal,
            });
        });

        self.editor.launch(EditSession {
            edit_id,
            local_path: downloaded.local_path,
            mime_type,
            completion,
        });
    }

    fn editor_finished(&mut self, edit_id: String, signal: EditorSignal) {
        let edited = match signal {
            EditorSignal::Finished(edited) => edited,
            EditorSignal::Cancelled => {
                if let Some(ctx) = self.reconciler.abandon(&edit_id) {
                    self.events.emit(ControllerEvent::EditCancelled {
                        edit_id: edit_id.clone(),
                        file_id: ctx.file.id.clone(),
                    });
                    self.resolve_edit(&edit_id, Ok(EditOutcome::Cancelled { file_id: ctx.file.id }));
                }
                return;
            }
        };

        let ctx = match self.reconciler.editor_completed(&edit_id) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Ignoring editor result: {}", e);
                return;
            }
        };

        let store = self.store.clone();
        let engine = self.engine.clone();
        self.spawn_worker("edit-reconcile", async move {
            let old = ctx.file;

            // Delete first. If the upload then fails the original is gone.
            match store.delete(&old.id).await {
                Ok(()) => {}
                Err(DriveError::NotFound(_)) => {
                    debug!("Original {} already gone, uploading anyway", old.id);
                }
                Err(e) => {
                    return WorkerMessage::EditReconciled {
                        edit_id,
                        old_deleted: false,
                        result: Err(e),
                    };
                }
            }

            let name = edited
                .display_name()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| old.name.clone());
            let mime_type = edited
                .mime_type()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| old.effective_mime_type().to_string());

            let result = engine
                .upload_as(&*store, &*edited, &name, &mime_type)
                .await;
            WorkerMessage::EditReconciled {
                edit_id,
                old_deleted: true,
                result,
            }
        });
    }

    fn edit_reconciled(
        &mut self,
        edit_id: String,
        old_deleted: bool,
        result: Result<RemoteFile, DriveError>,
    ) {
        let ctx = match self.reconciler.finish(&edit_id) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Dropping reconcile result: {}", e);
                return;
            }
        };

        if old_deleted {
            self.start_refresh(None);
        }

        match result {
            Ok(new_file) => {
                self.events.emit(ControllerEvent::EditCompleted {
                    edit_id: edit_id.clone(),
                    old_id: ctx.file.id.clone(),
                    new_id: new_file.id.clone(),
                });
                self.resolve_edit(
                    &edit_id,
                    Ok(EditOutcome::Replaced {
                        old_id: ctx.file.id,
                        new_file,
                    }),
                );
            }
            Err(e) => {
                if old_deleted {
                    warn!(
                        "Edit {}: {} was deleted but its replacement failed to upload",
                        edit_id, ctx.file.name
                    );
                }
                self.events.emit_failure("edit", &e);
                self.resolve_edit(&edit_id, Err(e));
            }
        }
    }
}

/// Cloneable handle to the control loop.
///
/// Any holder can issue every operation, including shutdown.
#[derive(Clone)]
pub struct ControllerHandle {
    cmd_tx: mpsc::Sender<ControllerCommand>,
    events: EventEmitter,
}

impl ControllerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ControllerCommand,
    ) -> Result<T, DriveError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| DriveError::ControllerClosed)?;
        reply_rx.await.map_err(|_| DriveError::ControllerClosed)?
    }

    /// List the first page and replace the catalog with it.
    ///
    /// Returns the catalog as it was right after this result was applied.
    pub async fn refresh(&self) -> Result<Vec<RemoteFile>, DriveError> {
        self.request(|reply| ControllerCommand::Refresh { reply: Some(reply) })
            .await
    }

    /// Start a refresh without waiting for it
    pub async fn request_refresh(&self) -> Result<(), DriveError> {
        self.cmd_tx
            .send(ControllerCommand::Refresh { reply: None })
            .await
            .map_err(|_| DriveError::ControllerClosed)
    }

    /// Upload as a new remote file. A refresh follows on success.
    pub async fn upload(
        &self,
        locator: impl ContentLocator + 'static,
    ) -> Result<RemoteFile, DriveError> {
        let locator: Box<dyn ContentLocator> = Box::new(locator);
        self.request(|reply| ControllerCommand::Upload { locator, reply })
            .await
    }

    /// Download into the download directory and notify the user
    pub async fn download(&self, file: RemoteFile) -> Result<DownloadedFile, DriveError> {
        self.request(|reply| ControllerCommand::Download { file, reply })
            .await
    }

    /// Delete by id. A refresh follows on success.
    pub async fn delete(&self, id: &str) -> Result<(), DriveError> {
        let id = id.to_string();
        self.request(|reply| ControllerCommand::Delete { id, reply })
            .await
    }

    /// Edit-replace `file` through the external editor.
    ///
    /// Resolves when the editor is done and the replacement is uploaded, or
    /// the editor cancelled. Only one edit can be outstanding.
    pub async fn edit(&self, file: RemoteFile) -> Result<EditOutcome, DriveError> {
        self.request(|reply| ControllerCommand::Edit { file, reply })
            .await
    }

    /// Copy of the current catalog
    pub async fn catalog(&self) -> Result<Vec<RemoteFile>, DriveError> {
        self.request(|reply| ControllerCommand::Catalog { reply }).await
    }

    pub async fn edit_phase(&self) -> Result<EditPhase, DriveError> {
        self.request(|reply| ControllerCommand::EditPhase { reply })
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Stop the control loop. In-flight workers finish but their results
    /// are dropped.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ControllerCommand::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::auth::StaticAuthenticator;
    use crate::collaborators::editor::QueuedEditorLauncher;
    use crate::collaborators::locator::BytesLocator;
    use crate::drive::memory::{MemoryRemoteStore, StoreOp};
    use parking_lot::Mutex;
    use tempfile::{tempdir, TempDir};

    /// Spawns on tokio and records task names
    #[derive(Default)]
    struct RecordingSpawner {
        names: Mutex<Vec<&'static str>>,
    }

    impl RecordingSpawner {
        fn count(&self, name: &str) -> usize {
            self.names.lock().iter().filter(|n| **n == name).count()
        }
    }

    impl TaskSpawner for RecordingSpawner {
        fn spawn(&self, name: &'static str, task: spawner::BoxFuture) {
            self.names.lock().push(name);
            tokio::spawn(task);
        }
    }

    struct Harness {
        store: Arc<MemoryRemoteStore>,
        spawner: Arc<RecordingSpawner>,
        edits: mpsc::UnboundedReceiver<EditSession>,
        handle: ControllerHandle,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryRemoteStore::new());
        let spawner = Arc::new(RecordingSpawner::default());
        let (editor, edits) = QueuedEditorLauncher::new();
        let handle = ControllerBuilder::new(
            store.clone(),
            Arc::new(StaticAuthenticator::new("token")),
            TransferEngine::new(dir.path()),
        )
        .editor(Arc::new(editor))
        .spawner(spawner.clone())
        .spawn()
        .unwrap();
        Harness {
            store,
            spawner,
            edits,
            handle,
            _dir: dir,
        }
    }

    #[test]
    fn test_edit_conflict_names_the_pending_file() {
        let mut reconciler = EditReconciler::new();
        assert!(matches!(
            edit_conflict(&reconciler, "requested"),
            DriveError::EditInProgress(ref id) if id == "requested"
        ));

        reconciler
            .downloaded(
                "e1".into(),
                RemoteFile::new("busy", "a.txt", None),
                std::path::PathBuf::from("/tmp/a.txt"),
            )
            .unwrap();
        let err = edit_conflict(&reconciler, "requested");
        assert!(matches!(err, DriveError::EditInProgress(ref id) if id == "busy"));
        assert_eq!(err.kind(), "edit_in_progress");
    }

    #[tokio::test]
    async fn test_spawn_without_credential_fails() {
        let result = ControllerBuilder::new(
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(StaticAuthenticator::signed_out()),
            TransferEngine::new("/unused"),
        )
        .spawn();
        assert!(matches!(result, Err(DriveError::Auth(_))));
    }

    #[tokio::test]
    async fn test_refresh_race_last_completed_wins() {
        let h = harness();
        h.store.insert("a.txt", "text/plain", b"a".to_vec());

        let mut gate = h.store.pause_next_list();
        let slow_handle = h.handle.clone();
        let slow = tokio::spawn(async move { slow_handle.refresh().await });
        gate.entered().await;

        h.store.insert("b.txt", "text/plain", b"b".to_vec());
        let fresh = h.handle.refresh().await.unwrap();
        assert_eq!(fresh.len(), 2);

        gate.release();
        let stale = slow.await.unwrap().unwrap();
        assert_eq!(stale.len(), 1);

        // The older list finished last, so it is what the catalog shows
        assert_eq!(h.handle.catalog().await.unwrap(), stale);
    }

    #[tokio::test]
    async fn test_failed_mutation_does_not_refresh() {
        let h = harness();
        h.store
            .inject_failure(StoreOp::Create, DriveError::Transport("503".into()));

        let err = h
            .handle
            .upload(BytesLocator::new("mem", &b"x"[..]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");

        let err = h.handle.delete("missing").await.unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(h.spawner.count("refresh"), 0);
    }

    #[tokio::test]
    async fn test_successful_mutation_refreshes() {
        let h = harness();
        let mut events = h.handle.subscribe();

        let created = h
            .handle
            .upload(BytesLocator::new("mem", &b"x"[..]).with_display_name("x.txt"))
            .await
            .unwrap();
        assert_eq!(h.spawner.count("refresh"), 1);

        loop {
            if let ControllerEvent::CatalogRefreshed { count, .. } = events.recv().await.unwrap() {
                assert_eq!(count, 1);
                break;
            }
        }
        let catalog = h.handle.catalog().await.unwrap();
        assert_eq!(catalog[0].id, created.id);
    }

    #[tokio::test]
    async fn test_second_edit_is_rejected() {
        let mut h = harness();
        let file = h.store.insert("notes.txt", "text/plain", b"v1".to_vec());

        let first_handle = h.handle.clone();
        let first_file = file.clone();
        let first = tokio::spawn(async move { first_handle.edit(first_file).await });

        let session = h.edits.recv().await.unwrap();
        assert_eq!(h.handle.edit_phase().await.unwrap(), EditPhase::ExternalEdit);

        let err = h.handle.edit(file.clone()).await.unwrap_err();
        assert!(matches!(err, DriveError::EditInProgress(ref id) if id == &file.id));

        // The first edit is unaffected
        session.completion.cancel();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            EditOutcome::Cancelled {
                file_id: file.id.clone()
            }
        );
        assert!(h.store.contains(&file.id));
        assert_eq!(h.handle.edit_phase().await.unwrap(), EditPhase::Idle);
    }

    #[tokio::test]
    async fn test_dropped_completion_cancels_edit() {
        let mut h = harness();
        let file = h.store.insert("notes.txt", "text/plain", b"v1".to_vec());

        let handle = h.handle.clone();
        let edit_file = file.clone();
        let pending = tokio::spawn(async move { handle.edit(edit_file).await });

        drop(h.edits.recv().await.unwrap());

        assert!(matches!(
            pending.await.unwrap().unwrap(),
            EditOutcome::Cancelled { .. }
        ));
        assert_eq!(h.store.call_count(StoreOp::Delete), 0);
    }

    #[tokio::test]
    async fn test_edit_proceeds_when_original_already_deleted() {
        let mut h = harness();
        let file = h.store.insert("notes.txt", "text/plain", b"v1".to_vec());

        let handle = h.handle.clone();
        let edit_file = file.clone();
        let pending = tokio::spawn(async move { handle.edit(edit_file).await });

        let session = h.edits.recv().await.unwrap();
        // Someone else removed the original meanwhile
        h.store.inject_failure(StoreOp::Delete, DriveError::NotFound(file.id.clone()));
        session
            .completion
            .finish(Box::new(BytesLocator::new("edited", &b"v2"[..])));

        match pending.await.unwrap().unwrap() {
            EditOutcome::Replaced { old_id, new_file } => {
                assert_eq!(old_id, file.id);
                assert_eq!(new_file.name, "notes.txt");
                assert_eq!(new_file.mime_type.as_deref(), Some("text/plain"));
                assert_eq!(h.store.content(&new_file.id).unwrap(), b"v2");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_edit_download_failure_returns_to_idle() {
        let h = harness();
        let ghost = RemoteFile::new("ghost", "ghost.txt", None);

        let err = h.handle.edit(ghost).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.handle.edit_phase().await.unwrap(), EditPhase::Idle);
    }

    #[tokio::test]
    async fn test_download_notifies() {
        struct Collecting(Mutex<Vec<DownloadNotice>>);
        impl Notifier for Collecting {
            fn notify(&self, notice: DownloadNotice) {
                self.0.lock().push(notice);
            }
        }

        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryRemoteStore::new());
        let file = store.insert("photo.png", "image/png", b"png".to_vec());
        let notifier = Arc::new(Collecting(Mutex::new(Vec::new())));
        let handle = ControllerBuilder::new(
            store,
            Arc::new(StaticAuthenticator::new("token")),
            TransferEngine::new(dir.path()),
        )
        .notifier(notifier.clone())
        .spawn()
        .unwrap();

        let downloaded = handle.download(file).await.unwrap();
        let notices = notifier.0.lock().clone();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].path, downloaded.local_path);
        assert_eq!(notices[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let h = harness();
        h.handle.shutdown().await;

        let err = h.handle.catalog().await.unwrap_err();
        assert!(matches!(err, DriveError::ControllerClosed));
    }
}
