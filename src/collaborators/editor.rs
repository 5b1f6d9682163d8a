//! External editor launchers
//!
//! The launcher receives an [`EditSession`] and resolves its completion when
//! the user is done, possibly much later. It must not block the caller.

use std::fmt;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::locator::LocalFileLocator;
use crate::controller::edit::EditSession;
use crate::controller::spawner::{TaskSpawner, TokioSpawner};

/// Hands a downloaded working copy to some external editor
pub trait EditorLauncher: Send + Sync {
    fn launch(&self, session: EditSession);
}

/// Runs an editor command on the working copy.
///
/// Exit status 0 means the file was edited in place and gets uploaded. Any
/// other status, or a failure to start the command, cancels the edit.
#[derive(Clone)]
pub struct CommandEditorLauncher {
    program: String,
    args: Vec<String>,
    spawner: Arc<dyn TaskSpawner>,
}

impl fmt::Debug for CommandEditorLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEditorLauncher")
            .field("program", &self.program)
            .field("args", &self.args)
            .finish()
    }
}

impl CommandEditorLauncher {
    /// `command` is split on whitespace: `"code --wait"` works
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "vi".to_string());
        Self {
            program,
            args: parts.collect(),
            spawner: Arc::new(TokioSpawner),
        }
    }

    /// Wait for the editor process on `spawner` instead of a bare tokio task
    pub fn with_spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// `$VISUAL`, then `$EDITOR`, then `vi`
    pub fn from_env() -> Self {
        let command = std::env::var("VISUAL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| std::env::var("EDITOR").ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| "vi".to_string());
        Self::new(&command)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl EditorLauncher for CommandEditorLauncher {
    fn launch(&self, session: EditSession) {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(&session.local_path);
        let program = self.program.clone();

        let wait = async move {
            let EditSession {
                edit_id,
                local_path,
                completion,
                ..
            } = session;

            match command.status().await {
                Ok(status) if status.success() => {
                    info!("Editor {} finished edit {}", program, edit_id);
                    completion.finish(Box::new(LocalFileLocator::new(local_path)));
                }
                Ok(status) => {
                    info!("Editor {} exited with {} for edit {}", program, status, edit_id);
                    completion.cancel();
                }
                Err(e) => {
                    warn!("Failed to start editor {}: {}", program, e);
                    completion.cancel();
                }
            }
        };
        self.spawner.spawn("editor", Box::pin(wait));
    }
}

/// Queues sessions for someone else to resolve
#[derive(Debug, Clone)]
pub struct QueuedEditorLauncher {
    tx: mpsc::UnboundedSender<EditSession>,
}

impl QueuedEditorLauncher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EditSession>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EditorLauncher for QueuedEditorLauncher {
    fn launch(&self, session: EditSession) {
        // A closed queue drops the session, which cancels the edit
        if self.tx.send(session).is_err() {
            warn!("Editor queue closed, edit cancelled");
        }
    }
}
