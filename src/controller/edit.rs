//! Edit reconciler
//!
//! Edit-replace is download -> external editor -> delete original -> upload
//! the edited content as a new object. This module holds the state machine for
//! one such edit; the controller performs the I/O and feeds the results back:
//!
//! ```text
//! Idle ──downloaded──▶ Downloaded ──hand_off──▶ ExternalEdit
//!   ▲                                              │ editor_completed
//!   └──────────────finish──────── Reconciling ◀────┘
//! (abandon: any state -> Idle)
//! ```
//!
//! While in `ExternalEdit` nothing runs on our side. The editor holds an
//! [`EditCompletion`] and resolves it whenever the user is done.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collaborators::locator::ContentLocator;
use crate::drive::types::RemoteFile;

/// Externally visible phase of the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EditPhase {
    Idle,
    Downloaded,
    ExternalEdit,
    Reconciling,
}

impl fmt::Display for EditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditPhase::Idle => "idle",
            EditPhase::Downloaded => "downloaded",
            EditPhase::ExternalEdit => "external-edit",
            EditPhase::Reconciling => "reconciling",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("Cannot {action} while {phase}")]
    InvalidTransition {
        phase: EditPhase,
        action: &'static str,
    },

    #[error("Edit {got} does not match pending edit {expected}")]
    StaleEdit { expected: String, got: String },
}

/// The pending edit: which remote file is being replaced and where its
/// working copy lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditContext {
    /// Correlation id, ties editor completion back to this edit
    pub edit_id: String,
    pub file: RemoteFile,
    pub local_path: PathBuf,
}

#[derive(Debug, Default)]
enum EditState {
    #[default]
    Idle,
    Downloaded(EditContext),
    ExternalEdit(EditContext),
    Reconciling(EditContext),
}

impl EditState {
    fn phase(&self) -> EditPhase {
        match self {
            EditState::Idle => EditPhase::Idle,
            EditState::Downloaded(_) => EditPhase::Downloaded,
            EditState::ExternalEdit(_) => EditPhase::ExternalEdit,
            EditState::Reconciling(_) => EditPhase::Reconciling,
        }
    }

    fn context(&self) -> Option<&EditContext> {
        match self {
            EditState::Idle => None,
            EditState::Downloaded(ctx)
            | EditState::ExternalEdit(ctx)
            | EditState::Reconciling(ctx) => Some(ctx),
        }
    }
}

/// State machine for the single outstanding edit
#[derive(Debug, Default)]
pub struct EditReconciler {
    state: EditState,
}

impl EditReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> EditPhase {
        self.state.phase()
    }

    pub fn pending(&self) -> Option<&EditContext> {
        self.state.context()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, EditState::Idle)
    }

    fn check_id(ctx: &EditContext, edit_id: &str) -> Result<(), EditError> {
        if ctx.edit_id == edit_id {
            Ok(())
        } else {
            Err(EditError::StaleEdit {
                expected: ctx.edit_id.clone(),
                got: edit_id.to_string(),
            })
        }
    }

    /// Idle -> Downloaded: the working copy of `file` is on disk
    pub fn downloaded(
        &mut self,
        edit_id: String,
        file: RemoteFile,
        local_path: PathBuf,
    ) -> Result<(), EditError> {
        if !self.is_idle() {
            return Err(EditError::InvalidTransition {
                phase: self.phase(),
                action: "record a download",
            });
        }
        info!("Edit {}: downloaded {} ({})", edit_id, file.name, file.id);
        self.state = EditState::Downloaded(EditContext {
            edit_id,
            file,
            local_path,
        });
        Ok(())
    }

    /// Downloaded -> ExternalEdit: the editor has the working copy
    pub fn hand_off(&mut self, edit_id: &str) -> Result<EditContext, EditError> {
        match std::mem::take(&mut self.state) {
            EditState::Downloaded(ctx) => {
                if let Err(e) = Self::check_id(&ctx, edit_id) {
                    self.state = EditState::Downloaded(ctx);
                    return Err(e);
                }
                debug!("Edit {}: handed to external editor", edit_id);
                self.state = EditState::ExternalEdit(ctx.clone());
                Ok(ctx)
            }
            other => {
                let phase = other.phase();
                self.state = other;
                Err(EditError::InvalidTransition {
                    phase,
                    action: "hand off to the editor",
                })
            }
        }
    }

    /// ExternalEdit -> Reconciling: the editor returned edited content
    pub fn editor_completed(&mut self, edit_id: &str) -> Result<EditContext, EditError> {
        match std::mem::take(&mut self.state) {
            EditState::ExternalEdit(ctx) => {
                if let Err(e) = Self::check_id(&ctx, edit_id) {
                    self.state = EditState::ExternalEdit(ctx);
                    return Err(e);
                }
                debug!("Edit {}: reconciling", edit_id);
                self.state = EditState::Reconciling(ctx.clone());
                Ok(ctx)
            }
            other => {
                let phase = other.phase();
                self.state = other;
                Err(EditError::InvalidTransition {
                    phase,
                    action: "complete the editor step",
                })
            }
        }
    }

    /// Reconciling -> Idle: delete and upload have run, whatever their outcome
    pub fn finish(&mut self, edit_id: &str) -> Result<EditContext, EditError> {
        match std::mem::take(&mut self.state) {
            EditState::Reconciling(ctx) => {
                if let Err(e) = Self::check_id(&ctx, edit_id) {
                    self.state = EditState::Reconciling(ctx);
                    return Err(e);
                }
                info!("Edit {}: finished", edit_id);
                Ok(ctx)
            }
            other => {
                let phase = other.phase();
                self.state = other;
                Err(EditError::InvalidTransition {
                    phase,
                    action: "finish",
                })
            }
        }
    }

    /// Any -> Idle on cancellation or failure. Nothing already done is undone.
    pub fn abandon(&mut self, edit_id: &str) -> Option<EditContext> {
        match self.state.context() {
            Some(ctx) if ctx.edit_id == edit_id => {}
            Some(ctx) => {
                warn!(
                    "Ignoring abandon for {}, pending edit is {}",
                    edit_id, ctx.edit_id
                );
                return None;
            }
            None => return None,
        }
        let ctx = std::mem::take(&mut self.state).context().cloned();
        info!("Edit {}: abandoned", edit_id);
        ctx
    }
}

/// How the external editor ended
pub enum EditorSignal {
    /// Edited content is ready for upload
    Finished(Box<dyn ContentLocator>),
    Cancelled,
}

impl fmt::Debug for EditorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorSignal::Finished(locator) => {
                f.debug_tuple("Finished").field(&locator.locator()).finish()
            }
            EditorSignal::Cancelled => f.write_str("Cancelled"),
        }
    }
}

type SignalFn = Box<dyn FnOnce(EditorSignal) + Send>;

/// Single-shot handle the editor uses to report back.
///
/// Dropping it without calling [`finish`](Self::finish) or
/// [`cancel`](Self::cancel) counts as cancellation.
pub struct EditCompletion {
    edit_id: String,
    signal: Option<SignalFn>,
}

impl EditCompletion {
    pub fn new(edit_id: String, signal: impl FnOnce(EditorSignal) + Send + 'static) -> Self {
        Self {
            edit_id,
            signal: Some(Box::new(signal)),
        }
    }

    pub fn edit_id(&self) -> &str {
        &self.edit_id
    }

    pub fn finish(mut self, edited: Box<dyn ContentLocator>) {
        if let Some(signal) = self.signal.take() {
            signal(EditorSignal::Finished(edited));
        }
    }

    pub fn cancel(mut self) {
        if let Some(signal) = self.signal.take() {
            signal(EditorSignal::Cancelled);
        }
    }
}

impl Drop for EditCompletion {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            debug!("EditCompletion {} dropped unresolved, cancelling", self.edit_id);
            signal(EditorSignal::Cancelled);
        }
    }
}

impl fmt::Debug for EditCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditCompletion")
            .field("edit_id", &self.edit_id)
            .field("resolved", &self.signal.is_none())
            .finish()
    }
}

/// Everything the external editor gets
#[derive(Debug)]
pub struct EditSession {
    pub edit_id: String,
    /// Downloaded working copy
    pub local_path: PathBuf,
    pub mime_type: String,
    pub completion: EditCompletion,
}

/// Result of a completed edit request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditOutcome {
    /// The original is gone and `new_file` holds the edited content
    #[serde(rename_all = "camelCase")]
    Replaced { old_id: String, new_file: RemoteFile },
    /// The editor returned nothing; the remote file is untouched
    #[serde(rename_all = "camelCase")]
    Cancelled { file_id: String },
}
