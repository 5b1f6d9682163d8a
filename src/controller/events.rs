//! Controller events
//!
//! Fire-and-forget notifications for whoever renders the file list. Every
//! failure surfaces here as well as in the reply to the request that caused it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::drive::error::DriveError;
use crate::drive::types::RemoteFile;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControllerEvent {
    /// A list result was applied to the catalog
    #[serde(rename_all = "camelCase")]
    CatalogRefreshed { count: usize, has_more: bool },
    FileUploaded { file: RemoteFile },
    #[serde(rename_all = "camelCase")]
    FileDeleted { file_id: String },
    #[serde(rename_all = "camelCase")]
    DownloadCompleted {
        file_id: String,
        local_path: String,
        mime_type: String,
    },
    #[serde(rename_all = "camelCase")]
    EditStarted { edit_id: String, file_id: String },
    #[serde(rename_all = "camelCase")]
    EditCompleted {
        edit_id: String,
        old_id: String,
        new_id: String,
    },
    #[serde(rename_all = "camelCase")]
    EditCancelled { edit_id: String, file_id: String },
    /// Any operation failed; `kind` is [`DriveError::kind`]
    OperationFailed {
        operation: String,
        kind: String,
        message: String,
    },
}

/// Broadcasts [`ControllerEvent`]s. Without subscribers events are dropped.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: Option<broadcast::Sender<ControllerEvent>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx: Some(tx) }
    }

    /// Emitter that discards everything
    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        match &self.tx {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub fn emit(&self, event: ControllerEvent) {
        if let Some(ref tx) = self.tx {
            // Err only means nobody is listening
            let _ = tx.send(event);
        }
    }

    pub fn emit_failure(&self, operation: &str, error: &DriveError) {
        tracing::warn!("{} failed: {}", operation, error);
        self.emit(ControllerEvent::OperationFailed {
            operation: operation.to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        emitter.emit_failure("download", &DriveError::NotFound("x".into()));

        match rx.recv().await.unwrap() {
            ControllerEvent::OperationFailed { operation, kind, .. } => {
                assert_eq!(operation, "download");
                assert_eq!(kind, "not_found");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_noop_emitter_discards() {
        let emitter = EventEmitter::noop();
        emitter.emit(ControllerEvent::FileDeleted {
            file_id: "a".into(),
        });
        let mut rx = emitter.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serialization() {
        let event = ControllerEvent::CatalogRefreshed {
            count: 3,
            has_more: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "catalogRefreshed");
        assert_eq!(json["hasMore"], true);
    }
}
