//! Download notifications

use std::path::PathBuf;

use serde::Serialize;

use crate::drive::types::DownloadedFile;

/// What the user sees (and taps) after a download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadNotice {
    pub path: PathBuf,
    pub mime_type: String,
    pub text: String,
}

impl DownloadNotice {
    pub fn for_download(file: &DownloadedFile) -> Self {
        Self {
            path: file.local_path.clone(),
            mime_type: file.mime_type.clone(),
            text: format!("File downloaded to {}", file.local_path.display()),
        }
    }
}

/// Presents notices to the user. Channel setup is the implementor's business.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: DownloadNotice);
}

/// Writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: DownloadNotice) {
        tracing::info!(
            path = %notice.path.display(),
            mime_type = %notice.mime_type,
            "{}",
            notice.text
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_for_download() {
        let downloaded = DownloadedFile {
            remote_id: "r1".into(),
            local_path: PathBuf::from("/data/files/a.pdf"),
            mime_type: "application/pdf".into(),
            bytes: 10,
        };
        let notice = DownloadNotice::for_download(&downloaded);
        assert_eq!(notice.mime_type, "application/pdf");
        assert!(notice.text.contains("/data/files/a.pdf"));

        // Should not panic
        TracingNotifier.notify(notice);
    }
}
