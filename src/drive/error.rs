//! Drive error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriveError {
    /// Missing or rejected credential; the user has to sign in again.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Remote file not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Another edit is already in progress: {0}")]
    EditInProgress(String),

    #[error("Controller is no longer running")]
    ControllerClosed,
}

impl DriveError {
    /// Short machine-readable kind, used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DriveError::Auth(_) => "auth",
            DriveError::NotFound(_) => "not_found",
            DriveError::Transport(_) => "transport",
            DriveError::Io(_) => "io",
            DriveError::EditInProgress(_) => "edit_in_progress",
            DriveError::ControllerClosed => "controller_closed",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DriveError::NotFound(_))
    }

    /// Auth failures route the user back to sign-in instead of a toast.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, DriveError::Auth(_))
    }
}

impl From<reqwest::Error> for DriveError {
    fn from(err: reqwest::Error) -> Self {
        DriveError::Transport(err.to_string())
    }
}

// Errors cross the shell boundary as plain messages
impl serde::Serialize for DriveError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(DriveError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(DriveError::Transport("x".into()).kind(), "transport");
        assert!(DriveError::Auth("expired".into()).requires_reauth());
        assert!(!DriveError::Transport("reset".into()).requires_reauth());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: DriveError = io.into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("pipe"));
    }

    #[test]
    fn test_serializes_as_message() {
        let err = DriveError::NotFound("abc".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Remote file not found: abc\"");
    }
}
