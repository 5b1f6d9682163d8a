//! Platform collaborators
//!
//! Everything the controller needs from the outside world but does not own:
//! credentials, picked content, the external editor and user notifications.

pub mod auth;
pub mod editor;
pub mod locator;
pub mod notifier;

pub use auth::{
    Authenticator, Credential, EnvAuthenticator, KeychainAuthenticator, StaticAuthenticator,
    TOKEN_ENV_VAR,
};
pub use editor::{CommandEditorLauncher, EditorLauncher, QueuedEditorLauncher};
pub use locator::{BytesLocator, ContentLocator, LocalFileLocator};
pub use notifier::{DownloadNotice, Notifier, TracingNotifier};
