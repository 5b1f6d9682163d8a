//! Configuration Management Module
//!
//! Persistent settings in the app directory and the access token in the
//! system keychain.

pub mod keychain;
pub mod storage;
pub mod types;

pub use keychain::{KeychainError, TokenKeychain};
pub use storage::{config_dir, download_dir, files_dir, ConfigStorage, StorageError};
pub use types::{AppConfig, DriveEndpoints, CONFIG_VERSION};
