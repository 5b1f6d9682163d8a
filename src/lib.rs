//! DriveLink - a remote drive file manager
//!
//! Lists, uploads, downloads, deletes and edit-replaces files in a Google
//! Drive style object store. All remote work is driven by a single control
//! task; see [`controller`].

pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod drive;

pub use catalog::FileCatalog;
pub use controller::edit::{EditOutcome, EditPhase};
pub use controller::events::{ControllerEvent, EventEmitter};
pub use controller::{ControllerBuilder, ControllerHandle};
pub use drive::{DriveError, RemoteFile, RemoteStore};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
