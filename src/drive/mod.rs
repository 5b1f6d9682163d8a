//! Remote drive access
//!
//! The [`RemoteStore`] contract, its HTTP and in-memory implementations, and
//! the transfer engine that streams file content through it.

pub mod client;
pub mod error;
pub mod http;
pub mod memory;
pub mod path_utils;
pub mod transfer;
pub mod types;

pub use client::{byte_source, ByteSource, RemoteStore};
pub use error::DriveError;
pub use http::HttpRemoteStore;
pub use memory::{ListGate, MemoryRemoteStore, StoreOp};
pub use transfer::{TransferEngine, TransferSession, DEFAULT_CHUNK_SIZE};
pub use types::*;
