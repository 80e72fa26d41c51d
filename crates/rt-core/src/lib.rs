//! rt-core: registry, locking, and tunnel establishment for revtun
//!
//! This crate provides the pieces the `revtun` CLI is assembled from:
//! the persisted tunnel registry and its cross-process lock, the process
//! liveness/termination primitives, the ssh handshake launcher, and the
//! lifecycle operations tying them together.

pub mod config;
pub mod error;
pub mod launcher;
pub mod lock;
pub mod ops;
pub mod process;
pub mod registry;

pub use error::TunnelError;
pub use registry::TunnelRecord;
