//! Error types for revtun

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by tunnel lifecycle operations
#[derive(Error, Debug)]
pub enum TunnelError {
    /// The user-supplied port is not an integer in 1-65535
    #[error("invalid port {0:?}: expected an integer in 1-65535")]
    InvalidPort(String),

    /// A live tunnel for this local port is already registered
    #[error("a tunnel for local port {port} is already running (pid {pid})")]
    AlreadyExists { port: u16, pid: u32 },

    /// The ssh client did not announce an allocated port in time
    #[error("tunnel did not come up within {waited:?}; ssh output:\n{output}")]
    EstablishmentTimeout { waited: Duration, output: String },

    /// The announcement was seen but no usable port could be read from it
    #[error("could not extract an allocated remote port from the ssh announcement")]
    PortExtractionFailed,

    /// The registry lock could not be acquired within the bounded wait
    #[error("could not acquire the registry lock within {0:?}; is another revtun invocation stuck?")]
    LockTimeout(Duration),

    /// A stop target matched no registered tunnel
    #[error("no tunnel registered for local port {0}")]
    NotFound(u16),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A registry line that does not parse as `local:remote:pid`
///
/// Never fatal: the store skips these during read and surfaces the
/// valid remainder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed registry line {0:?}")]
pub struct MalformedRecord(pub String);

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
