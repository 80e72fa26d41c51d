//! rt-cli: command-line interface for revtun
//!
//! Provides the `revtun` binary for managing reverse SSH tunnels
//! to the configured relay host.

pub mod commands;
pub mod output;
