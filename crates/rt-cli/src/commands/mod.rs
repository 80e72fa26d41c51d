//! CLI command implementations

mod add;
mod cleanup;
mod list;
mod reset;
mod stop;

pub use add::add_command;
pub use cleanup::cleanup_command;
pub use list::list_command;
pub use reset::reset_command;
pub use stop::stop_command;

use anyhow::Result;

use rt_core::config::{self, RelayConfig};
use rt_core::ops::TunnelManager;
use rt_core::process::SystemProcesses;
use rt_core::registry::FileRegistry;
use rt_core::TunnelError;

use crate::output::print_error;

/// Build the manager every command operates through
fn manager(config: &RelayConfig) -> TunnelManager<FileRegistry, SystemProcesses> {
    TunnelManager::new(
        FileRegistry::new(config::registry_path()),
        SystemProcesses,
        config::lock_path(),
        config.lock_timeout,
    )
}

/// Report an operation failure and map it to the exit contract: validation
/// and lock failures (and unexpected I/O) are fatal, everything else is
/// reported and swallowed.
fn report(err: TunnelError) -> Result<()> {
    print_error(&err.to_string());
    match err {
        TunnelError::InvalidPort(_) | TunnelError::LockTimeout(_) | TunnelError::Io(_) => {
            Err(err.into())
        }
        _ => Ok(()),
    }
}
