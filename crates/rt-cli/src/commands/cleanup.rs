//! Cleanup command implementation

use anyhow::Result;

use rt_core::config::RelayConfig;

use crate::output::{print_info, print_success};

/// Drop registry entries whose owning process has exited
pub async fn cleanup_command(config: &RelayConfig) -> Result<()> {
    let manager = super::manager(config);

    match manager.cleanup().await {
        Ok(0) => {
            print_info("Registry already clean");
            Ok(())
        }
        Ok(removed) => {
            print_success(&format!(
                "Removed {} stale registry entr{}",
                removed,
                if removed == 1 { "y" } else { "ies" }
            ));
            Ok(())
        }
        Err(e) => super::report(e),
    }
}
