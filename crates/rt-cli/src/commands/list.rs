//! List command implementation

use anyhow::Result;

use rt_core::config::RelayConfig;

use crate::output::format_tunnels;

/// Show the registered tunnels whose owning process is alive
pub async fn list_command(config: &RelayConfig) -> Result<()> {
    let manager = super::manager(config);

    match manager.list().await {
        Ok(tunnels) => {
            println!("{}", format_tunnels(&tunnels, &config.relay_host));
            Ok(())
        }
        Err(e) => super::report(e),
    }
}
