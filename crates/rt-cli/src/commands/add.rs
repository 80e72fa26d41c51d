//! Add command implementation

use anyhow::Result;

use rt_core::config::{self, RelayConfig};
use rt_core::launcher::TunnelLauncher;

use crate::output::{print_info, print_success};

/// Establish a tunnel for `port` and record it
pub async fn add_command(config: &RelayConfig, port: &str) -> Result<()> {
    let manager = super::manager(config);
    let launcher = TunnelLauncher::new(config.clone(), config::log_dir());

    print_info(&format!(
        "Opening reverse tunnel to {} for local port {}...",
        config.relay_host, port
    ));

    match manager.add(port, &launcher).await {
        Ok(record) => {
            print_success(&format!(
                "Tunnel up: {}:{} -> localhost:{} (pid {})",
                config.relay_host, record.remote_port, record.local_port, record.owner_pid
            ));
            Ok(())
        }
        Err(e) => super::report(e),
    }
}
