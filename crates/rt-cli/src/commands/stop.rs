//! Stop command implementation

use anyhow::Result;

use rt_core::config::RelayConfig;
use rt_core::ops::{StopTarget, TunnelManager};
use rt_core::process::SystemProcesses;
use rt_core::registry::FileRegistry;
use rt_core::TunnelError;

use crate::output::{print_success, print_warning};

/// Stop the tunnel for one local port, or all of them
pub async fn stop_command(config: &RelayConfig, target: &str) -> Result<()> {
    let manager = super::manager(config);

    if target.eq_ignore_ascii_case("all") {
        return match manager.stop_all().await {
            Ok(stopped) => {
                print_success(&format!("Stopped {} tunnel(s)", stopped));
                Ok(())
            }
            Err(e) => super::report(e),
        };
    }

    let port = match TunnelManager::<FileRegistry, SystemProcesses>::parse_port(target) {
        Ok(port) => port,
        Err(e) => return super::report(e),
    };

    match manager.stop(StopTarget::Port(port)).await {
        Ok(outcomes) => {
            for outcome in outcomes {
                if outcome.signaled {
                    print_success(&format!(
                        "Stopped tunnel on local port {} (pid {})",
                        outcome.record.local_port, outcome.record.owner_pid
                    ));
                } else {
                    print_warning(&format!(
                        "Tunnel on local port {} was already gone; removed its entry",
                        outcome.record.local_port
                    ));
                }
            }
            Ok(())
        }
        Err(TunnelError::NotFound(port)) => {
            print_warning(&format!("No tunnel registered for local port {}", port));
            Ok(())
        }
        Err(e) => super::report(e),
    }
}
