//! Reset command implementation

use anyhow::Result;

use rt_core::config::RelayConfig;

use crate::output::{print_success, print_warning};

/// Kill every managed tunnel, wipe the registry, and sweep orphans
pub async fn reset_command(config: &RelayConfig, force: bool) -> Result<()> {
    if !force {
        print_warning("This kills every managed tunnel and wipes the registry.");
        print!("Continue? [y/N] ");
        std::io::Write::flush(&mut std::io::stdout())?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            print_warning("Aborted");
            return Ok(());
        }
    }

    let manager = super::manager(config);
    // Orphaned tunnel subprocesses carry the relay host on their command line
    let sweep_pattern = format!("ssh.*-R.*{}", config.relay_host);

    match manager.reset(true, &sweep_pattern).await {
        Ok(killed) => {
            let killed = killed.unwrap_or(0);
            print_success(&format!(
                "Reset complete: {} registered tunnel(s) killed",
                killed
            ));
            Ok(())
        }
        Err(e) => super::report(e),
    }
}
