//! Output formatting utilities for the CLI
//!
//! Table rendering for the tunnel list plus colored status messages.

use tabled::{settings::Style, Table, Tabled};

use rt_core::TunnelRecord;

/// Format the active tunnels as an ASCII table.
///
/// Returns "No active tunnels" for an empty list.
pub fn format_tunnels(tunnels: &[TunnelRecord], relay_host: &str) -> String {
    if tunnels.is_empty() {
        return "No active tunnels".to_string();
    }

    #[derive(Tabled)]
    struct TunnelRow {
        #[tabled(rename = "LOCAL")]
        local: String,
        #[tabled(rename = "REMOTE")]
        remote: String,
        #[tabled(rename = "PID")]
        pid: u32,
    }

    let rows: Vec<TunnelRow> = tunnels
        .iter()
        .map(|t| TunnelRow {
            local: format!("localhost:{}", t.local_port),
            remote: format!("{}:{}", relay_host, t.remote_port),
            pid: t.owner_pid,
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix, to stderr
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix, to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_tunnels_empty() {
        assert_eq!(format_tunnels(&[], "relay.example.com"), "No active tunnels");
    }

    #[test]
    fn test_format_tunnels_contains_endpoints() {
        let tunnels = [TunnelRecord {
            local_port: 8080,
            remote_port: 43210,
            owner_pid: 4242,
        }];
        let table = format_tunnels(&tunnels, "relay.example.com");
        assert!(table.contains("localhost:8080"));
        assert!(table.contains("relay.example.com:43210"));
        assert!(table.contains("4242"));
    }
}
