//! Reverse tunnel establishment
//!
//! Spawns the ssh client requesting a server-assigned reverse forward
//! (`-R 0:...`) and watches its startup diagnostics for the allocated-port
//! announcement. The subprocess is detached: on success it keeps running
//! after this invocation exits, on any failure path it is torn down.

use std::fs;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::{Child, Command};

use crate::config::RelayConfig;
use crate::error::TunnelError;

/// Marker the OpenSSH client prints when the server assigns the
/// reverse-forward port
const ANNOUNCEMENT_MARKER: &str = "Allocated port";

/// Server-assigned ports are always outside the privileged range
const MIN_REMOTE_PORT: u16 = 1024;

/// A successfully established tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstablishedTunnel {
    /// Port the relay allocated for the reverse forward
    pub remote_port: u16,
    /// PID of the detached ssh subprocess
    pub pid: u32,
}

/// Extracts the allocated remote port from ssh startup diagnostics.
///
/// Split from the poll loop so the matching strategy can change (different
/// ssh client, different diagnostic format) without touching the handshake.
pub trait AnnouncementParser {
    /// Whether `output` contains the allocated-port announcement
    fn announced(&self, output: &str) -> bool;

    /// Extract the announced port, unvalidated
    fn extract(&self, output: &str) -> Option<u16>;
}

/// Parser for the OpenSSH diagnostic
/// `Allocated port NNNNN for remote forward to ...`
pub struct OpensshAnnouncement {
    port_re: Regex,
}

impl OpensshAnnouncement {
    pub fn new() -> Self {
        Self {
            // First standalone 4-5 digit numeral on the announcement line
            port_re: Regex::new(r"\b(\d{4,5})\b").expect("port pattern is valid"),
        }
    }
}

impl Default for OpensshAnnouncement {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnouncementParser for OpensshAnnouncement {
    fn announced(&self, output: &str) -> bool {
        output.lines().any(|line| line.contains(ANNOUNCEMENT_MARKER))
    }

    fn extract(&self, output: &str) -> Option<u16> {
        let line = output
            .lines()
            .find(|line| line.contains(ANNOUNCEMENT_MARKER))?;
        self.port_re.find(line)?.as_str().parse().ok()
    }
}

/// Something that can establish a reverse tunnel for a local port.
///
/// The add operation drives this between its two locked registry sections;
/// tests substitute a scripted implementation.
#[async_trait]
pub trait Launch: Send + Sync {
    async fn establish(&self, local_port: u16) -> Result<EstablishedTunnel, TunnelError>;
}

/// Establishes reverse tunnels by spawning the configured ssh client
pub struct TunnelLauncher<A = OpensshAnnouncement> {
    config: RelayConfig,
    log_dir: PathBuf,
    parser: A,
}

impl TunnelLauncher<OpensshAnnouncement> {
    /// Create a launcher with the default OpenSSH announcement parser
    pub fn new(config: RelayConfig, log_dir: impl Into<PathBuf>) -> Self {
        Self::with_parser(config, log_dir, OpensshAnnouncement::new())
    }
}

impl<A: AnnouncementParser> TunnelLauncher<A> {
    /// Create a launcher with a custom announcement parser
    pub fn with_parser(config: RelayConfig, log_dir: impl Into<PathBuf>, parser: A) -> Self {
        Self {
            config,
            log_dir: log_dir.into(),
            parser,
        }
    }

    /// Capture file for the handshake diagnostics of `local_port`.
    ///
    /// Kept after the handshake as a diagnostic artifact.
    pub fn log_path(&self, local_port: u16) -> PathBuf {
        self.log_dir.join(format!("tunnel-{}.log", local_port))
    }

    /// Build the ssh invocation requesting a server-assigned reverse forward
    fn ssh_command(&self, local_port: u16) -> Command {
        let mut cmd = Command::new(&self.config.ssh_binary);
        cmd.arg("-N")
            .arg("-R")
            .arg(format!("0:127.0.0.1:{}", local_port))
            .arg("-p")
            .arg(self.config.relay_port.to_string())
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg("ExitOnForwardFailure=yes")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout.as_secs()
            ))
            .arg(self.config.destination());
        cmd
    }

    /// Spawn `cmd` detached with its combined output captured, then poll for
    /// the allocated-port announcement or subprocess exit, whichever first.
    async fn establish_with(
        &self,
        mut cmd: Command,
        local_port: u16,
    ) -> Result<EstablishedTunnel, TunnelError> {
        fs::create_dir_all(&self.log_dir)?;
        let log_path = self.log_path(local_port);
        let log = fs::File::create(&log_path)?;

        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log));

        let started = Instant::now();
        let mut child = cmd.spawn()?;
        let pid = match child.id() {
            Some(pid) => pid,
            None => {
                let output = fs::read_to_string(&log_path).unwrap_or_default();
                return Err(TunnelError::EstablishmentTimeout {
                    waited: started.elapsed(),
                    output,
                });
            }
        };
        tracing::debug!("spawned tunnel subprocess for port {} (pid {})", local_port, pid);

        for _ in 0..self.config.poll_attempts {
            tokio::time::sleep(self.config.poll_interval()).await;

            let output = fs::read_to_string(&log_path).unwrap_or_default();
            if self.parser.announced(&output) {
                return match self.parser.extract(&output) {
                    Some(port) if port >= MIN_REMOTE_PORT => {
                        tracing::info!(
                            "tunnel established: remote port {} -> local port {} (pid {})",
                            port,
                            local_port,
                            pid
                        );
                        Ok(EstablishedTunnel {
                            remote_port: port,
                            pid,
                        })
                    }
                    _ => {
                        tracing::warn!("unusable port announcement for port {}: {}", local_port, output.trim());
                        abandon(&mut child).await;
                        Err(TunnelError::PortExtractionFailed)
                    }
                };
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    // ssh gave up before announcing: auth failure, refused
                    // connection, forward rejected, ...
                    tracing::warn!("ssh exited with {} before announcing a port", status);
                    let output = fs::read_to_string(&log_path).unwrap_or_default();
                    return Err(TunnelError::EstablishmentTimeout {
                        waited: started.elapsed(),
                        output,
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("could not poll tunnel subprocess: {}", e),
            }
        }

        let output = fs::read_to_string(&log_path).unwrap_or_default();
        abandon(&mut child).await;
        Err(TunnelError::EstablishmentTimeout {
            waited: started.elapsed(),
            output,
        })
    }
}

#[async_trait]
impl<A: AnnouncementParser + Send + Sync> Launch for TunnelLauncher<A> {
    async fn establish(&self, local_port: u16) -> Result<EstablishedTunnel, TunnelError> {
        let cmd = self.ssh_command(local_port);
        self.establish_with(cmd, local_port).await
    }
}

/// Best-effort teardown of a handshake that will not be recorded.
///
/// Failure to signal is logged and swallowed: the handshake error being
/// returned is the interesting one.
async fn abandon(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::debug!("tunnel subprocess teardown: {}", e);
    }
    // Reap so an already-dead child does not linger as a zombie while the
    // invocation finishes up
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_OUTPUT: &str = "\
Warning: Permanently added 'relay.example.com' (ED25519) to the list of known hosts.\n\
Allocated port 43210 for remote forward to 127.0.0.1:8080\n";

    #[test]
    fn test_parser_detects_announcement() {
        let parser = OpensshAnnouncement::new();
        assert!(parser.announced(SAMPLE_OUTPUT));
        assert!(!parser.announced("Connection refused\n"));
    }

    #[test]
    fn test_parser_extracts_port() {
        let parser = OpensshAnnouncement::new();
        assert_eq!(parser.extract(SAMPLE_OUTPUT), Some(43210));
    }

    #[test]
    fn test_parser_ignores_numbers_off_the_marker_line() {
        let parser = OpensshAnnouncement::new();
        let output = "debug1: connecting to port 22222\n";
        assert_eq!(parser.extract(output), None);
    }

    #[test]
    fn test_parser_rejects_short_and_long_numerals() {
        let parser = OpensshAnnouncement::new();
        assert_eq!(parser.extract("Allocated port 80 for remote forward\n"), None);
        assert_eq!(
            parser.extract("Allocated port 123456 for remote forward\n"),
            None
        );
    }

    #[cfg(unix)]
    mod handshake {
        use super::*;

        fn launcher(dir: &TempDir, attempts: u32) -> TunnelLauncher {
            let config = RelayConfig {
                poll_attempts: attempts,
                poll_interval_ms: 50,
                ..RelayConfig::default()
            };
            TunnelLauncher::new(config, dir.path().join("logs"))
        }

        fn script(body: &str) -> Command {
            let mut cmd = Command::new("/bin/sh");
            cmd.arg("-c").arg(body);
            cmd
        }

        #[tokio::test]
        async fn test_establish_success() {
            let dir = TempDir::new().unwrap();
            let launcher = launcher(&dir, 20);

            let cmd = script("echo 'Allocated port 43210 for remote forward to 127.0.0.1:8080'; sleep 2");
            let tunnel = launcher.establish_with(cmd, 8080).await.unwrap();

            assert_eq!(tunnel.remote_port, 43210);
            assert!(tunnel.pid > 0);
        }

        #[tokio::test]
        async fn test_establish_early_exit() {
            let dir = TempDir::new().unwrap();
            let launcher = launcher(&dir, 20);

            let cmd = script("echo 'Connection refused' >&2; exit 255");
            let err = launcher.establish_with(cmd, 8080).await.unwrap_err();

            match err {
                TunnelError::EstablishmentTimeout { output, .. } => {
                    assert!(output.contains("Connection refused"));
                }
                other => panic!("expected EstablishmentTimeout, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_establish_timeout() {
            let dir = TempDir::new().unwrap();
            let launcher = launcher(&dir, 3);

            let cmd = script("sleep 30");
            let err = launcher.establish_with(cmd, 8080).await.unwrap_err();
            assert!(matches!(err, TunnelError::EstablishmentTimeout { .. }));
        }

        #[tokio::test]
        async fn test_establish_rejects_privileged_announcement() {
            let dir = TempDir::new().unwrap();
            let launcher = launcher(&dir, 20);

            let cmd = script("echo 'Allocated port 1000 for remote forward'; sleep 2");
            let err = launcher.establish_with(cmd, 8080).await.unwrap_err();
            assert!(matches!(err, TunnelError::PortExtractionFailed));
        }

        #[tokio::test]
        async fn test_establish_unparseable_announcement() {
            let dir = TempDir::new().unwrap();
            let launcher = launcher(&dir, 20);

            let cmd = script("echo 'Allocated port ??? for remote forward'; sleep 2");
            let err = launcher.establish_with(cmd, 8080).await.unwrap_err();
            assert!(matches!(err, TunnelError::PortExtractionFailed));
        }

        #[tokio::test]
        async fn test_capture_log_is_kept() {
            let dir = TempDir::new().unwrap();
            let launcher = launcher(&dir, 20);

            let cmd = script("echo 'Allocated port 43210 for remote forward'; sleep 2");
            launcher.establish_with(cmd, 9090).await.unwrap();

            let log = std::fs::read_to_string(launcher.log_path(9090)).unwrap();
            assert!(log.contains("Allocated port"));
        }
    }
}
