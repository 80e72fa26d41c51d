//! Tunnel lifecycle operations
//!
//! add, stop, list, reset, and cleanup. Each is a single read-modify-write
//! transaction against the registry, serialized across invocations by the
//! registry lock. A failed lock acquisition aborts the whole operation with
//! no partial effect.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::TunnelError;
use crate::launcher::Launch;
use crate::lock::RegistryLock;
use crate::process::{self, ProcessControl};
use crate::registry::{RegistryStore, TunnelRecord};

/// Target of a stop operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTarget {
    /// Stop the tunnel for one local port
    Port(u16),
    /// Stop every registered tunnel
    All,
}

/// What happened to one record during stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    pub record: TunnelRecord,
    /// Whether the owning process accepted the signal; false means it was
    /// already gone and only the registry entry was dropped
    pub signaled: bool,
}

/// Lifecycle operations over the tunnel registry
pub struct TunnelManager<S, P> {
    store: S,
    processes: P,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl<S: RegistryStore, P: ProcessControl> TunnelManager<S, P> {
    pub fn new(
        store: S,
        processes: P,
        lock_path: impl Into<PathBuf>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            processes,
            lock_path: lock_path.into(),
            lock_timeout,
        }
    }

    /// Parse and validate a user-supplied port argument
    pub fn parse_port(arg: &str) -> Result<u16, TunnelError> {
        match arg.trim().parse::<u16>() {
            Ok(port) if port >= 1 => Ok(port),
            _ => Err(TunnelError::InvalidPort(arg.to_string())),
        }
    }

    async fn lock(&self) -> Result<RegistryLock, TunnelError> {
        RegistryLock::acquire(&self.lock_path, self.lock_timeout).await
    }

    /// Establish a tunnel for `port_arg` and record it.
    ///
    /// The duplicate check and the final append each run under the lock;
    /// the handshake between them does not, so other registry operations
    /// are never blocked behind a multi-second ssh connect. Two racing
    /// adds for the same port can both pass the check (see DESIGN.md).
    pub async fn add(
        &self,
        port_arg: &str,
        launcher: &dyn Launch,
    ) -> Result<TunnelRecord, TunnelError> {
        let local_port = Self::parse_port(port_arg)?;

        {
            let _lock = self.lock().await?;
            let records = self.store.read_all()?;
            if let Some(existing) = records
                .iter()
                .find(|r| r.local_port == local_port && self.processes.is_alive(r.owner_pid))
            {
                return Err(TunnelError::AlreadyExists {
                    port: local_port,
                    pid: existing.owner_pid,
                });
            }
        }

        let established = launcher.establish(local_port).await?;

        let record = TunnelRecord {
            local_port,
            remote_port: established.remote_port,
            owner_pid: established.pid,
        };

        let _lock = self.lock().await?;
        let mut records = self.store.read_all()?;
        records.push(record);
        self.store.write_all(&records)?;

        tracing::info!("registered tunnel {}", record);
        Ok(record)
    }

    /// Stop matching tunnels and drop their records.
    ///
    /// Matching records are dropped regardless of whether the signal
    /// landed; non-matching records are retained unchanged. A specific
    /// target matching nothing is `NotFound` and leaves the registry
    /// untouched.
    pub async fn stop(&self, target: StopTarget) -> Result<Vec<StopOutcome>, TunnelError> {
        let _lock = self.lock().await?;
        let records = self.store.read_all()?;

        let mut outcomes = Vec::new();
        let mut retained = Vec::new();
        for record in records {
            let matches = match target {
                StopTarget::All => true,
                StopTarget::Port(port) => record.local_port == port,
            };
            if !matches {
                retained.push(record);
                continue;
            }

            let signaled = match self.processes.terminate(record.owner_pid) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!("tunnel pid {} already gone: {}", record.owner_pid, e);
                    false
                }
            };
            outcomes.push(StopOutcome { record, signaled });
        }

        if let StopTarget::Port(port) = target {
            if outcomes.is_empty() {
                return Err(TunnelError::NotFound(port));
            }
        }

        self.store.write_all(&retained)?;
        Ok(outcomes)
    }

    /// Stop every registered tunnel; the registry ends up empty no matter
    /// how many signals landed. Returns the count that did.
    pub async fn stop_all(&self) -> Result<usize, TunnelError> {
        let outcomes = self.stop(StopTarget::All).await?;
        Ok(outcomes.iter().filter(|o| o.signaled).count())
    }

    /// List tunnels whose owning process is alive.
    ///
    /// A non-empty registry with zero live owners is wholly stale and is
    /// cleared as a side effect; partially-stale registries are left for
    /// cleanup to reconcile.
    pub async fn list(&self) -> Result<Vec<TunnelRecord>, TunnelError> {
        let _lock = self.lock().await?;
        let records = self.store.read_all()?;

        let live: Vec<TunnelRecord> = records
            .iter()
            .copied()
            .filter(|r| self.processes.is_alive(r.owner_pid))
            .collect();

        if !records.is_empty() && live.is_empty() {
            self.store.write_all(&[])?;
            tracing::info!("cleared {} stale registry entries", records.len());
        }

        Ok(live)
    }

    /// Kill every registered tunnel, empty the registry, then sweep
    /// untracked subprocesses matching `sweep_pattern`.
    ///
    /// Confirmation is the caller's responsibility; `confirmed == false`
    /// does nothing and returns `None`. Otherwise returns the number of
    /// registered tunnels that were killed.
    pub async fn reset(
        &self,
        confirmed: bool,
        sweep_pattern: &str,
    ) -> Result<Option<usize>, TunnelError> {
        if !confirmed {
            return Ok(None);
        }

        let killed;
        {
            let _lock = self.lock().await?;
            let records = self.store.read_all()?;
            for record in &records {
                if let Err(e) = self.processes.kill(record.owner_pid) {
                    tracing::debug!("tunnel pid {} already gone: {}", record.owner_pid, e);
                }
            }
            killed = records.len();
            self.store.write_all(&[])?;
        }

        if process::sweep_orphans(sweep_pattern).await {
            tracing::info!("swept orphaned tunnel subprocesses");
        }

        Ok(Some(killed))
    }

    /// Drop records whose owning process has exited, keeping live records
    /// in order. Returns the number of records removed.
    ///
    /// Also removes the lock file itself afterwards so the next acquire
    /// starts clean; this assumes no other invocation is mid-operation.
    pub async fn cleanup(&self) -> Result<usize, TunnelError> {
        let removed;
        {
            let _lock = self.lock().await?;
            let records = self.store.read_all()?;

            let live: Vec<TunnelRecord> = records
                .iter()
                .copied()
                .filter(|r| self.processes.is_alive(r.owner_pid))
                .collect();
            removed = records.len() - live.len();
            self.store.write_all(&live)?;
        }

        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("could not remove lock file {:?}: {}", self.lock_path, e),
        }

        Ok(removed)
    }
}
