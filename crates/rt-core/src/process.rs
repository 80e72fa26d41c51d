//! Process liveness and termination primitives
//!
//! Tunnel subprocesses outlive the invocation that spawned them, so the
//! registry can only be reconciled against what the OS reports. This module
//! wraps the liveness/signal syscalls behind a small capability trait so
//! lifecycle operations can be tested with deterministic fakes.

use std::io;

/// Liveness and termination capability over OS processes
pub trait ProcessControl {
    /// Check whether a process with the given PID is still alive
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the process to terminate (SIGTERM on unix)
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Forcibly kill the process (SIGKILL on unix)
    fn kill(&self, pid: u32) -> io::Result<()>;
}

/// `ProcessControl` backed by the host OS
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
impl ProcessControl for SystemProcesses {
    /// On Unix, uses kill(pid, 0) to check if the process exists.
    fn is_alive(&self, pid: u32) -> bool {
        // kill(pid, 0) returns 0 if the process exists and we have permission
        // to signal it; EPERM means it exists but belongs to someone else.
        unsafe {
            let result = libc::kill(pid as libc::pid_t, 0);
            if result == 0 {
                return true;
            }
            let err = io::Error::last_os_error();
            err.raw_os_error() == Some(libc::EPERM)
        }
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        send_signal(pid, libc::SIGTERM)
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        send_signal(pid, libc::SIGKILL)
    }
}

#[cfg(windows)]
impl ProcessControl for SystemProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        use std::ptr;
        use windows_sys::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
        use windows_sys::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle == INVALID_HANDLE_VALUE || handle == ptr::null_mut() {
                return false;
            }
            CloseHandle(handle);
            true
        }
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        terminate_process(pid)
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        terminate_process(pid)
    }
}

#[cfg(windows)]
fn terminate_process(pid: u32) -> io::Result<()> {
    use std::ptr;
    use windows_sys::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle == INVALID_HANDLE_VALUE || handle == ptr::null_mut() {
            return Err(io::Error::last_os_error());
        }
        let result = TerminateProcess(handle, 1);
        CloseHandle(handle);
        if result == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Best-effort sweep of untracked tunnel subprocesses matching `pattern`.
///
/// Used by reset to catch ssh children that were started by this tool but
/// are no longer in the registry. Returns true if anything was signaled.
#[cfg(unix)]
pub async fn sweep_orphans(pattern: &str) -> bool {
    match tokio::process::Command::new("pkill")
        .arg("-f")
        .arg(pattern)
        .status()
        .await
    {
        // pkill exits 0 when at least one process matched
        Ok(status) => status.success(),
        Err(e) => {
            tracing::debug!("orphan sweep unavailable: {}", e);
            false
        }
    }
}

#[cfg(not(unix))]
pub async fn sweep_orphans(_pattern: &str) -> bool {
    tracing::debug!("orphan sweep is not supported on this platform");
    false
}

/// Scripted `ProcessControl` for tests.
///
/// Starts with a set of "alive" PIDs; terminate/kill succeed only for
/// alive PIDs (removing them) and every delivered signal is recorded.
#[derive(Debug, Default)]
pub struct FakeProcesses {
    alive: std::sync::Mutex<std::collections::HashSet<u32>>,
    terminated: std::sync::Mutex<Vec<u32>>,
    killed: std::sync::Mutex<Vec<u32>>,
}

impl FakeProcesses {
    /// Create a fake with the given PIDs alive
    pub fn with_alive(pids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            alive: std::sync::Mutex::new(pids.into_iter().collect()),
            ..Default::default()
        }
    }

    /// PIDs that received terminate, in order
    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().expect("fake mutex poisoned").clone()
    }

    /// PIDs that received kill, in order
    pub fn killed(&self) -> Vec<u32> {
        self.killed.lock().expect("fake mutex poisoned").clone()
    }
}

impl ProcessControl for FakeProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().expect("fake mutex poisoned").contains(&pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        if self.alive.lock().expect("fake mutex poisoned").remove(&pid) {
            self.terminated.lock().expect("fake mutex poisoned").push(pid);
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such process"))
        }
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        if self.alive.lock().expect("fake mutex poisoned").remove(&pid) {
            self.killed.lock().expect("fake mutex poisoned").push(pid);
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such process"))
        }
    }
}
