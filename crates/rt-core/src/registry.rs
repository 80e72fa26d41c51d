//! Persisted tunnel registry
//!
//! The registry is a line-oriented file, one tunnel per line in the form
//! `local_port:remote_port:owner_pid`. It records which tunnels this tool
//! believes are active; the authoritative state is the owning subprocess,
//! which lifecycle operations reconcile via liveness checks.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use crate::error::MalformedRecord;

/// A single registered tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelRecord {
    /// Local port being forwarded to
    pub local_port: u16,
    /// Port the relay server allocated for the reverse forward
    pub remote_port: u16,
    /// PID of the ssh subprocess owning the tunnel
    pub owner_pid: u32,
}

impl fmt::Display for TunnelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.local_port, self.remote_port, self.owner_pid)
    }
}

impl FromStr for TunnelRecord {
    type Err = MalformedRecord;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(':');
        let (local, remote, pid) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(l), Some(r), Some(p), None) => (l, r, p),
            _ => return Err(MalformedRecord(s.to_string())),
        };

        let parse = |field: &str| field.trim().parse().map_err(|_| MalformedRecord(s.to_string()));
        Ok(Self {
            local_port: parse(local)?,
            remote_port: parse(remote)?,
            owner_pid: pid
                .trim()
                .parse()
                .map_err(|_| MalformedRecord(s.to_string()))?,
        })
    }
}

/// Storage backing the tunnel registry.
///
/// Callers hold the registry lock around every read-modify-write; the
/// store itself performs no locking.
pub trait RegistryStore {
    /// Read every well-formed record, in file order
    fn read_all(&self) -> io::Result<Vec<TunnelRecord>>;

    /// Atomically replace the full registry content
    fn write_all(&self, records: &[TunnelRecord]) -> io::Result<()>;
}

/// File-backed registry store
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    /// Create a store over the registry file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistryStore for FileRegistry {
    /// Read the registry, treating a missing file as empty.
    ///
    /// Malformed lines are skipped with a warning; the valid remainder
    /// is always surfaced.
    fn read_all(&self) -> io::Result<Vec<TunnelRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut records = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<TunnelRecord>() {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping {} in {:?}", e, self.path),
            }
        }
        Ok(records)
    }

    /// Replace the registry via a sibling temp file and rename, so a crash
    /// mid-write never leaves a truncated registry behind.
    fn write_all(&self, records: &[TunnelRecord]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut content = String::new();
        for record in records {
            content.push_str(&record.to_string());
            content.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory registry store for tests and embedders
#[derive(Default)]
pub struct MemoryRegistry {
    records: Mutex<Vec<TunnelRecord>>,
}

impl MemoryRegistry {
    /// Create an empty in-memory registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with `records`
    pub fn with_records(records: Vec<TunnelRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

impl RegistryStore for MemoryRegistry {
    fn read_all(&self) -> io::Result<Vec<TunnelRecord>> {
        Ok(self.records.lock().expect("registry mutex poisoned").clone())
    }

    fn write_all(&self, records: &[TunnelRecord]) -> io::Result<()> {
        *self.records.lock().expect("registry mutex poisoned") = records.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(local: u16, remote: u16, pid: u32) -> TunnelRecord {
        TunnelRecord {
            local_port: local,
            remote_port: remote,
            owner_pid: pid,
        }
    }

    #[test]
    fn test_record_display_and_parse() {
        let r = record(8080, 43210, 12345);
        assert_eq!(r.to_string(), "8080:43210:12345");
        assert_eq!("8080:43210:12345".parse::<TunnelRecord>().unwrap(), r);
    }

    #[test]
    fn test_record_parse_rejects_wrong_field_count() {
        assert!("8080:43210".parse::<TunnelRecord>().is_err());
        assert!("8080:43210:1:extra".parse::<TunnelRecord>().is_err());
        assert!("".parse::<TunnelRecord>().is_err());
    }

    #[test]
    fn test_record_parse_rejects_non_numeric() {
        assert!("eight:43210:1".parse::<TunnelRecord>().is_err());
        assert!("8080:none:1".parse::<TunnelRecord>().is_err());
        assert!("8080:43210:pid".parse::<TunnelRecord>().is_err());
    }

    #[test]
    fn test_record_parse_rejects_out_of_range_port() {
        assert!("70000:43210:1".parse::<TunnelRecord>().is_err());
        assert!("8080:99999:1".parse::<TunnelRecord>().is_err());
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileRegistry::new(dir.path().join("tunnels"));
        assert_eq!(store.read_all().unwrap(), Vec::new());
    }

    #[test]
    fn test_write_and_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileRegistry::new(dir.path().join("tunnels"));

        let records = vec![record(8080, 43210, 100), record(3000, 50000, 200)];
        store.write_all(&records).unwrap();
        assert_eq!(store.read_all().unwrap(), records);
    }

    #[test]
    fn test_roundtrip_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tunnels");
        let store = FileRegistry::new(&path);

        store
            .write_all(&[record(8080, 43210, 100), record(22, 1024, 1)])
            .unwrap();
        let first = fs::read_to_string(&path).unwrap();

        let reread = store.read_all().unwrap();
        store.write_all(&reread).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tunnels");
        fs::write(
            &path,
            "8080:43210:100\nnot a record\n3000:50000\n\n9090:2048:300\n",
        )
        .unwrap();

        let store = FileRegistry::new(&path);
        assert_eq!(
            store.read_all().unwrap(),
            vec![record(8080, 43210, 100), record(9090, 2048, 300)]
        );
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let store = FileRegistry::new(dir.path().join("nested").join("tunnels"));
        store.write_all(&[record(1, 1024, 1)]).unwrap();
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_write_replaces_previous_content() {
        let dir = TempDir::new().unwrap();
        let store = FileRegistry::new(dir.path().join("tunnels"));

        store
            .write_all(&[record(8080, 43210, 100), record(3000, 50000, 200)])
            .unwrap();
        store.write_all(&[record(3000, 50000, 200)]).unwrap();

        assert_eq!(store.read_all().unwrap(), vec![record(3000, 50000, 200)]);
    }

    #[test]
    fn test_memory_registry_roundtrip() {
        let store = MemoryRegistry::new();
        let records = vec![record(8080, 43210, 100)];
        store.write_all(&records).unwrap();
        assert_eq!(store.read_all().unwrap(), records);
    }
}
