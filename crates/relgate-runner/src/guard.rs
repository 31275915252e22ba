//! Single-producer guard.
//!
//! All producers share one inference backend, so at most one producer
//! process may run at a time. A pid lock file is taken before launch; a
//! lock held by a live process refuses the launch with
//! [`RelgateError::ProducerBusy`], a lock left by a dead process is reclaimed.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use relgate_core::{RelgateError, Result};

/// Default lock file name inside the state directory.
pub const PRODUCER_LOCK_FILE: &str = "producer.lock";

/// Whether `pid` names a running process. Zombies count as gone.
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(Path::new("/proc").join(pid.to_string()).join("stat")) {
        Ok(stat) => !matches!(
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next()),
            Some("Z") | Some("X")
        ),
        Err(_) => false,
    }
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct ProducerLock {
    path: PathBuf,
}

impl ProducerLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let own = std::process::id();

        // One retry after reclaiming a stale lock.
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{own}")?;
                    debug!(path = %path.display(), pid = own, "producer lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = read_pid(&path);
                    match holder {
                        Some(pid) if pid != own && process_alive(pid) => {
                            return Err(RelgateError::ProducerBusy { pid });
                        }
                        _ => {
                            warn!(path = %path.display(), holder = ?holder, "reclaiming stale producer lock");
                            match std::fs::remove_file(&path) {
                                Ok(()) => {}
                                Err(e) if e.kind() == ErrorKind::NotFound => {}
                                Err(e) => return Err(e.into()),
                            }
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RelgateError::ProducerBusy {
            pid: read_pid(&path).unwrap_or_default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProducerLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to release producer lock");
            }
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("producer.lock");
        {
            let lock = ProducerLock::acquire(&path).expect("acquire");
            assert!(lock.path().exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn live_holder_refuses_launch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("producer.lock");
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        std::fs::write(&path, format!("{}\n", child.id())).expect("write lock");

        let err = ProducerLock::acquire(&path).expect_err("busy");
        assert!(matches!(err, RelgateError::ProducerBusy { pid } if pid == child.id()));

        child.kill().expect("kill");
        child.wait().expect("reap");
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("producer.lock");
        let mut child = std::process::Command::new("true").spawn().expect("spawn");
        let dead = child.id();
        child.wait().expect("reap");
        std::fs::write(&path, format!("{dead}\n")).expect("write lock");

        let lock = ProducerLock::acquire(&path).expect("reclaim");
        let pid = read_pid(lock.path()).expect("pid");
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn garbage_lock_is_reclaimed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("producer.lock");
        std::fs::write(&path, "not a pid").expect("write");
        assert!(ProducerLock::acquire(&path).is_ok());
    }
}
