//! Liveness heartbeats for opaque subprocesses.
//!
//! A supervised attempt is considered alive while either its log output or
//! the CPU time of its process tree keeps growing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One sample of the two liveness signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub log_bytes: u64,
    /// utime + stime + cutime + cstime, in clock ticks, over the process tree.
    pub cpu_ticks: u64,
}

impl Heartbeat {
    /// True when either signal grew past `previous`.
    pub fn progressed(&self, previous: &Heartbeat) -> bool {
        self.log_bytes > previous.log_bytes || self.cpu_ticks > previous.cpu_ticks
    }

    /// Component-wise maximum, so the tracked signals never decrease.
    pub fn max(self, other: Heartbeat) -> Heartbeat {
        Heartbeat {
            log_bytes: self.log_bytes.max(other.log_bytes),
            cpu_ticks: self.cpu_ticks.max(other.cpu_ticks),
        }
    }
}

pub trait LivenessProbe: Send + Sync {
    fn sample(&self, pid: Option<u32>, logs: &[PathBuf]) -> Heartbeat;
}

/// Probe backed by file sizes and `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcLiveness;

impl LivenessProbe for ProcLiveness {
    fn sample(&self, pid: Option<u32>, logs: &[PathBuf]) -> Heartbeat {
        Heartbeat {
            log_bytes: logs
                .iter()
                .filter_map(|p| std::fs::metadata(p).ok())
                .map(|m| m.len())
                .sum(),
            cpu_ticks: pid.map(tree_cpu_ticks).unwrap_or(0),
        }
    }
}

/// `(ppid, cpu_ticks)` from the contents of a `/proc/<pid>/stat` file.
pub fn parse_stat(raw: &str) -> Option<(u32, u64)> {
    // comm may contain spaces and parens; fields resume after the last ')'
    let rest = &raw[raw.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let ppid = fields.get(1)?.parse().ok()?;
    let ticks = fields
        .get(11..15)?
        .iter()
        .map(|f| f.parse::<u64>().ok())
        .sum::<Option<u64>>()?;
    Some((ppid, ticks))
}

fn read_stat(pid: u32) -> Option<(u32, u64)> {
    parse_stat(&std::fs::read_to_string(Path::new("/proc").join(pid.to_string()).join("stat")).ok()?)
}

/// CPU ticks of `root` plus all live descendants.
fn tree_cpu_ticks(root: u32) -> u64 {
    let mut stats: HashMap<u32, (u32, u64)> = HashMap::new();
    if let Ok(entries) = std::fs::read_dir("/proc") {
        for entry in entries.flatten() {
            if let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) {
                if let Some(stat) = read_stat(pid) {
                    stats.insert(pid, stat);
                }
            }
        }
    }
    if stats.is_empty() {
        return read_stat(root).map(|(_, t)| t).unwrap_or(0);
    }

    let mut total = 0;
    let mut frontier = vec![root];
    while let Some(pid) = frontier.pop() {
        if let Some((_, ticks)) = stats.get(&pid) {
            total += ticks;
        }
        frontier.extend(
            stats
                .iter()
                .filter(|(_, (ppid, _))| *ppid == pid)
                .map(|(child, _)| *child),
        );
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stat_handles_odd_comm() {
        let raw = "4242 (we ird) name) S 17 4242 4242 0 -1 4194560 100 0 0 0 7 3 2 1 20 0 1 0 100 0 0";
        assert_eq!(parse_stat(raw), Some((17, 13)));
        assert_eq!(parse_stat("garbage"), None);
    }

    #[test]
    fn progress_is_any_signal_growth() {
        let a = Heartbeat { log_bytes: 10, cpu_ticks: 5 };
        assert!(Heartbeat { log_bytes: 11, cpu_ticks: 5 }.progressed(&a));
        assert!(Heartbeat { log_bytes: 10, cpu_ticks: 6 }.progressed(&a));
        assert!(!Heartbeat { log_bytes: 9, cpu_ticks: 5 }.progressed(&a));
        assert_eq!(a.max(Heartbeat { log_bytes: 3, cpu_ticks: 9 }), Heartbeat { log_bytes: 10, cpu_ticks: 9 });
    }

    #[test]
    fn proc_probe_counts_log_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("a.log");
        std::fs::write(&log, b"12345").expect("write");
        let hb = ProcLiveness.sample(None, &[log, dir.path().join("absent.log")]);
        assert_eq!(hb.log_bytes, 5);
        assert_eq!(hb.cpu_ticks, 0);
    }

    #[test]
    fn own_process_has_readable_stat() {
        assert!(read_stat(std::process::id()).is_some());
    }
}
