//! relgate runner
//!
//! The process-facing half of relgate:
//! - command-backed family producers (triplet runner, two-step compression)
//! - single-producer pid guard
//! - attempt watchdog with liveness heartbeats and dependency restarts
//! - the release-check flow tying validation, matrix and selection together

pub mod command;
pub mod dependency;
pub mod guard;
pub mod liveness;
pub mod producer;
pub mod release_check;
pub mod watchdog;

pub use command::{run_step, CommandLine, TIMEOUT_EXIT_CODE};
pub use dependency::{DependencyManager, HttpDependency};
pub use guard::{process_alive, ProducerLock, PRODUCER_LOCK_FILE};
pub use liveness::{Heartbeat, LivenessProbe, ProcLiveness};
pub use producer::{split_dir_for, CommandProducer, ProducerConfig, COMPRESSION_FAMILY};
pub use release_check::{
    run_release_check, HoldoutSource, NextHoldout, ReleaseCheckConfig, ReleaseCheckOutcome,
};
pub use watchdog::{
    AttemptPhase, AttemptRecord, AttemptStatus, CycleResult, Watchdog, WatchdogPolicy,
    WatchdogSummary, WATCHDOG_SUMMARY_FILE,
};
