// Daemon module for supervising the sync daemon process
//
// This module spawns the daemon binary as a child process, tracks its
// running state and kills it on shutdown.

pub mod supervisor;

pub use supervisor::{ProcessSpawnedCallback, ProcessState, ProcessSupervisor, DAEMON_ARGS};
