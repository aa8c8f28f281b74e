//! I/O helpers for gateloop commands.

pub mod approval;
pub mod checklist;
pub mod config;
pub mod evidence;
pub mod executor;
pub mod files;
pub mod git;
pub mod hashing;
pub mod init;
pub mod iteration_log;
pub mod process;
pub mod prompt;
pub mod resolve;
pub mod run_state;
pub mod signature;
pub mod stuck;
pub mod test_runner;
pub mod timestamp;
