//! mirrordb - a crash-consistent history-replay engine
//!
//! Mirrors a shared on-disk store into an in-process read projection. Writer
//! sessions (including ones in other processes) append record versions and a
//! history log entry per commit; a merge coordinator wakes on change
//! signals, replays the log past its checkpoint by refetching current
//! values, and feeds a single-task view that consumers read and observe.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod history;
pub mod merge;
pub mod notify;
pub mod observability;
pub mod projection;
pub mod store;
