//! Change notification
//!
//! Two complementary paths tell the merge loop that the store may have
//! changed: in-process writers signal the [`ChangeHub`] after each commit,
//! and a [`FallbackPoller`] stats the history log to catch writers in
//! other processes. Both paths are contentless wakeups; the log is the
//! only source of truth for what actually changed.

mod hub;
mod poller;

pub use hub::{ChangeHub, ChangeListener};
pub use poller::FallbackPoller;
