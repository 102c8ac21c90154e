//! Observability for mirrordb
//!
//! The engine absorbs most failures (retry-on-next-signal is safe because
//! replay is idempotent), which makes the log stream the only place those
//! failures are visible. Logging is therefore structured, synchronous, and
//! deterministic: one JSON line per event, stable key ordering, explicit
//! severity.

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};
