//! In-process read projection
//!
//! The consumer-facing half of the engine: a single-task materialized view
//! ([`ViewProjection`]) addressed through clonable [`ViewHandle`]s, plus the
//! refetch step ([`ViewProjector`]) that turns consumed history into view
//! batches. Observers subscribe through the handle and receive one ordered
//! [`ViewDiff`] per visible change.

mod errors;
mod projector;
mod view;

pub use errors::{ProjectionError, ProjectionResult};
pub use projector::ViewProjector;
pub use view::{DiffReceiver, ViewDiff, ViewHandle, ViewProjection};
