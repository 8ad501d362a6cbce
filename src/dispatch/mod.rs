//! Bounded-parallelism task dispatch.
//!
//! Everything asynchronous in an ingestion run is routed through a single
//! [`TaskDispatcher`]; the importer uses its [`Barrier`] to separate phases.

pub mod dispatcher;
pub mod tracker;

pub use dispatcher::{DispatchContext, Priority, TaskDispatcher, TaskHandle, PRIORITY_LEVELS};
pub use tracker::{Barrier, CompletionTracker};
