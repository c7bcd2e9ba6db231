//! The Augur pipeline: ingestion, forecast scheduling, resolution tracking and
//! scoring, plus read-only aggregate views and export.
//!
//! Every component is generic over [`augur_core::store::ForecastStore`] and
//! reads what it needs from the store at the start of each cycle; nothing is
//! cached across cycles.

pub mod backoff;
pub mod breaker;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod limiter;
pub mod registry;
pub mod resolve;
pub mod scheduler;
pub mod scoring;
pub mod stats;

pub use error::{Error, Result, ValidationError};
pub use ingest::IngestionCoordinator;
pub use registry::SourceRegistry;
pub use resolve::ResolutionTracker;
pub use scheduler::ForecastScheduler;
