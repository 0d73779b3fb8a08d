//! Service Module
//!
//! Business logic layer of the server. The orchestrator runs jobs; the run,
//! artifact and job services are what the HTTP handlers call.

pub mod artifact;
pub mod error;
pub mod grounding;
pub mod job;
pub mod orchestrator;
pub mod planning;
pub mod prompt;
pub mod reconcile;
pub mod run;
pub mod scoring;

#[cfg(test)]
pub mod testing;

// Re-export for convenience
pub use artifact as artifact_service;
pub use error::ServiceError;
pub use job as job_service;
pub use orchestrator::{Orchestrator, Settings};
pub use run as run_service;
