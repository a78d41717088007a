//! Shared runtime plumbing for the pipeline: environment-driven
//! configuration, a crate-wide application error, and tracing setup.
//! Every other crate in the workspace depends on this one for those three
//! things rather than rolling its own.

pub mod config;
pub mod errors;
pub mod telemetry;

pub use config::Config;
pub use errors::{AppError, AppResult};
pub use telemetry::init_tracing;
