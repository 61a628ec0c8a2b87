pub mod config;
pub mod discover;
pub mod executor;
pub mod harvest;
pub mod http;
pub mod model;
pub mod rate_limit;
pub mod traits;

// Re-export common types for convenience
pub use config::{ConfigError, Credential, HealthConfig};
pub use executor::*;
pub use harvest::{HealthPipeline, PipelineError, RunOutcome, RunStats};
pub use model::*;
pub use traits::*;
