//! Harvest module - metadata enrichment and the end-to-end run.
//!
//! - **Traits**: [`SourceEnricher`] for querying one external source
//! - **Errors**: [`FetchError`], recorded as `fail` markers instead of propagated
//! - **Sources**: package index, hosting platform, forge mirror and Q&A site
//! - **Pipeline**: stage coordinator via [`pipeline::HealthPipeline`]

pub mod pipeline;
pub mod sources;
pub mod traits;

pub use traits::{FetchError, SourceEnricher};

pub use sources::{
    Enrichers, ForgeMirrorEnricher, HostingEnricher, PackageIndexEnricher, QnaEnricher,
};

pub use pipeline::{HealthPipeline, PipelineError, RunOutcome, RunStats, Stage};
