//! End-to-end health run.
//!
//! [`HealthPipeline`] drives one run through its stages:
//! 1. **CollectCandidates**: scan sources and manifests
//! 2. **Classify**: assign every candidate a channel
//! 3. **Enrich**: query the external sources, bounded by [`EnrichmentExecutor`]
//! 4. **Assemble**: build one [`PackageReport`] per (channel, package)
//! 5. **Persist**: overwrite the output document
//!
//! Failed lookups never abort a run; only writing the output can fail it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Credential, HealthConfig};
use crate::discover::{
    Classifier, ImportMatching, ImportScanner, InstalledRegistry, ManifestParser, StdlibFilter,
};
use crate::executor::EnrichmentExecutor;
use crate::harvest::sources::Enrichers;
use crate::harvest::traits::SourceEnricher;
use crate::model::{
    Channel, ForgeRecord, HealthDocument, HostingRecord, IndexRecord, Origin, PackageName,
    PackageReport, QnaRecord,
};
use crate::traits::{CandidateSource, Discovery};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Stages of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CollectCandidates,
    Classify,
    Enrich,
    Assemble,
    Persist,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CollectCandidates => "collect_candidates",
            Stage::Classify => "classify",
            Stage::Enrich => "enrich",
            Stage::Assemble => "assemble",
            Stage::Persist => "persist",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub document: HealthDocument,
    pub output_path: PathBuf,
    pub stats: RunStats,
}

/// Statistics about one run.
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    /// Total time spent on the run (milliseconds)
    pub total_duration_ms: u64,

    pub collect_duration_ms: u64,

    pub enrich_duration_ms: u64,

    /// Sources that could not be read and were skipped
    pub sources_skipped: usize,

    /// Distinct (channel, package) pairs profiled
    pub packages: usize,

    pub primary_packages: usize,

    pub secondary_packages: usize,

    /// Scanned imports dropped because no channel applied
    pub unclassified_dropped: usize,

    /// Sub-records that ended in `fail`
    pub failed_sub_records: usize,

    /// Packages whose task timed out or panicked
    pub failed_packages: usize,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Channel assignment for one package, with every origin that produced it.
#[derive(Debug, Clone)]
struct PackageJob {
    package: PackageName,
    channel: Channel,
    origins: BTreeSet<Origin>,
}

#[derive(Debug, Default)]
struct Enrichment {
    index_info: Option<IndexRecord>,
    hosting_info: Option<HostingRecord>,
    forge_info: Option<ForgeRecord>,
    qna_info: Option<QnaRecord>,
}

/// Package health run over a set of candidate sources.
///
/// # Example
///
/// ```ignore
/// let config = HealthConfig::default().with_source_dir("input_py");
/// let pipeline = HealthPipeline::from_config(&config, Credential::load(None))?;
/// let outcome = pipeline.execute().await?;
/// println!("{} packages", outcome.stats.packages);
/// ```
pub struct HealthPipeline {
    sources: Vec<Box<dyn CandidateSource>>,
    stdlib: StdlibFilter,
    classifier: Classifier,
    enrichers: Arc<Enrichers>,
    executor: EnrichmentExecutor,
    output_path: PathBuf,
}

impl HealthPipeline {
    /// Creates a pipeline with no sources, the reference standard library
    /// and empty installed registries.
    pub fn new(enrichers: Enrichers, output_path: impl Into<PathBuf>) -> Self {
        Self {
            sources: Vec::new(),
            stdlib: StdlibFilter::python(),
            classifier: Classifier::default(),
            enrichers: Arc::new(enrichers),
            executor: EnrichmentExecutor::new(4),
            output_path: output_path.into(),
        }
    }

    /// Builds the full pipeline described by `config`.
    ///
    /// Installed listings that cannot be read are logged and treated as empty.
    pub fn from_config(config: &HealthConfig, credential: Credential) -> Result<Self, PipelineError> {
        let enrichers = Enrichers::from_config(config, credential)?;

        let matching = if config.strict_imports {
            ImportMatching::Statement
        } else {
            ImportMatching::Substring
        };

        let mut pipeline = Self::new(enrichers, &config.output_path)
            .with_stdlib(StdlibFilter::python().with_extra(&config.extra_stdlib))
            .with_executor(
                EnrichmentExecutor::new(config.concurrency).with_timeout(config.package_timeout()),
            );

        for dir in &config.source_dirs {
            pipeline = pipeline.with_source(ImportScanner::new(dir).with_matching(matching));
        }
        for path in &config.manifest_paths {
            pipeline = pipeline.with_source(ManifestParser::new(path));
        }

        let primary = load_registry(Channel::Primary, config.conda_list_path.as_deref());
        let secondary = load_registry(Channel::Secondary, config.pip_list_path.as_deref());
        let unlisted = if config.skip_unlisted_imports {
            None
        } else {
            Some(Channel::Secondary)
        };

        Ok(pipeline.with_classifier(Classifier::new(primary, secondary).with_unlisted(unlisted)))
    }

    pub fn with_source(mut self, source: impl CandidateSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn with_stdlib(mut self, stdlib: StdlibFilter) -> Self {
        self.stdlib = stdlib;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_executor(mut self, executor: EnrichmentExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Executes every stage and writes the output document.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only when the document cannot be written.
    pub async fn execute(&self) -> Result<RunOutcome, PipelineError> {
        let start = Instant::now();
        let mut stats = RunStats::default();

        // ====================================================================
        // Stage 1: Collect candidates
        // ====================================================================

        enter(Stage::CollectCandidates);
        let collect_start = Instant::now();
        let mut discoveries = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.discover(&self.stdlib) {
                Ok(discovery) => {
                    info!(source = source.source_id(), candidates = discovery.total(), "Source read");
                    discoveries.push(discovery);
                }
                Err(e) => {
                    warn!(source = source.source_id(), error = %e, "Skipping unreadable source");
                    stats.sources_skipped += 1;
                }
            }
        }
        stats.collect_duration_ms = elapsed_ms(collect_start);

        // ====================================================================
        // Stage 2: Classify
        // ====================================================================

        enter(Stage::Classify);
        let jobs = self.classify(discoveries, &mut stats);
        stats.packages = jobs.len();
        info!(
            packages = stats.packages,
            dropped = stats.unclassified_dropped,
            "Classification completed"
        );

        // ====================================================================
        // Stage 3: Enrich
        // ====================================================================

        enter(Stage::Enrich);
        let enrich_start = Instant::now();
        let results = self
            .executor
            .run_all(jobs, |job| {
                let enrichers = Arc::clone(&self.enrichers);
                async move { enrich_package(&enrichers, &job.package, job.channel).await }
            })
            .await;
        stats.enrich_duration_ms = elapsed_ms(enrich_start);

        // ====================================================================
        // Stage 4: Assemble
        // ====================================================================

        enter(Stage::Assemble);
        let mut document = HealthDocument::default();
        for (job, result) in results {
            let mut report = PackageReport::new(job.package, job.channel, job.origins);
            match result {
                Ok(enrichment) => {
                    report.index_info = enrichment.index_info;
                    report.hosting_info = enrichment.hosting_info;
                    report.forge_info = enrichment.forge_info;
                    report.qna_info = enrichment.qna_info;
                }
                Err(e) => {
                    warn!(package = %report.package, channel = %report.channel, error = %e, "Package not profiled");
                    report.error = Some(e.to_string());
                    stats.failed_packages += 1;
                }
            }
            stats.failed_sub_records += report.failed_sub_records();
            document.insert(report);
        }
        stats.primary_packages = document.primary_modules.len();
        stats.secondary_packages = document.secondary_modules.len();

        // ====================================================================
        // Stage 5: Persist
        // ====================================================================

        enter(Stage::Persist);
        self.persist(&document).await?;

        stats.total_duration_ms = elapsed_ms(start);
        enter(Stage::Done);
        info!(
            duration_ms = stats.total_duration_ms,
            conda = stats.primary_packages,
            pip = stats.secondary_packages,
            failed_sub_records = stats.failed_sub_records,
            path = %self.output_path.display(),
            "Run completed"
        );

        Ok(RunOutcome {
            document,
            output_path: self.output_path.clone(),
            stats,
        })
    }

    fn classify(&self, discoveries: Vec<Discovery>, stats: &mut RunStats) -> Vec<PackageJob> {
        let mut assigned: BTreeMap<(Channel, PackageName), BTreeSet<Origin>> = BTreeMap::new();

        for discovery in discoveries {
            for (channel, names) in discovery.declared {
                for name in names {
                    if self.stdlib.contains(name.as_str()) {
                        continue;
                    }
                    assigned
                        .entry((channel, name))
                        .or_default()
                        .insert(discovery.origin);
                }
            }
            for name in discovery.unclassified {
                if self.stdlib.contains(name.as_str()) {
                    continue;
                }
                match self.classifier.classify(&name) {
                    Some(channel) => {
                        assigned
                            .entry((channel, name))
                            .or_default()
                            .insert(discovery.origin);
                    }
                    None => {
                        debug!(package = %name, "Dropping import found in no installed listing");
                        stats.unclassified_dropped += 1;
                    }
                }
            }
        }

        assigned
            .into_iter()
            .map(|((channel, package), origins)| PackageJob {
                package,
                channel,
                origins,
            })
            .collect()
    }

    async fn persist(&self, document: &HealthDocument) -> Result<(), PipelineError> {
        let io_error = |source: std::io::Error| PipelineError::Io {
            path: self.output_path.clone(),
            source,
        };

        if let Some(parent) = self.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(document)?;
        tokio::fs::write(&self.output_path, json)
            .await
            .map_err(io_error)?;
        info!(path = %self.output_path.display(), packages = document.len(), "Report written");
        Ok(())
    }
}

fn enter(stage: Stage) {
    info!(stage = %stage, "Entering stage");
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn load_registry(channel: Channel, path: Option<&Path>) -> InstalledRegistry {
    let Some(path) = path else {
        return InstalledRegistry::empty(channel);
    };
    match InstalledRegistry::from_listing_file(channel, path) {
        Ok(registry) => {
            info!(channel = %channel, packages = registry.len(), "Installed listing loaded");
            registry
        }
        Err(e) => {
            warn!(channel = %channel, error = %e, "Installed listing unavailable; treating as empty");
            InstalledRegistry::empty(channel)
        }
    }
}

/// Queries the sources for one package. The Q&A lookup runs alongside the
/// channel's own source; the hosting lookup follows once a homepage is known.
async fn enrich_package(enrichers: &Enrichers, package: &PackageName, channel: Channel) -> Enrichment {
    let (homepage, mut enrichment) = match channel {
        Channel::Secondary => {
            debug!(package = %package, source = enrichers.index.source_id(), "Enriching package");
            let (lookup, qna) =
                tokio::join!(enrichers.index.enrich(package), enrichers.qna.enrich(package));
            let enrichment = Enrichment {
                index_info: Some(lookup.record),
                qna_info: Some(qna),
                ..Enrichment::default()
            };
            (lookup.homepage, enrichment)
        }
        Channel::Primary => {
            debug!(package = %package, source = enrichers.forge.source_id(), "Enriching package");
            let (lookup, qna) =
                tokio::join!(enrichers.forge.enrich(package), enrichers.qna.enrich(package));
            let enrichment = Enrichment {
                forge_info: Some(lookup.record),
                qna_info: Some(qna),
                ..Enrichment::default()
            };
            (lookup.homepage, enrichment)
        }
    };

    if let Some(homepage) = homepage {
        enrichment.hosting_info = Some(enrichers.hosting.lookup(&homepage).await);
    }
    enrichment
}

// ============================================================================
// Tests
// ============================================================================
