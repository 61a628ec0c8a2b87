use crate::discover::StdlibFilter;
use crate::model::{CandidateSet, Channel, Origin};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Input not found: {0}")]
    NotFound(PathBuf),
}

/// Candidates produced by one discovery source.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub origin: Origin,
    /// Names whose channel the source declares itself (manifest blocks).
    pub declared: BTreeMap<Channel, CandidateSet>,
    /// Names that still have to be classified against the installed registries.
    pub unclassified: CandidateSet,
}

impl Discovery {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            declared: BTreeMap::new(),
            unclassified: CandidateSet::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.unclassified.len() + self.declared.values().map(CandidateSet::len).sum::<usize>()
    }
}

pub trait CandidateSource: Send + Sync {
    /// Short identifier used in logs (e.g. "imports", "manifest").
    fn source_id(&self) -> &str;

    /// Reads the source and returns its candidates with standard-library names removed.
    fn discover(&self, stdlib: &StdlibFilter) -> Result<Discovery, DiscoveryError>;
}
