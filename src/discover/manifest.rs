//! Conda environment manifest parsing.
//!
//! The manifest is read line by line rather than as YAML: only the
//! `dependencies:` list and its nested `- pip:` list matter, and malformed
//! entries must be skipped individually instead of failing the whole file.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::discover::StdlibFilter;
use crate::model::{CandidateSet, Channel, Origin, PackageName};
use crate::traits::{CandidateSource, Discovery, DiscoveryError};

const DEPENDENCIES_MARKER: &str = "dependencies:";
const SECONDARY_MARKER: &str = "pip:";

/// Candidates split by the channel that declares them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestCandidates {
    pub primary: CandidateSet,
    pub secondary: CandidateSet,
}

impl ManifestCandidates {
    fn set_mut(&mut self, channel: Channel) -> &mut CandidateSet {
        match channel {
            Channel::Primary => &mut self.primary,
            Channel::Secondary => &mut self.secondary,
        }
    }
}

/// Parses one environment manifest file.
pub struct ManifestParser {
    path: PathBuf,
}

impl ManifestParser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse_file(&self) -> Result<ManifestCandidates, DiscoveryError> {
        if !self.path.is_file() {
            return Err(DiscoveryError::NotFound(self.path.clone()));
        }
        let text = fs::read_to_string(&self.path).map_err(|source| DiscoveryError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Never fails: a manifest without a dependency block yields two empty sets.
    pub fn parse(text: &str) -> ManifestCandidates {
        let mut candidates = ManifestCandidates::default();
        let mut lines = text.lines();

        if !lines
            .by_ref()
            .any(|line| line.trim_start().starts_with(DEPENDENCIES_MARKER))
        {
            warn!("manifest has no dependency block");
            return candidates;
        }

        let mut channel = Channel::Primary;
        // Indentation of the `- pip:` item while inside its nested list
        let mut secondary_indent: Option<usize> = None;
        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some(item) = trimmed.strip_prefix('-') else {
                if is_block_level(line) {
                    break;
                }
                warn!(line = trimmed, "skipping manifest line without list marker");
                continue;
            };

            let indent = line.len() - line.trim_start().len();
            if secondary_indent.is_some_and(|marker| indent <= marker) {
                channel = Channel::Primary;
                secondary_indent = None;
            }

            let item = item.trim();
            if item == SECONDARY_MARKER {
                channel = Channel::Secondary;
                secondary_indent = Some(indent);
                continue;
            }

            match parse_entry(item) {
                Some(name) => {
                    candidates.set_mut(channel).insert(name);
                }
                None => debug!(entry = item, channel = %channel, "skipping manifest entry"),
            }
        }

        candidates
    }
}

/// A line that opens a new block: ends with a colon, or is an unindented key.
fn is_block_level(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.ends_with(':') || (!line.starts_with(char::is_whitespace) && trimmed.contains(':'))
}

/// Extracts the package name from a list item body such as `numpy=1.21`,
/// `requests>=2` or `conda-forge::pandas`.
fn parse_entry(item: &str) -> Option<PackageName> {
    if item.contains("://") || item.starts_with('-') {
        return None;
    }

    let item = item.rsplit_once("::").map_or(item, |(_, name)| name);
    let name = item
        .split(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ';') || c.is_whitespace())
        .next()
        .unwrap_or_default();
    PackageName::new(name)
}

impl CandidateSource for ManifestParser {
    fn source_id(&self) -> &str {
        "manifest"
    }

    fn discover(&self, stdlib: &StdlibFilter) -> Result<Discovery, DiscoveryError> {
        let mut parsed = self.parse_file()?;
        parsed.primary.retain(|name| !stdlib.contains(name.as_str()));
        parsed.secondary.retain(|name| !stdlib.contains(name.as_str()));

        info!(
            path = %self.path.display(),
            primary = parsed.primary.len(),
            secondary = parsed.secondary.len(),
            "Parsed environment manifest"
        );

        let mut discovery = Discovery::new(Origin::Manifest);
        discovery.declared.insert(Channel::Primary, parsed.primary);
        discovery.declared.insert(Channel::Secondary, parsed.secondary);
        Ok(discovery)
    }
}
