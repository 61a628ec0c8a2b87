use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Host marker a homepage URL must contain to be handed to the hosting enricher.
pub const HOSTING_URL_MARKER: &str = "://github.com/";

/// Normalized package identifier: trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Returns `None` when nothing is left after trimming.
    pub fn new(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deduplicated package names gathered from one origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateSet(BTreeSet<PackageName>);

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the name was not already present.
    pub fn insert(&mut self, name: PackageName) -> bool {
        self.0.insert(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        PackageName::new(name).is_some_and(|n| self.0.contains(&n))
    }

    pub fn extend(&mut self, other: CandidateSet) {
        self.0.extend(other.0);
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&PackageName) -> bool,
    {
        self.0.retain(keep);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageName> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PackageName> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = PackageName>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for CandidateSet {
    type Item = PackageName;
    type IntoIter = std::collections::btree_set::IntoIter<PackageName>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Installation channel a package is declared or installed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Conda channel: profiled through the forge mirror.
    #[serde(rename = "conda")]
    Primary,
    /// Pip channel: profiled through the package index.
    #[serde(rename = "pip")]
    Secondary,
}

impl Channel {
    pub fn label(self) -> &'static str {
        match self {
            Channel::Primary => "conda",
            Channel::Secondary => "pip",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    SourceScan,
    Manifest,
}

/// Owner/repo pair parsed from a hosting-platform homepage URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomepageReference {
    pub url: String,
    pub owner: String,
    pub repo: String,
}

impl HomepageReference {
    /// Parses `scheme://github.com/{owner}/{repo}[/...]`.
    ///
    /// Returns `None` for URLs on other hosts or without both path segments.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        let (_, path) = url.split_once(HOSTING_URL_MARKER)?;
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let repo = segments.next()?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if repo.is_empty() {
            return None;
        }

        Some(Self {
            url: url.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

// ============================================================================
// Enrichment records
// ============================================================================

/// Cause of a failed sub-call, kept so every `fail` marker is attributable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub error: String,
}

/// Package-index metadata for one package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub api_url: String,
    pub summary: Option<String>,
    pub requires_python: Option<String>,
    /// Dependency specifiers flattened into one display string.
    pub requires_dist: Option<String>,
    pub yanked: Option<bool>,
    pub vulnerabilities: Option<serde_json::Value>,
    pub homepage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexRecord {
    Success(IndexInfo),
    Fail(FetchFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitActivity {
    /// Commits in the first page of history; clamped to the platform's page size.
    Success { commit_count_first_page: u32 },
    Fail(FetchFailure),
}

/// Repository statistics from the hosting platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostingInfo {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub created_days_ago: Option<i64>,
    pub updated_at: Option<String>,
    pub updated_days_ago: Option<i64>,
    pub subscribers_count: Option<u64>,
    pub stargazers_count: Option<u64>,
    pub open_issues_count: Option<u64>,
    pub forks_count: Option<u64>,
    pub has_issues: Option<bool>,
    pub has_projects: Option<bool>,
    pub has_downloads: Option<bool>,
    pub has_wiki: Option<bool>,
    pub fork: Option<bool>,
    pub allow_forking: Option<bool>,
    pub commits: CommitActivity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HostingRecord {
    Success(Box<HostingInfo>),
    Fail(FetchFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForgeRecord {
    Success {
        api_url: String,
        development_url: String,
    },
    /// The feedstock README was fetched but names no development site.
    NotListed { api_url: String },
    Fail(FetchFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QnaRecord {
    Success {
        api_url: String,
        name: Option<String>,
        count: Option<u64>,
        has_synonyms: Option<bool>,
    },
    /// The tag query succeeded but matched nothing.
    NoResults { api_url: String },
    Fail(FetchFailure),
}

// ============================================================================
// Reports
// ============================================================================

/// Health profile assembled for one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageReport {
    pub package: PackageName,
    pub channel: Channel,
    pub origins: BTreeSet<Origin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_info: Option<IndexRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosting_info: Option<HostingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forge_info: Option<ForgeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qna_info: Option<QnaRecord>,
    /// Set when the package task itself did not finish (timeout, panic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PackageReport {
    pub fn new(package: PackageName, channel: Channel, origins: BTreeSet<Origin>) -> Self {
        Self {
            package,
            channel,
            origins,
            index_info: None,
            hosting_info: None,
            forge_info: None,
            qna_info: None,
            error: None,
        }
    }

    /// Number of sub-records that ended in `fail`.
    pub fn failed_sub_records(&self) -> usize {
        let mut failed = 0;
        if matches!(self.index_info, Some(IndexRecord::Fail(_))) {
            failed += 1;
        }
        match &self.hosting_info {
            Some(HostingRecord::Fail(_)) => failed += 1,
            Some(HostingRecord::Success(info)) => {
                if matches!(info.commits, CommitActivity::Fail(_)) {
                    failed += 1;
                }
            }
            None => {}
        }
        if matches!(self.forge_info, Some(ForgeRecord::Fail(_))) {
            failed += 1;
        }
        if matches!(self.qna_info, Some(QnaRecord::Fail(_))) {
            failed += 1;
        }
        failed
    }
}

/// Output document written once per run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthDocument {
    #[serde(rename = "conda_modules")]
    pub primary_modules: BTreeMap<PackageName, PackageReport>,
    #[serde(rename = "pip_modules")]
    pub secondary_modules: BTreeMap<PackageName, PackageReport>,
}

impl HealthDocument {
    pub fn insert(&mut self, report: PackageReport) {
        let modules = match report.channel {
            Channel::Primary => &mut self.primary_modules,
            Channel::Secondary => &mut self.secondary_modules,
        };
        modules.insert(report.package.clone(), report);
    }

    pub fn reports(&self) -> impl Iterator<Item = &PackageReport> {
        self.primary_modules
            .values()
            .chain(self.secondary_modules.values())
    }

    pub fn len(&self) -> usize {
        self.primary_modules.len() + self.secondary_modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name_normalization() {
        let name = PackageName::new("  NumPy \n").unwrap();
        assert_eq!(name.as_str(), "numpy");
        assert_eq!(name, PackageName::new("numpy").unwrap());
        assert!(PackageName::new("   ").is_none());
    }

    #[test]
    fn test_candidate_set_deduplicates() {
        let mut set = CandidateSet::new();
        assert!(set.insert(PackageName::new("Requests").unwrap()));
        assert!(!set.insert(PackageName::new("requests").unwrap()));
        assert_eq!(set.len(), 1);
        assert!(set.contains("REQUESTS"));
    }

    #[test]
    fn test_homepage_reference_parse() {
        let homepage = HomepageReference::parse("https://github.com/owner/repo").unwrap();
        assert_eq!(homepage.owner, "owner");
        assert_eq!(homepage.repo, "repo");

        let with_suffix =
            HomepageReference::parse("https://github.com/psf/requests.git/tree/main#readme")
                .unwrap();
        assert_eq!(with_suffix.owner, "psf");
        assert_eq!(with_suffix.repo, "requests");
    }

    #[test]
    fn test_homepage_reference_rejects_other_hosts() {
        assert!(HomepageReference::parse("https://gitlab.com/owner/repo").is_none());
        assert!(HomepageReference::parse("https://github.com/owner").is_none());
        assert!(HomepageReference::parse("https://requests.readthedocs.io").is_none());
    }

    #[test]
    fn test_channel_serialization() {
        assert_eq!(serde_json::to_string(&Channel::Primary).unwrap(), "\"conda\"");
        assert_eq!(serde_json::to_string(&Channel::Secondary).unwrap(), "\"pip\"");
    }

    #[test]
    fn test_status_tag_serialization() {
        let record = QnaRecord::NoResults {
            api_url: "http://qna/tags".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "no_results");

        let fail = IndexRecord::Fail(FetchFailure {
            api_url: "http://index".to_string(),
            http_status: Some(404),
            error: "HTTP status 404".to_string(),
        });
        let json = serde_json::to_value(&fail).unwrap();
        assert_eq!(json["status"], "fail");
        assert_eq!(json["http_status"], 404);
        assert!(json.get("summary").is_none());
    }

    #[test]
    fn test_document_shape() {
        let mut document = HealthDocument::default();
        let mut origins = BTreeSet::new();
        origins.insert(Origin::Manifest);
        document.insert(PackageReport::new(
            PackageName::new("numpy").unwrap(),
            Channel::Primary,
            origins.clone(),
        ));
        document.insert(PackageReport::new(
            PackageName::new("requests").unwrap(),
            Channel::Secondary,
            origins,
        ));

        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["conda_modules"]["numpy"]["channel"], "conda");
        assert_eq!(json["pip_modules"]["requests"]["channel"], "pip");
        assert_eq!(document.len(), 2);
    }
}
