use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::harvest::traits::SourceEnricher;
use crate::http::ApiClient;
use crate::model::{HomepageReference, IndexInfo, IndexRecord, PackageName};
use crate::rate_limit::Api;

/// Package-index result plus the homepage to forward to the hosting enricher.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexLookup {
    pub record: IndexRecord,
    pub homepage: Option<HomepageReference>,
}

/// Queries the package index JSON API (`/pypi/{package}/json`).
pub struct PackageIndexEnricher {
    client: ApiClient,
    index_host: String,
}

impl PackageIndexEnricher {
    pub fn new(client: ApiClient, index_host: impl Into<String>) -> Self {
        Self {
            client,
            index_host: index_host.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, package: &PackageName) -> String {
        format!("{}/pypi/{}/json", self.index_host, package)
    }

    /// Extracts the consumed fields from a successful metadata response.
    pub fn parse_metadata(
        package: &PackageName,
        api_url: &str,
        data: &Value,
    ) -> (IndexInfo, Option<HomepageReference>) {
        let info = data.get("info").filter(|info| info.is_object());
        if info.is_none() {
            warn!(package = %package, "package index response has no info object");
        }

        let text = |key: &str| {
            info.and_then(|i| i.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let requires_dist = info
            .and_then(|i| i.get("requires_dist"))
            .filter(|v| !v.is_null())
            .map(Value::to_string);

        let homepage = info.and_then(homepage_url);
        let reference = homepage.as_deref().and_then(HomepageReference::parse);
        match (&homepage, &reference) {
            (None, _) => debug!(package = %package, "no homepage listed"),
            (Some(url), None) => debug!(package = %package, url = %url, "homepage is not on the hosting platform"),
            (Some(_), Some(_)) => {}
        }

        let info = IndexInfo {
            api_url: api_url.to_string(),
            summary: text("summary"),
            requires_python: text("requires_python").filter(|s| !s.is_empty()),
            requires_dist,
            yanked: info.and_then(|i| i.get("yanked")).and_then(Value::as_bool),
            vulnerabilities: data.get("vulnerabilities").filter(|v| !v.is_null()).cloned(),
            homepage,
        };
        (info, reference)
    }
}

/// `project_urls.Homepage` (any key casing), falling back to `home_page`.
fn homepage_url(info: &Value) -> Option<String> {
    let from_project_urls = info
        .get("project_urls")
        .and_then(Value::as_object)
        .and_then(|urls| {
            urls.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("homepage"))
                .and_then(|(_, url)| url.as_str())
        });

    from_project_urls
        .or_else(|| info.get("home_page").and_then(Value::as_str))
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SourceEnricher for PackageIndexEnricher {
    type Output = IndexLookup;

    fn source_id(&self) -> &'static str {
        "pypi"
    }

    #[instrument(skip(self), fields(package = %package))]
    async fn enrich(&self, package: &PackageName) -> IndexLookup {
        let api_url = self.endpoint(package);
        match self.client.get_json(Api::Index, &api_url, None).await {
            Ok(data) => {
                let (info, homepage) = Self::parse_metadata(package, &api_url, &data);
                info!(status = "success", hosting = homepage.is_some(), "package index lookup");
                IndexLookup {
                    record: IndexRecord::Success(info),
                    homepage,
                }
            }
            Err(e) => {
                warn!(status = "fail", error = %e, "package index lookup");
                IndexLookup {
                    record: IndexRecord::Fail(e.into_failure(api_url)),
                    homepage: None,
                }
            }
        }
    }
}
