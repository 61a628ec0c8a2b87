use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::harvest::traits::SourceEnricher;
use crate::http::ApiClient;
use crate::model::{ForgeRecord, HomepageReference, PackageName};
use crate::rate_limit::Api;

const DEVELOPMENT_MARKER: &str = "development:";

/// Forge-mirror result plus the development site when it is on the hosting platform.
#[derive(Debug, Clone, PartialEq)]
pub struct ForgeLookup {
    pub record: ForgeRecord,
    pub homepage: Option<HomepageReference>,
}

/// Reads the development site from a package's feedstock README.
pub struct ForgeMirrorEnricher {
    client: ApiClient,
    raw_host: String,
}

/// URL following the first `development:` marker (case-insensitive).
///
/// Only the first line carrying the marker is considered; a marker with
/// nothing after it yields `None`.
pub fn find_development_url(readme: &str) -> Option<&str> {
    let line = readme
        .lines()
        .find(|line| line.to_lowercase().contains(DEVELOPMENT_MARKER))?;

    let mut tokens = line.split_whitespace();
    tokens.find(|token| token.to_lowercase().contains(DEVELOPMENT_MARKER))?;
    tokens.next()
}

impl ForgeMirrorEnricher {
    pub fn new(client: ApiClient, raw_host: impl Into<String>) -> Self {
        Self {
            client,
            raw_host: raw_host.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, package: &PackageName) -> String {
        format!("{}/conda-forge/{}-feedstock/main/README.md", self.raw_host, package)
    }
}

#[async_trait]
impl SourceEnricher for ForgeMirrorEnricher {
    type Output = ForgeLookup;

    fn source_id(&self) -> &'static str {
        "conda-forge"
    }

    #[instrument(skip(self), fields(package = %package))]
    async fn enrich(&self, package: &PackageName) -> ForgeLookup {
        let api_url = self.endpoint(package);
        let readme = match self.client.get_text(Api::Forge, &api_url).await {
            Ok(readme) => readme,
            Err(e) => {
                warn!(status = "fail", error = %e, "feedstock lookup");
                return ForgeLookup {
                    record: ForgeRecord::Fail(e.into_failure(api_url)),
                    homepage: None,
                };
            }
        };

        match find_development_url(&readme) {
            Some(url) => {
                let homepage = HomepageReference::parse(url);
                if homepage.is_none() {
                    debug!(url = %url, "development site is not on the hosting platform");
                }
                info!(status = "success", "feedstock lookup");
                ForgeLookup {
                    record: ForgeRecord::Success {
                        api_url,
                        development_url: url.to_string(),
                    },
                    homepage,
                }
            }
            None => {
                info!(status = "not_listed", "feedstock lookup");
                ForgeLookup {
                    record: ForgeRecord::NotListed { api_url },
                    homepage: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;

    fn enricher(host: &str) -> ForgeMirrorEnricher {
        let client = ApiClient::new(
            Duration::from_secs(5),
            Arc::new(RateLimiter::new(Duration::ZERO)),
        )
        .unwrap();
        ForgeMirrorEnricher::new(client, host)
    }

    fn pkg(name: &str) -> PackageName {
        PackageName::new(name).unwrap()
    }

    #[test]
    fn test_find_development_url() {
        let readme = "About numpy\n===\n\nHome: http://numpy.org/\n\nDevelopment: https://github.com/numpy/numpy\n";
        assert_eq!(find_development_url(readme), Some("https://github.com/numpy/numpy"));
    }

    #[test]
    fn test_first_marker_line_wins() {
        let readme = "Development: https://github.com/a/first\ndevelopment: https://github.com/b/second\n";
        assert_eq!(find_development_url(readme), Some("https://github.com/a/first"));
    }

    #[test]
    fn test_marker_without_url() {
        assert_eq!(find_development_url("Development:\nhttps://github.com/a/b"), None);
        assert_eq!(find_development_url("Home: http://x.org"), None);
    }

    #[tokio::test]
    async fn test_enrich_success_with_hosting_homepage() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/conda-forge/numpy-feedstock/main/README.md")
            .with_status(200)
            .with_body("Development: https://github.com/numpy/numpy\n")
            .create_async()
            .await;

        let lookup = enricher(&server.url()).enrich(&pkg("numpy")).await;
        assert!(matches!(
            lookup.record,
            ForgeRecord::Success { ref development_url, .. } if development_url == "https://github.com/numpy/numpy"
        ));
        assert_eq!(lookup.homepage.unwrap().repo, "numpy");
    }

    #[tokio::test]
    async fn test_enrich_not_listed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/conda-forge/tiny-feedstock/main/README.md")
            .with_status(200)
            .with_body("About tiny\n")
            .create_async()
            .await;

        let lookup = enricher(&server.url()).enrich(&pkg("tiny")).await;
        assert!(matches!(lookup.record, ForgeRecord::NotListed { .. }));
        assert!(lookup.homepage.is_none());
    }

    #[tokio::test]
    async fn test_enrich_missing_feedstock_is_fail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/conda-forge/ghost-feedstock/main/README.md")
            .with_status(404)
            .create_async()
            .await;

        let lookup = enricher(&server.url()).enrich(&pkg("ghost")).await;
        match lookup.record {
            ForgeRecord::Fail(failure) => assert_eq!(failure.http_status, Some(404)),
            other => panic!("expected fail, got {other:?}"),
        }
    }
}
