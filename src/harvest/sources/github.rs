use chrono::{Local, NaiveDate};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::Credential;
use crate::harvest::traits::FetchError;
use crate::http::ApiClient;
use crate::model::{CommitActivity, HomepageReference, HostingInfo, HostingRecord};
use crate::rate_limit::Api;

/// Whole days from the calendar date in `timestamp` (its first ten
/// characters, `YYYY-MM-DD`) to `today`.
pub fn days_between(timestamp: &str, today: NaiveDate) -> Option<i64> {
    let date = timestamp.get(..10)?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((today - date).num_days())
}

/// Repository statistics and first-page commit activity from the hosting API.
pub struct HostingEnricher {
    client: ApiClient,
    api_host: String,
    credential: Credential,
    today: Option<NaiveDate>,
}

impl HostingEnricher {
    pub fn new(client: ApiClient, api_host: impl Into<String>, credential: Credential) -> Self {
        Self {
            client,
            api_host: api_host.into().trim_end_matches('/').to_string(),
            credential,
            today: None,
        }
    }

    /// Pins the reference date for the `*_days_ago` fields.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn repo_endpoint(&self, homepage: &HomepageReference) -> String {
        format!("{}/repos/{}/{}", self.api_host, homepage.owner, homepage.repo)
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    async fn commit_activity(&self, repo_url: &str) -> CommitActivity {
        let api_url = format!("{repo_url}/commits");
        let counted = self
            .client
            .get_json(Api::Hosting, &api_url, Some(&self.credential))
            .await
            .and_then(|data| {
                data.as_array()
                    .map(|commits| {
                        commits.iter().filter(|c| c.get("commit").is_some()).count() as u32
                    })
                    .ok_or_else(|| FetchError::Decode("expected a list of commits".to_string()))
            });

        match counted {
            Ok(commit_count_first_page) => CommitActivity::Success {
                commit_count_first_page,
            },
            Err(e) => {
                warn!(status = "fail", error = %e, "commit history lookup");
                CommitActivity::Fail(e.into_failure(api_url))
            }
        }
    }

    fn parse_repository(
        &self,
        homepage: &HomepageReference,
        api_url: String,
        data: &Value,
        commits: CommitActivity,
    ) -> HostingInfo {
        let today = self.today();
        let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
        let count = |key: &str| data.get(key).and_then(Value::as_u64);
        let flag = |key: &str| data.get(key).and_then(Value::as_bool);

        let created_at = text("created_at");
        let updated_at = text("updated_at");

        HostingInfo {
            api_url,
            owner: homepage.owner.clone(),
            repo: homepage.repo.clone(),
            description: text("description"),
            created_days_ago: created_at.as_deref().and_then(|t| days_between(t, today)),
            created_at,
            updated_days_ago: updated_at.as_deref().and_then(|t| days_between(t, today)),
            updated_at,
            subscribers_count: count("subscribers_count"),
            stargazers_count: count("stargazers_count"),
            open_issues_count: count("open_issues_count"),
            forks_count: count("forks_count"),
            has_issues: flag("has_issues"),
            has_projects: flag("has_projects"),
            has_downloads: flag("has_downloads"),
            has_wiki: flag("has_wiki"),
            fork: flag("fork"),
            allow_forking: flag("allow_forking"),
            commits,
        }
    }

    /// Looks up the repository behind `homepage`. The commit history is
    /// queried only when the repository call succeeds.
    #[instrument(skip(self, homepage), fields(owner = %homepage.owner, repo = %homepage.repo))]
    pub async fn lookup(&self, homepage: &HomepageReference) -> HostingRecord {
        let api_url = self.repo_endpoint(homepage);
        let data = match self
            .client
            .get_json(Api::Hosting, &api_url, Some(&self.credential))
            .await
        {
            Ok(data) => data,
            Err(e) => {
                warn!(status = "fail", error = %e, "repository lookup");
                return HostingRecord::Fail(e.into_failure(api_url));
            }
        };

        let commits = self.commit_activity(&api_url).await;
        info!(status = "success", "repository lookup");
        HostingRecord::Success(Box::new(
            self.parse_repository(homepage, api_url, &data, commits),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;

    fn enricher(host: &str) -> HostingEnricher {
        let client = ApiClient::new(
            Duration::from_secs(5),
            Arc::new(RateLimiter::new(Duration::ZERO)),
        )
        .unwrap();
        HostingEnricher::new(client, host, Credential::default())
            .with_today(NaiveDate::from_ymd_opt(2024, 6, 11).unwrap())
    }

    fn homepage() -> HomepageReference {
        HomepageReference::parse("https://github.com/owner/repo").unwrap()
    }

    #[test]
    fn test_days_between() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();
        assert_eq!(days_between("2012-06-11T23:41:23Z", today), Some(4383));
        assert_eq!(days_between("2024-06-11", today), Some(0));
        assert_eq!(days_between("2024-06", today), None);
        assert_eq!(days_between("not-a-date", today), None);
    }

    #[tokio::test]
    async fn test_lookup_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/owner/repo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "description": "A repo",
                    "created_at": "2012-06-11T23:41:23Z",
                    "updated_at": "2024-06-10T08:00:00Z",
                    "subscribers_count": 12,
                    "stargazers_count": 340,
                    "open_issues_count": 5,
                    "forks_count": 40,
                    "has_issues": true,
                    "has_projects": false,
                    "has_downloads": true,
                    "has_wiki": true,
                    "fork": false,
                    "allow_forking": true
                }"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/repos/owner/repo/commits")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"commit": {}}, {"commit": {}}, {"sha": "no-commit"}]"#)
            .create_async()
            .await;

        match enricher(&server.url()).lookup(&homepage()).await {
            HostingRecord::Success(info) => {
                assert_eq!(info.description.as_deref(), Some("A repo"));
                assert_eq!(info.created_days_ago, Some(4383));
                assert_eq!(info.updated_days_ago, Some(1));
                assert_eq!(info.stargazers_count, Some(340));
                assert_eq!(info.has_projects, Some(false));
                assert_eq!(
                    info.commits,
                    CommitActivity::Success {
                        commit_count_first_page: 2
                    }
                );
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repo_failure_skips_commits() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/owner/repo")
            .with_status(404)
            .create_async()
            .await;
        let commits = server
            .mock("GET", "/repos/owner/repo/commits")
            .expect(0)
            .create_async()
            .await;

        match enricher(&server.url()).lookup(&homepage()).await {
            HostingRecord::Fail(failure) => assert_eq!(failure.http_status, Some(404)),
            other => panic!("expected fail, got {other:?}"),
        }
        commits.assert_async().await;
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_repo_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/owner/repo")
            .with_status(200)
            .with_body(r#"{"stargazers_count": 1}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/owner/repo/commits")
            .with_status(409)
            .create_async()
            .await;

        match enricher(&server.url()).lookup(&homepage()).await {
            HostingRecord::Success(info) => {
                assert_eq!(info.stargazers_count, Some(1));
                assert!(info.created_days_ago.is_none());
                assert!(matches!(info.commits, CommitActivity::Fail(ref f) if f.http_status == Some(409)));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}
