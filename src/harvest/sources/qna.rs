use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::harvest::traits::SourceEnricher;
use crate::http::ApiClient;
use crate::model::{PackageName, QnaRecord};
use crate::rate_limit::Api;

/// Tag statistics from the Q&A site, using the package name as the tag.
pub struct QnaEnricher {
    client: ApiClient,
    qna_host: String,
}

impl QnaEnricher {
    pub fn new(client: ApiClient, qna_host: impl Into<String>) -> Self {
        Self {
            client,
            qna_host: qna_host.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, package: &PackageName) -> String {
        format!("{}/2.3/tags/{}/info?site=stackoverflow", self.qna_host, package)
    }

    /// Reads the first entry of `items`; an absent or empty list is `no_results`.
    pub fn parse_tag_info(api_url: String, data: &Value) -> QnaRecord {
        let Some(tag) = data
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
        else {
            return QnaRecord::NoResults { api_url };
        };

        QnaRecord::Success {
            api_url,
            name: tag.get("name").and_then(Value::as_str).map(str::to_string),
            count: tag.get("count").and_then(Value::as_u64),
            has_synonyms: tag.get("has_synonyms").and_then(Value::as_bool),
        }
    }
}

#[async_trait]
impl SourceEnricher for QnaEnricher {
    type Output = QnaRecord;

    fn source_id(&self) -> &'static str {
        "stackoverflow"
    }

    #[instrument(skip(self), fields(package = %package))]
    async fn enrich(&self, package: &PackageName) -> QnaRecord {
        let api_url = self.endpoint(package);
        match self.client.get_json(Api::Qna, &api_url, None).await {
            Ok(data) => {
                let record = Self::parse_tag_info(api_url, &data);
                let status = match record {
                    QnaRecord::NoResults { .. } => "no_results",
                    _ => "success",
                };
                info!(status, "tag lookup");
                record
            }
            Err(e) => {
                warn!(status = "fail", error = %e, "tag lookup");
                QnaRecord::Fail(e.into_failure(api_url))
            }
        }
    }
}
