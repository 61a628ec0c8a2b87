//! External metadata sources.
//!
//! | Source        | Enricher                 | Channel         |
//! |---------------|--------------------------|-----------------|
//! | Package index | [`PackageIndexEnricher`] | pip             |
//! | Forge mirror  | [`ForgeMirrorEnricher`]  | conda           |
//! | Hosting       | [`HostingEnricher`]      | via homepage    |
//! | Q&A site      | [`QnaEnricher`]          | both            |

pub mod forge;
pub mod github;
pub mod pypi;
pub mod qna;

pub use forge::{find_development_url, ForgeLookup, ForgeMirrorEnricher};
pub use github::{days_between, HostingEnricher};
pub use pypi::{IndexLookup, PackageIndexEnricher};
pub use qna::QnaEnricher;

use std::sync::Arc;

use crate::config::{Credential, HealthConfig};
use crate::http::ApiClient;
use crate::rate_limit::RateLimiter;

/// The four enrichers of a run, sharing one HTTP client and request budget.
pub struct Enrichers {
    pub index: PackageIndexEnricher,
    pub hosting: HostingEnricher,
    pub forge: ForgeMirrorEnricher,
    pub qna: QnaEnricher,
}

impl Enrichers {
    pub fn from_config(config: &HealthConfig, credential: Credential) -> Result<Self, reqwest::Error> {
        let limiter = Arc::new(RateLimiter::from_config(
            &config.rate_limits,
            credential.is_present(),
        ));
        let client = ApiClient::new(config.request_timeout(), limiter)?;
        let endpoints = &config.endpoints;

        Ok(Self {
            index: PackageIndexEnricher::new(client.clone(), endpoints.index_host.as_str()),
            hosting: HostingEnricher::new(client.clone(), endpoints.api_host.as_str(), credential),
            forge: ForgeMirrorEnricher::new(client.clone(), endpoints.raw_host.as_str()),
            qna: QnaEnricher::new(client, endpoints.qna_host.as_str()),
        })
    }
}
