use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RateLimits;
use crate::harvest::FetchError;

/// External APIs sharing a request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Api {
    Index,
    Hosting,
    Forge,
    Qna,
}

impl Api {
    pub fn label(self) -> &'static str {
        match self {
            Api::Index => "pypi",
            Api::Hosting => "github",
            Api::Forge => "conda-forge",
            Api::Qna => "stackoverflow",
        }
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimit {
    requests: usize,
    window: Duration,
}

/// Sliding-window request budget per API.
///
/// A caller waits for a free slot only when it frees within `max_wait`;
/// otherwise the call is refused with [`FetchError::RateLimited`].
pub struct RateLimiter {
    limits: HashMap<Api, RateLimit>,
    state: Mutex<HashMap<Api, VecDeque<Instant>>>,
    max_wait: Duration,
}

impl RateLimiter {
    /// Creates a limiter with no budgets; every API is unlimited until one is added.
    pub fn new(max_wait: Duration) -> Self {
        Self {
            limits: HashMap::new(),
            state: Mutex::new(HashMap::new()),
            max_wait,
        }
    }

    pub fn from_config(limits: &RateLimits, authenticated: bool) -> Self {
        let hosting_per_hour = if authenticated {
            limits.hosting_per_hour_authenticated
        } else {
            limits.hosting_per_hour
        };

        Self::new(Duration::from_secs(limits.max_wait_secs))
            .with_limit(Api::Index, limits.index_per_minute, Duration::from_secs(60))
            .with_limit(Api::Forge, limits.forge_per_minute, Duration::from_secs(60))
            .with_limit(Api::Hosting, hosting_per_hour, Duration::from_secs(60 * 60))
            .with_limit(Api::Qna, limits.qna_per_day, Duration::from_secs(24 * 60 * 60))
    }

    pub fn with_limit(mut self, api: Api, requests: usize, window: Duration) -> Self {
        self.limits.insert(api, RateLimit { requests, window });
        self
    }

    /// Takes one request slot for `api`.
    pub async fn acquire(&self, api: Api) -> Result<(), FetchError> {
        let Some(limit) = self.limits.get(&api).copied() else {
            return Ok(());
        };
        if limit.requests == 0 {
            return Err(FetchError::RateLimited {
                api: api.label().to_string(),
            });
        }

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let sent = state.entry(api).or_default();
                let now = Instant::now();
                while sent
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= limit.window)
                {
                    sent.pop_front();
                }

                if sent.len() < limit.requests {
                    sent.push_back(now);
                    return Ok(());
                }
                let oldest = sent.front().copied().unwrap_or(now);
                limit.window.saturating_sub(now.duration_since(oldest))
            };

            if wait > self.max_wait {
                warn!(api = %api, wait_ms = wait.as_millis() as u64, "request budget exhausted");
                return Err(FetchError::RateLimited {
                    api: api.label().to_string(),
                });
            }

            debug!(api = %api, wait_ms = wait.as_millis() as u64, "waiting for request slot");
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlimited_api_never_blocks() {
        let limiter = RateLimiter::new(Duration::ZERO);
        for _ in 0..100 {
            assert!(limiter.acquire(Api::Index).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_refused() {
        let limiter = RateLimiter::new(Duration::from_millis(10)).with_limit(
            Api::Qna,
            2,
            Duration::from_secs(24 * 60 * 60),
        );

        assert!(limiter.acquire(Api::Qna).await.is_ok());
        assert!(limiter.acquire(Api::Qna).await.is_ok());
        let err = limiter.acquire(Api::Qna).await.unwrap_err();
        assert_eq!(
            err,
            FetchError::RateLimited {
                api: "stackoverflow".to_string()
            }
        );
        // Other APIs keep their own budget
        assert!(limiter.acquire(Api::Hosting).await.is_ok());
    }

    #[tokio::test]
    async fn test_waits_for_short_window() {
        let limiter = RateLimiter::new(Duration::from_secs(1)).with_limit(
            Api::Hosting,
            1,
            Duration::from_millis(50),
        );

        let start = Instant::now();
        limiter.acquire(Api::Hosting).await.unwrap();
        limiter.acquire(Api::Hosting).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_zero_budget_refuses() {
        let limiter =
            RateLimiter::new(Duration::from_secs(1)).with_limit(Api::Forge, 0, Duration::from_secs(1));
        assert!(limiter.acquire(Api::Forge).await.is_err());
    }
}
