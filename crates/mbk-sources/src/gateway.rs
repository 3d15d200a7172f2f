//! Payment-gateway status adapter.
//!
//! One authenticated call against the billing backend, used on platforms
//! without a native purchase layer (or as a secondary check). Transport
//! failures and server errors are retried through a bounded loop; whatever
//! is left after the last attempt becomes `Unavailable` — never "none".

use chrono::Utc;

use crate::{RetryPolicy, SourceError, SourceRead};
use mbk_schemas::GatewayStatus;

#[derive(Debug, Clone)]
pub struct GatewaySource {
    http: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
    retry: RetryPolicy,
}

impl GatewaySource {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration, retry: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
            retry,
        }
    }

    fn status_url(&self) -> String {
        format!(
            "{}/v1/subscription-status",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Check the gateway's view of `user_id`'s subscription.
    ///
    /// The returned snapshot carries `user_id` as its subject: the gateway
    /// authenticates the caller's token, so the response is always about
    /// the token's owner.
    pub async fn read(&self, access_token: &str, user_id: &str) -> SourceRead {
        let mut last_reason = String::from("no attempt made");

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.delay).await;
            }

            match self.fetch_status(access_token).await {
                Ok(status) => {
                    return SourceRead::Confirmed(status.to_snapshot(user_id, Utc::now()));
                }
                Err(err) => {
                    tracing::debug!(attempt, %err, "gateway status check failed");
                    let retryable = err.is_retryable();
                    last_reason = err.to_string();
                    if !retryable {
                        break;
                    }
                }
            }
        }

        SourceRead::Unavailable {
            reason: last_reason,
        }
    }

    async fn fetch_status(&self, access_token: &str) -> Result<GatewayStatus, SourceError> {
        let resp = self
            .http
            .get(self.status_url())
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    SourceError::Transport("request timed out".to_string())
                } else {
                    SourceError::Transport(err.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                code: Some(status.as_u16()),
                message: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            });
        }

        resp.json::<GatewayStatus>()
            .await
            .map_err(|err| SourceError::Decode(err.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests (local mock server, no network)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn source(server: &MockServer, retry: RetryPolicy) -> GatewaySource {
        GatewaySource::new(server.base_url(), Duration::from_millis(500), retry)
    }

    #[tokio::test]
    async fn entitled_response_confirms_positive() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/subscription-status")
                    .header("authorization", "Bearer tok-1");
                then.status(200).json_body(serde_json::json!({
                    "status": "active",
                    "planType": "annual",
                    "periodEnd": "2024-12-01T00:00:00Z",
                    "trialEnd": null,
                    "isEntitled": true
                }));
            })
            .await;

        let read = source(&server, RetryPolicy::default())
            .read("tok-1", "user-1")
            .await;

        let SourceRead::Confirmed(snap) = read else {
            panic!("expected confirmed read, got {read:?}");
        };
        assert!(snap.is_pro);
        assert!(!snap.is_trialing);
        assert_eq!(snap.user_id, "user-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_entitled_response_is_a_confirmed_negative() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/subscription-status");
                then.status(200).json_body(serde_json::json!({
                    "status": "none",
                    "planType": null,
                    "periodEnd": null,
                    "trialEnd": null,
                    "isEntitled": false
                }));
            })
            .await;

        let read = source(&server, RetryPolicy::default())
            .read("tok-1", "user-1")
            .await;
        assert!(matches!(read, SourceRead::Confirmed(ref s) if !s.is_pro));
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_unavailable() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/subscription-status");
                then.status(503).body("maintenance");
            })
            .await;

        let retry = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(5),
        };
        let read = source(&server, retry).read("tok-1", "user-1").await;

        assert!(matches!(read, SourceRead::Unavailable { .. }));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn auth_failure_is_unavailable_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/subscription-status");
                then.status(401).body("token expired");
            })
            .await;

        let retry = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(5),
        };
        let read = source(&server, retry).read("tok-bad", "user-1").await;

        assert!(matches!(read, SourceRead::Unavailable { .. }));
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn undecodable_body_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/subscription-status");
                then.status(200).body("<html>login</html>");
            })
            .await;

        let read = source(&server, RetryPolicy::default())
            .read("tok-1", "user-1")
            .await;
        assert!(matches!(read, SourceRead::Unavailable { .. }));
    }
}
