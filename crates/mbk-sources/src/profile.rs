//! Backend profile adapter.
//!
//! Reads the denormalized subscription fields (including out-of-band
//! grants) for one user. The record is a derived view fed by payment
//! webhooks and may lag the authoritative payment state — the reconciler
//! accounts for that; this adapter just reads.

use crate::SourceError;
use mbk_schemas::ProfileRecord;

/// Outcome of one profile read.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileRead {
    Record(ProfileRecord),
    Unavailable { reason: String },
}

impl ProfileRead {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ProfileRead::Unavailable {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileSource {
    http: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
}

impl ProfileSource {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    fn record_url(&self, user_id: &str) -> String {
        format!(
            "{}/v1/profiles/{}/subscription",
            self.base_url.trim_end_matches('/'),
            user_id
        )
    }

    /// Read the profile's subscription fields for `user_id`.
    ///
    /// No retry here: the record lags webhooks by design, so the next
    /// scheduled refresh is the retry.
    pub async fn read(&self, access_token: &str, user_id: &str) -> ProfileRead {
        match self.fetch_record(access_token, user_id).await {
            Ok(record) => ProfileRead::Record(record),
            Err(err) => {
                tracing::debug!(%err, "profile read failed");
                ProfileRead::unavailable(err.to_string())
            }
        }
    }

    async fn fetch_record(
        &self,
        access_token: &str,
        user_id: &str,
    ) -> Result<ProfileRecord, SourceError> {
        let resp = self
            .http
            .get(self.record_url(user_id))
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

        resp.json::<ProfileRecord>()
            .await
            .map_err(|err| SourceError::Decode(err.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests (local mock server, no network)
// ---------------------------------------------------------------------------
