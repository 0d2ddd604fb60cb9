// src/ai/http.rs
// Network-backed scoring oracle. Provider-agnostic: it POSTs the request
// shape from ai/mod.rs to a configured endpoint and expects the judgment
// shape back. Any vendor-specific prompt assembly lives behind that
// endpoint, not here.

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use std::time::Duration;

use super::{OracleRequest, ScoringError, ScoringOracle};
use crate::config::DedupeConfig;
use crate::models::AiJudgment;

pub struct HttpScoringOracle {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpScoringOracle {
    pub fn new(endpoint: String, api_key: Option<String>, config: &DedupeConfig) -> Self {
        let timeout = Duration::from_secs(config.oracle_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint,
            api_key,
            timeout,
        }
    }

    /// Endpoint from `DEDUPE_ORACLE_URL`, optional bearer token from
    /// `DEDUPE_ORACLE_API_KEY`.
    pub fn from_env(config: &DedupeConfig) -> anyhow::Result<Self> {
        let endpoint = std::env::var("DEDUPE_ORACLE_URL")
            .map_err(|_| anyhow::anyhow!("DEDUPE_ORACLE_URL must be set for the http oracle"))?;
        let api_key = std::env::var("DEDUPE_ORACLE_API_KEY").ok();
        Ok(Self::new(endpoint, api_key, config))
    }

    fn map_status(status: StatusCode, body: String) -> ScoringError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ScoringError::Auth,
            StatusCode::TOO_MANY_REQUESTS => ScoringError::QuotaExhausted,
            s if s.is_server_error() => ScoringError::Provider {
                status: s.as_u16(),
                message: body,
                retryable: true,
            },
            s => ScoringError::Provider {
                status: s.as_u16(),
                message: body,
                retryable: false,
            },
        }
    }
}

#[async_trait]
impl ScoringOracle for HttpScoringOracle {
    async fn analyze(&self, request: &OracleRequest) -> Result<AiJudgment, ScoringError> {
        debug!(
            "AI: scoring pair ({}, {}) via {}",
            request.entity_a.id, request.entity_b.id, self.endpoint
        );

        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ScoringError::Timeout(self.timeout)
            } else {
                ScoringError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        response
            .json::<AiJudgment>()
            .await
            .map_err(|e| ScoringError::MalformedResponse(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
