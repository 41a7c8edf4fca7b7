//! reqwest transport for the custodian JSON API
//!
//! Endpoints (relative to `api_base`):
//!   POST /tokens          {multi?, ttl_hours?} → {token_a, token_b}
//!   POST /tokens/get      {token_b}            → {token_a, should_delete}
//!   POST /decrypt         {token_a}            → {token_b, should_delete?}
//!   POST /tokens/delete   {token_b}            → 2xx

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use zkenv_core::config::ServiceConfig;
use zkenv_core::types::{
    fingerprint, IssueRequest, TokenAResponse, TokenARequest, TokenBRequest, TokenBResponse,
};
use zkenv_core::{KnownHalf, Resolution, TokenPair, ZkenvError, ZkenvResult};

use crate::TokenService;

const DEFAULT_RETRY_AFTER_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct HttpTokenService {
    client: Client,
    base_url: String,
    retry_transient: bool,
    ttl_hours: Option<u32>,
}

impl HttpTokenService {
    pub fn new(config: &ServiceConfig) -> ZkenvResult<Self> {
        config.check_transport()?;

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ZkenvError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            retry_transient: config.retry_transient,
            ttl_hours: config.ttl_hours,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn issue_request(&self, multi_use: bool) -> IssueRequest {
        IssueRequest {
            multi: multi_use.then_some(true),
            ttl_hours: self.ttl_hours,
        }
    }

    /// POST JSON, retrying once on connect/timeout failures when enabled.
    async fn send<B: Serialize>(&self, path: &str, body: &B) -> ZkenvResult<Response> {
        let url = self.url(path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.post(&url).json(body).send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if self.retry_transient && attempt == 1 && is_transient(&e) => {
                    tracing::warn!(
                        path,
                        error = %e,
                        "transient token service failure, retrying once"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(ZkenvError::ServiceUnavailable(format!("POST {path}: {e}")))
                }
            }
        }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ZkenvResult<T> {
        let resp = self.send(path, body).await?;
        let resp = check_status(path, resp).await?;
        resp.json::<T>().await.map_err(|e| {
            ZkenvError::ServiceUnavailable(format!("POST {path}: bad response body: {e}"))
        })
    }

    async fn post_no_response<B: Serialize>(&self, path: &str, body: &B) -> ZkenvResult<()> {
        let resp = self.send(path, body).await?;
        check_status(path, resp).await.map(|_| ())
    }
}

impl TokenService for HttpTokenService {
    async fn issue(&self, multi_use: bool) -> ZkenvResult<TokenPair> {
        let pair: TokenPair = self.post("/tokens", &self.issue_request(multi_use)).await?;
        tracing::debug!(token_b = %fingerprint(&pair.token_b), multi_use, "issued token pair");
        Ok(pair)
    }

    async fn resolve(&self, known: &KnownHalf) -> ZkenvResult<Resolution> {
        match known {
            KnownHalf::TokenB(token_b) => {
                let body = TokenBRequest {
                    token_b: token_b.clone(),
                };
                let resp: TokenAResponse = self.post("/tokens/get", &body).await?;
                Ok(Resolution {
                    counterpart: resp.token_a,
                    token_b: token_b.clone(),
                    should_delete: resp.should_delete,
                })
            }
            KnownHalf::TokenA(token_a) => {
                let body = TokenARequest {
                    token_a: token_a.clone(),
                };
                let resp: TokenBResponse = self.post("/decrypt", &body).await?;
                Ok(Resolution {
                    counterpart: resp.token_b.clone(),
                    token_b: resp.token_b,
                    should_delete: resp.should_delete,
                })
            }
        }
    }

    async fn delete(&self, token_b: &str) -> ZkenvResult<()> {
        let body = TokenBRequest {
            token_b: token_b.to_string(),
        };
        self.post_no_response("/tokens/delete", &body).await?;
        tracing::debug!(token_b = %fingerprint(token_b), "deleted token pair");
        Ok(())
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

async fn check_status(path: &str, resp: Response) -> ZkenvResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let message = extract_error_message(resp).await;
    Err(classify_status(path, status, retry_after, message))
}

/// Map a non-success status onto the error taxonomy.
fn classify_status(
    path: &str,
    status: StatusCode,
    retry_after: Option<u64>,
    message: Option<String>,
) -> ZkenvError {
    match status {
        StatusCode::NOT_FOUND => ZkenvError::TokenNotFound,
        StatusCode::TOO_MANY_REQUESTS => ZkenvError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        _ => ZkenvError::ServiceUnavailable(match message {
            Some(msg) => format!("POST {path}: HTTP {}: {msg}", status.as_u16()),
            None => format!("POST {path}: HTTP {}", status.as_u16()),
        }),
    }
}

async fn extract_error_message(resp: Response) -> Option<String> {
    let text = resp.text().await.ok()?;
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(v) => v
            .get("error")
            .and_then(|e| e.as_str())
            .map(str::to_string),
        Err(_) if !text.trim().is_empty() => Some(text.trim().chars().take(200).collect()),
        Err(_) => None,
    }
}
