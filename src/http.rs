//! Off-chain metadata transport
//!
//! Vault APIs (Morpho GraphQL, Lido REST) are treated as opaque JSON.
//! Adapters only pull the numeric fields they need out of the response.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{OptimizerError, Result};

/// Default timeout for metadata calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait JsonClient: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
}

/// reqwest-backed JSON client
pub struct HttpJsonClient {
    client: Client,
}

impl HttpJsonClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OptimizerError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonClient for HttpJsonClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OptimizerError::Http(format!("GET {url}: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| OptimizerError::Http(format!("GET {url}: invalid JSON: {e}")))
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OptimizerError::Http(format!("POST {url}: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| OptimizerError::Http(format!("POST {url}: invalid JSON: {e}")))
    }
}

/// Read a number that APIs sometimes send as a string
pub fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
