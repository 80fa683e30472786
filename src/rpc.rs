//! HTTP JSON-RPC client for transaction resolution.

use serde_json::{json, Value};
use std::time::Duration;

const RPC_TIMEOUT_SECS: u64 = 30;

pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RpcClient {
    pub fn new(endpoint: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    /// Fetch a transaction by signature. The response body is returned
    /// verbatim; the resolver persists it without interpretation.
    pub async fn get_transaction(&self, signature: &str) -> Result<Value, reqwest::Error> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTransaction",
            "params": [
                signature,
                { "encoding": "json", "maxSupportedTransactionVersion": 0 }
            ]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        response.json().await
    }
}
