//! Base node JSON-RPC client
//!
//! Thin async wrapper with one method per remote procedure. Every call either
//! returns the decoded result or an [`RpcError`]; nothing is retried here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use super::types::{
    Block, BlockHeader, HeaderSorting, KernelSignature, MempoolTransaction,
    PaymentReferenceMatch, TipInfo, ValidatorNode, VersionInfo,
};

/// Errors that can occur when calling the base node
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request failed or returned a non-success status
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The node answered with a JSON-RPC error object
    #[error("Node returned error {code}: {message}")]
    Remote { code: i64, message: String },

    /// The response carried neither `result` nor `error`
    #[error("Response contained no result")]
    MissingResult,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Client for the base node's JSON-RPC endpoint
#[derive(Debug, Clone)]
pub struct NodeClient {
    client: Client,
    endpoint: Url,
    next_id: Arc<AtomicU64>,
}

impl NodeClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Create a client around an existing HTTP client
    pub fn with_client(client: Client, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "Calling base node");

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;

        decode_response(&text)
    }

    pub async fn get_version(&self) -> Result<VersionInfo, RpcError> {
        self.call("get_version", json!({})).await
    }

    pub async fn get_tip_info(&self) -> Result<TipInfo, RpcError> {
        self.call("get_tip_info", json!({})).await
    }

    /// List up to `num_headers` headers starting at `from_height`
    pub async fn list_headers(
        &self,
        from_height: u64,
        num_headers: u64,
        sorting: HeaderSorting,
    ) -> Result<Vec<BlockHeader>, RpcError> {
        self.call(
            "list_headers",
            json!({
                "from_height": from_height,
                "num_headers": num_headers,
                "sorting": sorting,
            }),
        )
        .await
    }

    pub async fn get_blocks(&self, heights: Vec<u64>) -> Result<Vec<Block>, RpcError> {
        self.call("get_blocks", json!({ "heights": heights })).await
    }

    pub async fn get_mempool_transactions(&self) -> Result<Vec<MempoolTransaction>, RpcError> {
        self.call("get_mempool_transactions", json!({})).await
    }

    /// Blocks containing any of the given output commitments
    pub async fn search_utxos(&self, commitments: Vec<String>) -> Result<Vec<Block>, RpcError> {
        self.call("search_utxos", json!({ "commitments": commitments }))
            .await
    }

    /// Blocks containing any of the given kernel signatures
    pub async fn search_kernels(
        &self,
        signatures: Vec<KernelSignature>,
    ) -> Result<Vec<Block>, RpcError> {
        self.call("search_kernels", json!({ "signatures": signatures }))
            .await
    }

    pub async fn search_payment_references(
        &self,
        payment_references: Vec<String>,
    ) -> Result<Vec<PaymentReferenceMatch>, RpcError> {
        self.call(
            "search_payment_references",
            json!({ "payment_references": payment_references }),
        )
        .await
    }

    pub async fn get_active_validator_nodes(
        &self,
        height: u64,
    ) -> Result<Vec<ValidatorNode>, RpcError> {
        self.call("get_active_validator_nodes", json!({ "height": height }))
            .await
    }
}

/// Unwrap a JSON-RPC response envelope
fn decode_response<R: DeserializeOwned>(body: &str) -> Result<R, RpcError> {
    let envelope: JsonRpcResponse<R> = serde_json::from_str(body)?;
    if let Some(error) = envelope.error {
        return Err(RpcError::Remote {
            code: error.code,
            message: error.message,
        });
    }
    envelope.result.ok_or(RpcError::MissingResult)
}
