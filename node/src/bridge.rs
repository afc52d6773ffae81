//! # Bridge Client
//!
//! HTTP implementation of [`NodeDataProvider`] over the chain bridge REST
//! endpoints:
//!
//! | Method | Path               | Returns                  |
//! |--------|--------------------|--------------------------|
//! | GET    | `/status`          | JSON node status         |
//! | GET    | `/height/{h}`      | raw block bytes          |
//! | GET    | `/block/{hash}`    | raw block bytes          |
//! | GET    | `/epoch/{id}`      | packed epoch bundle      |
//! | GET    | `/genesis/{hash}`  | JSON genesis document    |
//! | POST   | `/txs/signed`      | submits a signed tx      |
//! | GET    | `/fragment/logs`   | JSON message pool logs   |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use ledger_indexer::crypto::Hash;
use ledger_indexer::sync::{FragmentLog, GenesisData, NodeDataProvider, NodeStatus, TransportError};

/// Per-request timeout. Epoch bundles are the slow case.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct BridgeClient {
    http: Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> Result<Response, TransportError> {
        let response = request.send().await.map_err(|e| TransportError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(TransportError::NotFound(url.to_string())),
            status => Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.url(path);
        let response = self.send(&url, self.http.get(&url)).await?;
        let body = response.bytes().await.map_err(|e| TransportError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        tracing::debug!(url = %url, bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let url = self.url(path);
        let response = self.send(&url, self.http.get(&url)).await?;
        response.json().await.map_err(|e| TransportError::InvalidResponse {
            url,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl NodeDataProvider for BridgeClient {
    async fn get_status(&self) -> Result<NodeStatus, TransportError> {
        self.get_json("/status").await
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Vec<u8>, TransportError> {
        self.get_bytes(&format!("/height/{height}")).await
    }

    async fn get_block(&self, hash: &Hash) -> Result<Vec<u8>, TransportError> {
        self.get_bytes(&format!("/block/{}", hex::encode(hash))).await
    }

    async fn get_epoch(&self, epoch: u64) -> Result<Vec<u8>, TransportError> {
        self.get_bytes(&format!("/epoch/{epoch}")).await
    }

    async fn get_genesis(&self, hash: &str) -> Result<GenesisData, TransportError> {
        self.get_json(&format!("/genesis/{hash}")).await
    }

    async fn post_signed_tx(&self, payload: &[u8]) -> Result<(), TransportError> {
        let url = self.url("/txs/signed");
        let request = self
            .http
            .post(&url)
            .header("content-type", "application/octet-stream")
            .body(payload.to_vec());
        self.send(&url, request).await?;
        tracing::info!(bytes = payload.len(), "signed transaction forwarded");
        Ok(())
    }

    async fn get_message_pool_logs(&self) -> Result<Vec<FragmentLog>, TransportError> {
        self.get_json("/fragment/logs").await
    }
}
