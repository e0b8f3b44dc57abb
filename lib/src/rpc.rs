// Copyright (c) 2022-2023 The MobileCoin Foundation

//! JSON-RPC client for transaction submission and bundle relay

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    config::RpcConfig,
    tx::{BundleRelay, BundleStatus, Rpc, Signature, SignatureStatus, Transaction},
    Error,
};

const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Context wrapped results (`{ context, value }`)
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct InflightBundleStatus {
    status: BundleStatus,
}

/// JSON-RPC client implementing [Rpc] and [BundleRelay]
#[derive(Clone)]
pub struct JsonRpcClient {
    inner: reqwest::Client,
    url: String,
    bundle_url: String,
}

impl JsonRpcClient {
    /// Create a new client using the provided endpoints
    pub fn new(config: &RpcConfig) -> Result<Self, Error> {
        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_s))
            .build()?;

        Ok(Self {
            inner,
            url: config.url.clone(),
            bundle_url: config.bundle_url.clone(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<T, Error> {
        let req = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: 1,
            method,
            params,
        };

        trace!("RPC request: {:?}", req);

        let resp = self.inner.post(url).json(&req).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "HTTP status {} returned for {method}",
                resp.status()
            )));
        }

        let resp: JsonRpcResponse = resp.json().await?;
        if let Some(e) = resp.error {
            debug!("RPC error for {method}: {} ({})", e.message, e.code);
            return Err(Error::SendTransaction(e.message));
        }

        let result = resp
            .result
            .ok_or_else(|| Error::Network(format!("empty response for {method}")))?;

        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl Rpc for JsonRpcClient {
    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, Error> {
        let params = json!([tx.to_base64(), { "encoding": "base64", "maxRetries": 0 }]);

        let s: String = self.request(&self.url, "sendTransaction", params).await?;

        s.parse::<Signature>()
            .map_err(|e| Error::Network(format!("invalid signature {s}: {e}")))
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, Error> {
        let params = json!([[signature.to_string()], { "searchTransactionHistory": false }]);

        // Status errors are never definitive rejections
        let r: WithContext<Vec<Option<SignatureStatus>>> =
            match self.request(&self.url, "getSignatureStatuses", params).await {
                Ok(r) => r,
                Err(Error::SendTransaction(e)) => return Err(Error::Network(e)),
                Err(e) => return Err(e),
            };

        Ok(r.value.into_iter().next().flatten())
    }
}

#[async_trait]
impl BundleRelay for JsonRpcClient {
    async fn send_bundle(&self, transactions: &[String]) -> Result<String, Error> {
        let params = json!([transactions, { "encoding": "base64" }]);

        match self.request(&self.bundle_url, "sendBundle", params).await {
            Err(Error::SendTransaction(e)) => Err(Error::BundleFailed(e)),
            r => r,
        }
    }

    async fn get_bundle_status(&self, bundle_id: &str) -> Result<BundleStatus, Error> {
        let params = json!([[bundle_id]]);

        let r: WithContext<Vec<InflightBundleStatus>> = match self
            .request(&self.bundle_url, "getInflightBundleStatuses", params)
            .await
        {
            Ok(r) => r,
            Err(Error::SendTransaction(e)) => return Err(Error::Network(e)),
            Err(e) => return Err(e),
        };

        Ok(r
            .value
            .into_iter()
            .next()
            .map(|s| s.status)
            .unwrap_or(BundleStatus::Invalid))
    }
}
