use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use log::warn;
use crate::{
    types::{Address, ChainId, CrossChainMessage, DeliveryOutcome, ExecutionStatus, MessageId, MessageKey},
    Error, ProtocolError,
};
use super::{ChainAdapter, MessageBatch};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// 通过 JSON-RPC 访问远端节点上的信使合约
pub struct RpcAdapter {
    rpc_url: String,
    chain_id: ChainId,
    messenger_address: Address,
    client: reqwest::Client,
    request_id: AtomicU64,
    retry_delay: Duration,
}

impl RpcAdapter {
    pub fn new(rpc_url: &str, chain_id: ChainId, messenger_address: Address) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            chain_id,
            messenger_address,
            client: reqwest::Client::new(),
            request_id: AtomicU64::new(1),
            retry_delay: RETRY_DELAY,
        }
    }

    /// 指数退避的基础延迟
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    // 只重试传输层错误，协议错误直接返回
    async fn retry_with_backoff<F, Fut, T>(&self, operation: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_protocol() => return Err(e),
                Err(e) => {
                    retries += 1;
                    if retries >= MAX_RETRIES {
                        return Err(e);
                    }
                    warn!("RPC call to {} failed (attempt {}/{}): {}", self.rpc_url, retries, MAX_RETRIES, e);
                    sleep(self.retry_delay * 2u32.pow(retries - 1)).await;
                }
            }
        }
    }

    async fn call<T: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: serde_json::Value,
        key: Option<MessageKey>,
    ) -> Result<T, Error> {
        let params = &params;
        self.retry_with_backoff(|| async move {
            let id = self.request_id.fetch_add(1, Ordering::Relaxed);
            let response = self
                .client
                .post(&self.rpc_url)
                .json(&serde_json::json!({
                    "jsonrpc": "2.0",
                    "method": method,
                    "params": params,
                    "id": id
                }))
                .send()
                .await
                .map_err(|e| Error::Network(e.to_string()))?;

            if !response.status().is_success() {
                return Err(Error::Network(format!("HTTP {} from {}", response.status(), self.rpc_url)));
            }

            let result: serde_json::Value = response
                .json()
                .await
                .map_err(|e| Error::Chain(e.to_string()))?;

            if let Some(error) = result.get("error") {
                return Err(map_rpc_error(error, key));
            }

            let value = result
                .get("result")
                .cloned()
                .ok_or_else(|| Error::Chain(format!("Missing result in response to {}", method)))?;
            serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
        })
        .await
    }
}

/// 把远端返回的 `error.data.kind` 还原为协议错误
///
/// 带类别的错误都是协议拒绝，不做传输层重试；缺少消息键或状态字段时退化为 `InvalidMessage`
fn map_rpc_error(error: &serde_json::Value, key: Option<MessageKey>) -> Error {
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error")
        .to_string();
    let data = error.get("data");
    let kind = data.and_then(|d| d.get("kind")).and_then(|k| k.as_str());
    let status = |field: &str| -> Option<ExecutionStatus> {
        data.and_then(|d| d.get(field))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    };

    let protocol = match (kind, key) {
        (Some("invalid_message"), _) => ProtocolError::InvalidMessage(message),
        (Some("duplicate_delivery"), Some(key)) => ProtocolError::DuplicateDelivery { key },
        (Some("not_yet_delivered"), Some(key)) => ProtocolError::NotYetDelivered { key },
        (Some("already_executed"), Some(key)) => ProtocolError::AlreadyExecuted { key },
        (Some("message_payload_mismatch"), Some(key)) => ProtocolError::MessagePayloadMismatch { key },
        (Some("invalid_status_transition"), _) => match (status("from"), status("to")) {
            (Some(from), Some(to)) => ProtocolError::InvalidStatusTransition { from, to },
            _ => ProtocolError::InvalidMessage(message),
        },
        (Some("duplicate_delivery" | "not_yet_delivered" | "already_executed" | "message_payload_mismatch"), None) => {
            ProtocolError::InvalidMessage(message)
        }
        _ => return Error::Chain(format!("Transaction failed: {}", message)),
    };
    Error::Protocol(protocol)
}

#[async_trait]
impl ChainAdapter for RpcAdapter {
    fn chain_type(&self) -> &'static str {
        "rpc"
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn fetch_sent_messages(&self, cursor: u64) -> Result<MessageBatch, Error> {
        self.call(
            "messenger_getSentMessages",
            serde_json::json!([{ "messenger_address": self.messenger_address, "cursor": cursor }]),
            None,
        )
        .await
    }

    async fn fetch_failed_messages(&self, cursor: u64) -> Result<MessageBatch, Error> {
        self.call(
            "messenger_getFailedMessages",
            serde_json::json!([{ "messenger_address": self.messenger_address, "cursor": cursor }]),
            None,
        )
        .await
    }

    async fn deliver_message(&self, message: CrossChainMessage) -> Result<DeliveryOutcome, Error> {
        let key = message.key();
        let message = serde_json::to_value(&message).map_err(|e| Error::Serialization(e.to_string()))?;
        self.call(
            "messenger_deliverMessage",
            serde_json::json!([{ "messenger_address": self.messenger_address, "message": message }]),
            Some(key),
        )
        .await
    }

    async fn retry_message_execution(&self, message: CrossChainMessage) -> Result<DeliveryOutcome, Error> {
        let key = message.key();
        let message = serde_json::to_value(&message).map_err(|e| Error::Serialization(e.to_string()))?;
        self.call(
            "messenger_retryMessageExecution",
            serde_json::json!([{ "messenger_address": self.messenger_address, "message": message }]),
            Some(key),
        )
        .await
    }

    async fn is_delivered(&self, source_chain_id: ChainId, message_id: MessageId) -> Result<bool, Error> {
        self.call(
            "messenger_messageReceived",
            serde_json::json!([{
                "messenger_address": self.messenger_address,
                "source_chain_id": source_chain_id,
                "message_id": message_id
            }]),
            None,
        )
        .await
    }
}
