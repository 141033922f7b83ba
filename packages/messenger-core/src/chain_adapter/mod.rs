use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::{
    types::{ChainId, CrossChainMessage, DeliveryOutcome, MessageId},
    Error,
};

/// 一次事件查询的结果，`next_cursor` 供下次查询使用
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBatch {
    pub messages: Vec<CrossChainMessage>,
    pub next_cursor: u64,
}

/// 链适配器特征，定义了中继器与具体链上信使合约交互所需的基本功能
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// 获取链的类型标识
    fn chain_type(&self) -> &'static str;

    fn chain_id(&self) -> ChainId;

    /// 读取游标之后的 `Sent` 事件
    async fn fetch_sent_messages(&self, cursor: u64) -> Result<MessageBatch, Error>;

    /// 读取游标之后的 `ExecutionFailed` 事件
    async fn fetch_failed_messages(&self, cursor: u64) -> Result<MessageBatch, Error>;

    /// 提交首次投递
    async fn deliver_message(&self, message: CrossChainMessage) -> Result<DeliveryOutcome, Error>;

    /// 提交执行重试
    async fn retry_message_execution(&self, message: CrossChainMessage) -> Result<DeliveryOutcome, Error>;

    /// 查询消息是否已投递
    async fn is_delivered(&self, source_chain_id: ChainId, message_id: MessageId) -> Result<bool, Error>;
}

pub mod local;
pub mod rpc;

pub use local::LocalAdapter;
pub use rpc::RpcAdapter;
