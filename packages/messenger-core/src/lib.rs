pub mod config;
pub mod types;
pub mod registry;
pub mod contracts;
pub mod ledger;
pub mod sender;
pub mod executor;
pub mod retry;
pub mod chain_adapter;
pub mod relayer;

pub use config::Config;
pub use ledger::{Ledger, MessengerEvent};
pub use types::{
    Address, ChainId, CrossChainMessage, DeliveryOutcome, DeliveryRecord, ExecutionStatus, MessageId,
    MessageKey, SendRequest,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl Error {
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Error::Protocol(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_protocol(&self) -> bool {
        self.protocol().is_some()
    }
}

/// 协议层拒绝。出现时整个交易回滚，不留下任何状态变化
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Message {key} has already been delivered")]
    DuplicateDelivery { key: MessageKey },

    #[error("Message {key} has not been delivered")]
    NotYetDelivered { key: MessageKey },

    #[error("Message {key} has already been executed")]
    AlreadyExecuted { key: MessageKey },

    #[error("Message {key} does not match the delivered message")]
    MessagePayloadMismatch { key: MessageKey },

    #[error("Invalid execution status transition: {from} -> {to}")]
    InvalidStatusTransition { from: ExecutionStatus, to: ExecutionStatus },
}

impl ProtocolError {
    /// 稳定的错误类别名，RPC 适配器用它在进程间传递错误
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::InvalidMessage(_) => "invalid_message",
            ProtocolError::DuplicateDelivery { .. } => "duplicate_delivery",
            ProtocolError::NotYetDelivered { .. } => "not_yet_delivered",
            ProtocolError::AlreadyExecuted { .. } => "already_executed",
            ProtocolError::MessagePayloadMismatch { .. } => "message_payload_mismatch",
            ProtocolError::InvalidStatusTransition { .. } => "invalid_status_transition",
        }
    }
}
