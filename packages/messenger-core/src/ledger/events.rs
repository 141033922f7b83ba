use serde::{Deserialize, Serialize};

use crate::types::{Address, ChainId, CrossChainMessage, MessageHash, MessageId, MessageKey};

/// 信使合约写入事件日志的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessengerEvent {
    Sent {
        source_chain_id: ChainId,
        destination_chain_id: ChainId,
        message_id: MessageId,
        sender: Address,
        target: Address,
        value: u128,
        gas_limit: u64,
        payload_hash: MessageHash,
        payload: Vec<u8>,
    },
    Delivered {
        source_chain_id: ChainId,
        message_id: MessageId,
    },
    ExecutionSucceeded {
        source_chain_id: ChainId,
        message_id: MessageId,
    },
    /// 携带完整消息，任何人都可以据此重试，无需回源链查询
    ExecutionFailed {
        source_chain_id: ChainId,
        message_id: MessageId,
        message: CrossChainMessage,
    },
}

impl MessengerEvent {
    pub fn sent(message: &CrossChainMessage) -> Self {
        MessengerEvent::Sent {
            source_chain_id: message.source_chain_id,
            destination_chain_id: message.destination_chain_id,
            message_id: message.message_id,
            sender: message.sender,
            target: message.target,
            value: message.value,
            gas_limit: message.gas_limit,
            payload_hash: message.payload_hash(),
            payload: message.payload.clone(),
        }
    }

    pub fn key(&self) -> MessageKey {
        match self {
            MessengerEvent::Sent { source_chain_id, message_id, .. }
            | MessengerEvent::Delivered { source_chain_id, message_id }
            | MessengerEvent::ExecutionSucceeded { source_chain_id, message_id }
            | MessengerEvent::ExecutionFailed { source_chain_id, message_id, .. } => {
                MessageKey::new(*source_chain_id, *message_id)
            }
        }
    }

    /// 从 `Sent` 事件还原出完整消息
    pub fn sent_message(&self) -> Option<CrossChainMessage> {
        match self {
            MessengerEvent::Sent {
                source_chain_id,
                destination_chain_id,
                message_id,
                sender,
                target,
                value,
                gas_limit,
                payload,
                ..
            } => Some(CrossChainMessage {
                message_id: *message_id,
                source_chain_id: *source_chain_id,
                destination_chain_id: *destination_chain_id,
                sender: *sender,
                target: *target,
                value: *value,
                gas_limit: *gas_limit,
                payload: payload.clone(),
            }),
            _ => None,
        }
    }

    pub fn failed_message(&self) -> Option<&CrossChainMessage> {
        match self {
            MessengerEvent::ExecutionFailed { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// 只追加的事件日志，游标即事件下标
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Vec<MessengerEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, events: Vec<MessengerEvent>) {
        self.entries.extend(events);
    }

    pub fn all(&self) -> &[MessengerEvent] {
        &self.entries
    }

    pub fn since(&self, cursor: u64) -> &[MessengerEvent] {
        let start = (cursor as usize).min(self.entries.len());
        &self.entries[start..]
    }

    pub fn cursor(&self) -> u64 {
        self.entries.len() as u64
    }
}
