use std::collections::HashMap;

use log::debug;

use crate::{
    types::{DeliveryRecord, ExecutionStatus, MessageHash, MessageKey},
    ProtocolError,
};

/// 目标链上的消息投递登记表，键为 (源链, 消息编号)
///
/// 记录一旦创建永不删除；`delivered` 只会从 false 变为 true 一次，
/// 执行状态只能单调前进（Failed 可变为 Succeeded，Succeeded 为终态）。
#[derive(Debug, Clone, Default)]
pub struct MessageRegistry {
    records: HashMap<MessageKey, DeliveryRecord>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MessageKey) -> Option<&DeliveryRecord> {
        self.records.get(key)
    }

    pub fn is_delivered(&self, key: &MessageKey) -> bool {
        self.records.get(key).map(|r| r.delivered).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 首次投递时创建记录，已存在则拒绝
    pub fn record_delivery(&mut self, key: MessageKey, message_hash: MessageHash) -> Result<(), ProtocolError> {
        if self.records.contains_key(&key) {
            return Err(ProtocolError::DuplicateDelivery { key });
        }
        debug!("Recording delivery of message {}", key);
        self.records.insert(
            key,
            DeliveryRecord {
                delivered: true,
                execution_status: ExecutionStatus::Pending,
                message_hash,
                attempts: 0,
            },
        );
        Ok(())
    }

    /// 重试前的检查：已投递、未成功、消息哈希一致
    pub fn check_retryable(&self, key: &MessageKey, message_hash: &MessageHash) -> Result<(), ProtocolError> {
        let record = match self.records.get(key) {
            Some(record) if record.delivered => record,
            _ => return Err(ProtocolError::NotYetDelivered { key: *key }),
        };
        if record.execution_status == ExecutionStatus::Succeeded {
            return Err(ProtocolError::AlreadyExecuted { key: *key });
        }
        if record.message_hash != *message_hash {
            return Err(ProtocolError::MessagePayloadMismatch { key: *key });
        }
        Ok(())
    }

    /// 记录一次执行尝试的结果
    pub fn record_execution(&mut self, key: &MessageKey, status: ExecutionStatus) -> Result<&DeliveryRecord, ProtocolError> {
        let record = self
            .records
            .get_mut(key)
            .ok_or(ProtocolError::NotYetDelivered { key: *key })?;
        if !record.execution_status.can_transition_to(status) {
            return Err(ProtocolError::InvalidStatusTransition {
                from: record.execution_status,
                to: status,
            });
        }
        record.execution_status = status;
        record.attempts = record.attempts.saturating_add(1);
        Ok(record)
    }
}
