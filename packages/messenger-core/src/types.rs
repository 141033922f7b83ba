use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// 链标识（32 字节）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(#[serde(with = "hex_bytes")] pub [u8; 32]);

/// 合约或账户地址（20 字节）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex_bytes")] pub [u8; 20]);

/// 消息哈希（SHA-256）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHash(#[serde(with = "hex_bytes")] pub [u8; 32]);

macro_rules! impl_fixed_bytes {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const ZERO: Self = Self([0u8; $len]);

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn from_hex(s: &str) -> Result<Self, Error> {
                decode_fixed::<$len>(s)
                    .map(Self)
                    .map_err(|e| Error::Serialization(format!("Invalid {}: {}", stringify!($name), e)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }
    };
}

impl_fixed_bytes!(ChainId, 32);
impl_fixed_bytes!(Address, 20);
impl_fixed_bytes!(MessageHash, 32);

/// 源链内递增分配的消息编号，从 1 开始，永不复用
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    /// 编号空间耗尽时返回 None
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(MessageId)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 投递记录的主键：(源链, 消息编号)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    pub source_chain_id: ChainId,
    pub message_id: MessageId,
}

impl MessageKey {
    pub fn new(source_chain_id: ChainId, message_id: MessageId) -> Self {
        Self { source_chain_id, message_id }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source_chain_id, self.message_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainMessage {
    pub message_id: MessageId,
    pub source_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    pub sender: Address,
    pub target: Address,
    pub value: u128,
    pub gas_limit: u64,
    pub payload: Vec<u8>,
}

impl CrossChainMessage {
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.source_chain_id, self.message_id)
    }

    /// 对完整消息内容做哈希，重试时用于校验调用方提供的消息未被篡改
    pub fn hash(&self) -> MessageHash {
        let mut hasher = Sha256::new();
        hasher.update(self.message_id.0.to_be_bytes());
        hasher.update(self.source_chain_id.0);
        hasher.update(self.destination_chain_id.0);
        hasher.update(self.sender.0);
        hasher.update(self.target.0);
        hasher.update(self.value.to_be_bytes());
        hasher.update(self.gas_limit.to_be_bytes());
        hasher.update((self.payload.len() as u64).to_be_bytes());
        hasher.update(&self.payload);
        MessageHash(hasher.finalize().into())
    }

    pub fn payload_hash(&self) -> MessageHash {
        payload_hash(&self.payload)
    }
}

pub fn payload_hash(payload: &[u8]) -> MessageHash {
    MessageHash(Sha256::digest(payload).into())
}

/// 源链上 `send` 的输入
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub destination_chain_id: ChainId,
    pub target: Address,
    pub sender: Address,
    pub value: u128,
    pub gas_limit: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded)
    }

    /// 状态只能单调前进：Pending -> {Succeeded, Failed}，Failed -> {Failed, Succeeded}
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Succeeded) | (Pending, Failed) | (Failed, Failed) | (Failed, Succeeded)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub delivered: bool,
    pub execution_status: ExecutionStatus,
    pub message_hash: MessageHash,
    /// 执行尝试次数（首次投递 + 重试）
    pub attempts: u32,
}

/// 目标合约调用失败。不区分原因（回滚、gas 耗尽、地址无代码），reason 只用于日志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub key: MessageKey,
    pub status: ExecutionStatus,
    pub failure: Option<ExecutionFailure>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected {} bytes, got {}", N, b.len()))
}

mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_fixed::<N>(&s).map_err(serde::de::Error::custom)
    }
}
