use std::any::Any;
use std::fmt;

use crate::types::{Address, ChainId, MessageId};

pub mod example_messenger;

pub use example_messenger::ExampleMessenger;

/// 每次合约调用的固定开销
pub const BASE_CALL_GAS: u64 = 21_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("execution reverted: {0}")]
    Revert(String),

    #[error("out of gas: limit {limit}, required {required}")]
    OutOfGas { limit: u64, required: u64 },

    #[error("no contract code at {0}")]
    NoCode(Address),
}

/// 调用目标合约时携带的上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub chain_id: ChainId,
    pub source_chain_id: ChainId,
    pub message_id: MessageId,
    pub origin_sender: Address,
    pub value: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn charge(&mut self, amount: u64) -> Result<(), ContractError> {
        let required = self.used.saturating_add(amount);
        if required > self.limit {
            self.used = self.limit;
            return Err(ContractError::OutOfGas { limit: self.limit, required });
        }
        self.used = required;
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }
}

/// 目标链上可接收跨链消息的合约
///
/// 合约状态通过 `clone_box` 暂存：执行器在副本上调用，成功后才替换原合约，
/// 失败时原合约保持不变。
pub trait TargetContract: Send + Sync + fmt::Debug {
    fn receive_message(
        &mut self,
        ctx: &CallContext,
        payload: &[u8],
        gas: &mut GasMeter,
    ) -> Result<(), ContractError>;

    fn clone_box(&self) -> Box<dyn TargetContract>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn TargetContract> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// 总是回滚的合约
#[derive(Debug, Clone, Default)]
pub struct RevertingContract {
    pub reason: String,
}

impl RevertingContract {
    pub fn new(reason: &str) -> Self {
        Self { reason: reason.to_string() }
    }
}

impl TargetContract for RevertingContract {
    fn receive_message(&mut self, _ctx: &CallContext, _payload: &[u8], _gas: &mut GasMeter) -> Result<(), ContractError> {
        Err(ContractError::Revert(self.reason.clone()))
    }

    fn clone_box(&self) -> Box<dyn TargetContract> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_meter_limit() {
        let mut gas = GasMeter::new(100);
        gas.charge(60).unwrap();
        assert_eq!(gas.remaining(), 40);
        assert_eq!(
            gas.charge(41),
            Err(ContractError::OutOfGas { limit: 100, required: 101 })
        );
        assert_eq!(gas.used(), 100);
    }

    #[test]
    fn test_boxed_contract_clone_is_independent() {
        let original: Box<dyn TargetContract> = Box::new(RevertingContract::new("nope"));
        let copy = original.clone();
        let reverting = copy.as_any().downcast_ref::<RevertingContract>().unwrap();
        assert_eq!(reverting.reason, "nope");
    }
}
