use std::any::Any;
use std::collections::HashMap;

use super::{CallContext, ContractError, GasMeter, TargetContract};
use crate::{
    types::{Address, ChainId},
    Error,
};

const GAS_PER_BYTE: u64 = 16;
const STORAGE_GAS: u64 = 20_000;

/// 每条源链最近收到的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub sender: Address,
    pub message: String,
}

/// 示例接收合约：把 BCS 编码的字符串按源链保存下来
#[derive(Debug, Clone, Default)]
pub struct ExampleMessenger {
    messages: HashMap<ChainId, ReceivedMessage>,
}

impl ExampleMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_message(&self, source_chain_id: &ChainId) -> Option<&ReceivedMessage> {
        self.messages.get(source_chain_id)
    }

    pub fn encode_message(message: &str) -> Result<Vec<u8>, Error> {
        bcs::to_bytes(message).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl TargetContract for ExampleMessenger {
    fn receive_message(&mut self, ctx: &CallContext, payload: &[u8], gas: &mut GasMeter) -> Result<(), ContractError> {
        gas.charge(GAS_PER_BYTE * payload.len() as u64)?;
        let message: String = bcs::from_bytes(payload)
            .map_err(|e| ContractError::Revert(format!("malformed payload: {}", e)))?;
        if message.is_empty() {
            return Err(ContractError::Revert("empty message".to_string()));
        }

        gas.charge(STORAGE_GAS)?;
        self.messages.insert(
            ctx.source_chain_id,
            ReceivedMessage {
                sender: ctx.origin_sender,
                message,
            },
        );
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn TargetContract> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
