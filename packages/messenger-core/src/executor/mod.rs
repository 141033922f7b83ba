use log::{info, warn};

use crate::{
    contracts::{CallContext, ContractError, GasMeter, BASE_CALL_GAS},
    ledger::{LedgerState, MessengerEvent, Transaction},
    types::{CrossChainMessage, DeliveryOutcome, ExecutionFailure, ExecutionStatus},
    Error, ProtocolError,
};

/// 首次投递：登记投递记录，然后尝试执行
///
/// 同一 (源链, 消息编号) 只能投递一次，重复投递返回 `DuplicateDelivery`
/// 并回滚整个交易。执行失败不算错误，会被记录为 `Failed` 供之后重试。
pub fn deliver(tx: &mut Transaction, message: &CrossChainMessage) -> Result<DeliveryOutcome, Error> {
    if message.destination_chain_id != tx.chain_id() {
        return Err(ProtocolError::InvalidMessage(format!(
            "message {} is destined for {}, not {}",
            message.key(),
            message.destination_chain_id,
            tx.chain_id()
        ))
        .into());
    }

    let key = message.key();
    tx.state.registry.record_delivery(key, message.hash())?;
    tx.emit(MessengerEvent::Delivered {
        source_chain_id: key.source_chain_id,
        message_id: key.message_id,
    });
    info!("Delivered message {}", key);

    execute_message(tx, message)
}

/// 执行一次目标合约调用并记录结果，首次投递和重试共用
pub(crate) fn execute_message(tx: &mut Transaction, message: &CrossChainMessage) -> Result<DeliveryOutcome, Error> {
    let key = message.key();
    let result = invoke_target(&mut tx.state, message);
    let status = match result {
        Ok(()) => ExecutionStatus::Succeeded,
        Err(_) => ExecutionStatus::Failed,
    };
    tx.state.registry.record_execution(&key, status)?;

    match result {
        Ok(()) => {
            info!("Executed message {} on {}", key, message.target);
            tx.emit(MessengerEvent::ExecutionSucceeded {
                source_chain_id: key.source_chain_id,
                message_id: key.message_id,
            });
            Ok(DeliveryOutcome { key, status, failure: None })
        }
        Err(e) => {
            warn!("Execution of message {} failed: {}", key, e);
            tx.emit(MessengerEvent::ExecutionFailed {
                source_chain_id: key.source_chain_id,
                message_id: key.message_id,
                message: message.clone(),
            });
            Ok(DeliveryOutcome {
                key,
                status,
                failure: Some(ExecutionFailure { reason: e.to_string() }),
            })
        }
    }
}

// 所有失败（无代码、回滚、gas 耗尽）一律归为执行失败。
// 合约在副本上执行，成功才写回。
fn invoke_target(state: &mut LedgerState, message: &CrossChainMessage) -> Result<(), ContractError> {
    let contract = state
        .contracts
        .get(&message.target)
        .ok_or(ContractError::NoCode(message.target))?;
    let mut staged = contract.clone_box();

    let mut gas = GasMeter::new(message.gas_limit);
    gas.charge(BASE_CALL_GAS)?;
    let ctx = CallContext {
        chain_id: state.chain_id,
        source_chain_id: message.source_chain_id,
        message_id: message.message_id,
        origin_sender: message.sender,
        value: message.value,
    };
    staged.receive_message(&ctx, &message.payload, &mut gas)?;

    let balance = state
        .balances
        .get(&message.target)
        .copied()
        .unwrap_or(0)
        .checked_add(message.value)
        .ok_or_else(|| ContractError::Revert("balance overflow".to_string()))?;
    state.balances.insert(message.target, balance);
    state.contracts.insert(message.target, staged);
    Ok(())
}
