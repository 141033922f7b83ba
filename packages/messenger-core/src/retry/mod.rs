use log::info;

use crate::{
    executor,
    ledger::Transaction,
    types::{CrossChainMessage, DeliveryOutcome},
    Error,
};

/// 重试一条已投递但执行失败的消息
///
/// 任何人都可以调用，次数不限。调用方提供的消息必须与投递时登记的哈希一致；
/// 已成功执行的消息返回 `AlreadyExecuted`。重试只改变执行状态，不触碰投递标记。
pub fn retry_message_execution(tx: &mut Transaction, message: &CrossChainMessage) -> Result<DeliveryOutcome, Error> {
    let key = message.key();
    tx.state.registry.check_retryable(&key, &message.hash())?;
    info!("Retrying execution of message {}", key);
    executor::execute_message(tx, message)
}
