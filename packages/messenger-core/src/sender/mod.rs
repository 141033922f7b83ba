use log::info;

use crate::{
    ledger::{MessengerEvent, Transaction},
    types::{CrossChainMessage, SendRequest},
    Error, ProtocolError,
};

pub const MAX_GAS_LIMIT: u64 = 30_000_000;

fn validate_request(request: &SendRequest) -> Result<(), ProtocolError> {
    if request.destination_chain_id.is_zero() {
        return Err(ProtocolError::InvalidMessage("zero destination chain ID".to_string()));
    }
    if request.target.is_zero() {
        return Err(ProtocolError::InvalidMessage("zero target address".to_string()));
    }
    if request.gas_limit == 0 {
        return Err(ProtocolError::InvalidMessage("zero gas limit".to_string()));
    }
    if request.gas_limit > MAX_GAS_LIMIT {
        return Err(ProtocolError::InvalidMessage(format!(
            "gas limit {} exceeds maximum {}",
            request.gas_limit, MAX_GAS_LIMIT
        )));
    }
    Ok(())
}

/// 在源链上分配消息编号并写入 `Sent` 事件
pub fn send(tx: &mut Transaction, request: SendRequest) -> Result<CrossChainMessage, Error> {
    validate_request(&request)?;

    let message_id = tx
        .state
        .last_message_id
        .next()
        .ok_or_else(|| ProtocolError::InvalidMessage("message id space exhausted".to_string()))?;
    tx.state.last_message_id = message_id;

    let message = CrossChainMessage {
        message_id,
        source_chain_id: tx.chain_id(),
        destination_chain_id: request.destination_chain_id,
        sender: request.sender,
        target: request.target,
        value: request.value,
        gas_limit: request.gas_limit,
        payload: request.payload,
    };
    tx.emit(MessengerEvent::sent(&message));
    info!(
        "Sent message {} from {} to {}",
        message.key(),
        message.source_chain_id,
        message.destination_chain_id
    );
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::{Address, ChainId, MessageId},
        Ledger,
    };

    fn request() -> SendRequest {
        SendRequest {
            destination_chain_id: ChainId([2u8; 32]),
            target: Address([4u8; 20]),
            sender: Address([3u8; 20]),
            value: 0,
            gas_limit: 300_000,
            payload: b"payload".to_vec(),
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut ledger = Ledger::new(ChainId([1u8; 32]));
        let first = ledger.send(request()).unwrap();
        let second = ledger.send(request()).unwrap();
        assert_eq!(first.message_id, MessageId(1));
        assert_eq!(second.message_id, MessageId(2));
        assert_eq!(first.source_chain_id, ChainId([1u8; 32]));

        let events = ledger.events().all();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sent_message(), Some(first.clone()));
        match &events[0] {
            MessengerEvent::Sent { payload_hash, .. } => assert_eq!(*payload_hash, first.payload_hash()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_invalid_requests_are_rejected() {
        let mut ledger = Ledger::new(ChainId([1u8; 32]));

        let mut bad = request();
        bad.destination_chain_id = ChainId::ZERO;
        assert!(matches!(
            ledger.send(bad),
            Err(Error::Protocol(ProtocolError::InvalidMessage(_)))
        ));

        let mut bad = request();
        bad.gas_limit = 0;
        assert!(ledger.send(bad).is_err());

        let mut bad = request();
        bad.target = Address::ZERO;
        assert!(ledger.send(bad).is_err());

        let mut bad = request();
        bad.gas_limit = MAX_GAS_LIMIT + 1;
        assert!(ledger.send(bad).is_err());

        // 被拒绝的请求不消耗编号，也不产生事件
        assert!(ledger.events().all().is_empty());
        assert_eq!(ledger.send(request()).unwrap().message_id, MessageId(1));
    }

    #[test]
    fn test_exhausted_id_space_is_rejected() {
        let mut ledger = Ledger::new(ChainId([1u8; 32]));
        ledger
            .transact(|tx| {
                tx.state.last_message_id = MessageId(u64::MAX);
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            ledger.send(request()),
            Err(Error::Protocol(ProtocolError::InvalidMessage(_)))
        ));
        assert!(ledger.events().all().is_empty());
    }
}
