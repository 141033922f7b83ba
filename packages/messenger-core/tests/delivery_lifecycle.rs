//! 端到端场景：源链发送 -> 中继 -> 目标链投递 -> 部署合约 -> 重试执行

use std::sync::Arc;

use messenger_core::{
    chain_adapter::{ChainAdapter, LocalAdapter},
    config::RelayerConfig,
    contracts::{ExampleMessenger, RevertingContract},
    relayer::Relayer,
    Address, ChainId, Error, ExecutionStatus, MessengerEvent, ProtocolError, SendRequest,
};

const CHAIN_A: ChainId = ChainId([0xaa; 32]);
const CHAIN_B: ChainId = ChainId([0xbb; 32]);
const DEPLOYER: Address = Address([0xde; 20]);
const SENDER: Address = Address([0x5e; 20]);

fn relayer_config() -> RelayerConfig {
    RelayerConfig {
        poll_interval: 1,
        max_retries: 3,
        retry_delay: 0,
        retry_failed_executions: false,
    }
}

fn setup() -> (LocalAdapter, LocalAdapter, Relayer) {
    let a = LocalAdapter::with_new_ledger(CHAIN_A);
    let b = LocalAdapter::with_new_ledger(CHAIN_B);
    let relayer = Relayer::with_adapters(
        relayer_config(),
        vec![Arc::new(a.clone()) as Arc<dyn ChainAdapter>, Arc::new(b.clone())],
    );
    (a, b, relayer)
}

#[tokio::test]
async fn test_deliver_to_nonexistent_contract_then_retry() {
    let (a, b, relayer) = setup();

    // 目标合约尚未部署，先推导出它将来的地址
    let destination = b.ledger().read().await.next_contract_address(&DEPLOYER);

    let sent = a
        .ledger()
        .write()
        .await
        .send(SendRequest {
            destination_chain_id: CHAIN_B,
            target: destination,
            sender: SENDER,
            value: 0,
            gas_limit: 300_000,
            payload: ExampleMessenger::encode_message("Hello, world!").unwrap(),
        })
        .unwrap();

    let report = relayer.poll_once().await;
    assert_eq!(report.delivered, 1);

    // 已投递，但执行失败
    assert!(b.is_delivered(CHAIN_A, sent.message_id).await.unwrap());
    let failed = b.fetch_failed_messages(0).await.unwrap();
    assert_eq!(failed.messages, vec![sent.clone()]);
    {
        let ledger = b.ledger();
        let ledger = ledger.read().await;
        let record = ledger.delivery_record(&sent.key()).unwrap();
        assert_eq!(record.execution_status, ExecutionStatus::Failed);
    }

    // 在推导出的地址上部署合约
    let deployed = b
        .ledger()
        .write()
        .await
        .deploy(DEPLOYER, Box::new(ExampleMessenger::new()));
    assert_eq!(deployed, destination);

    // 用失败事件携带的消息重试
    let outcome = b
        .retry_message_execution(failed.messages[0].clone())
        .await
        .unwrap();
    assert!(outcome.is_success());

    let ledger = b.ledger();
    let ledger = ledger.read().await;
    let contract = ledger.contract::<ExampleMessenger>(&destination).unwrap();
    let received = contract.current_message(&CHAIN_A).unwrap();
    assert_eq!(received.message, "Hello, world!");
    assert_eq!(received.sender, SENDER);
    assert_eq!(
        ledger.delivery_record(&sent.key()).unwrap().execution_status,
        ExecutionStatus::Succeeded
    );
}

#[tokio::test]
async fn test_relay_is_idempotent() {
    let (a, b, relayer) = setup();
    let target = b
        .ledger()
        .write()
        .await
        .deploy(DEPLOYER, Box::new(ExampleMessenger::new()));

    let sent = a
        .ledger()
        .write()
        .await
        .send(SendRequest {
            destination_chain_id: CHAIN_B,
            target,
            sender: SENDER,
            value: 0,
            gas_limit: 300_000,
            payload: ExampleMessenger::encode_message("once").unwrap(),
        })
        .unwrap();

    assert_eq!(relayer.poll_once().await.delivered, 1);

    // 第二个中继器从头重放同一事件流
    let competing = Relayer::with_adapters(
        relayer_config(),
        vec![Arc::new(a.clone()) as Arc<dyn ChainAdapter>, Arc::new(b.clone())],
    );
    let report = competing.poll_once().await;
    assert_eq!(report.delivered, 0);
    assert_eq!(report.already_delivered, 1);

    // 直接重复投递被拒绝，记录不变
    let before = b.ledger().read().await.delivery_record(&sent.key()).cloned();
    let err = b.deliver_message(sent.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::DuplicateDelivery { .. })
    ));
    assert_eq!(b.ledger().read().await.delivery_record(&sent.key()).cloned(), before);

    let delivered_events = b
        .ledger()
        .read()
        .await
        .events()
        .all()
        .iter()
        .filter(|e| matches!(e, MessengerEvent::Delivered { .. }))
        .count();
    assert_eq!(delivered_events, 1);
}

#[tokio::test]
async fn test_tampered_retry_rejected() {
    let (a, b, relayer) = setup();
    let destination = b.ledger().read().await.next_contract_address(&DEPLOYER);
    let sent = a
        .ledger()
        .write()
        .await
        .send(SendRequest {
            destination_chain_id: CHAIN_B,
            target: destination,
            sender: SENDER,
            value: 0,
            gas_limit: 300_000,
            payload: ExampleMessenger::encode_message("Hello, world!").unwrap(),
        })
        .unwrap();
    relayer.poll_once().await;
    b.ledger()
        .write()
        .await
        .deploy(DEPLOYER, Box::new(ExampleMessenger::new()));

    let mut tampered = sent.clone();
    tampered.payload = ExampleMessenger::encode_message("Hello, moon!").unwrap();
    let err = b.retry_message_execution(tampered).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::MessagePayloadMismatch { .. })
    ));

    assert!(b.retry_message_execution(sent).await.unwrap().is_success());
}

#[tokio::test]
async fn test_concurrent_retries_have_one_winner() {
    let (a, b, relayer) = setup();
    let destination = b.ledger().read().await.next_contract_address(&DEPLOYER);
    let sent = a
        .ledger()
        .write()
        .await
        .send(SendRequest {
            destination_chain_id: CHAIN_B,
            target: destination,
            sender: SENDER,
            value: 0,
            gas_limit: 300_000,
            payload: ExampleMessenger::encode_message("race").unwrap(),
        })
        .unwrap();
    relayer.poll_once().await;
    b.ledger()
        .write()
        .await
        .deploy(DEPLOYER, Box::new(ExampleMessenger::new()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let adapter = b.clone();
            let message = sent.clone();
            tokio::spawn(async move { adapter.retry_message_execution(message).await })
        })
        .collect();

    let mut winners = 0;
    let mut already_executed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                assert!(outcome.is_success());
                winners += 1;
            }
            Err(Error::Protocol(ProtocolError::AlreadyExecuted { .. })) => already_executed += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(already_executed, 7);
}

#[tokio::test]
async fn test_relayer_retries_failed_executions() {
    let a = LocalAdapter::with_new_ledger(CHAIN_A);
    let b = LocalAdapter::with_new_ledger(CHAIN_B);
    let mut config = relayer_config();
    config.retry_failed_executions = true;
    let relayer = Relayer::with_adapters(
        config,
        vec![Arc::new(a.clone()) as Arc<dyn ChainAdapter>, Arc::new(b.clone())],
    );

    let destination = b.ledger().read().await.next_contract_address(&DEPLOYER);
    let sent = a
        .ledger()
        .write()
        .await
        .send(SendRequest {
            destination_chain_id: CHAIN_B,
            target: destination,
            sender: SENDER,
            value: 0,
            gas_limit: 300_000,
            payload: ExampleMessenger::encode_message("eventually").unwrap(),
        })
        .unwrap();

    // 第一轮：投递失败，并立即重试一次（仍失败）
    let report = relayer.poll_once().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.retried, 1);

    b.ledger()
        .write()
        .await
        .deploy(DEPLOYER, Box::new(ExampleMessenger::new()));

    // 第二轮：新的失败事件触发重试，成功
    let report = relayer.poll_once().await;
    assert_eq!(report.retried, 1);

    let ledger = b.ledger();
    let ledger = ledger.read().await;
    assert_eq!(
        ledger.delivery_record(&sent.key()).unwrap().execution_status,
        ExecutionStatus::Succeeded
    );
    assert_eq!(
        ledger
            .contract::<ExampleMessenger>(&destination)
            .unwrap()
            .current_message(&CHAIN_A)
            .unwrap()
            .message,
        "eventually"
    );

    // 第三轮：没有新的失败事件
    assert_eq!(relayer.poll_once().await.retried, 0);
}

#[tokio::test]
async fn test_relayer_stops_retrying_reverting_target() {
    let a = LocalAdapter::with_new_ledger(CHAIN_A);
    let b = LocalAdapter::with_new_ledger(CHAIN_B);
    let mut config = relayer_config();
    config.retry_failed_executions = true;
    let max_retries = config.max_retries as usize;
    let relayer = Relayer::with_adapters(
        config,
        vec![Arc::new(a.clone()) as Arc<dyn ChainAdapter>, Arc::new(b.clone())],
    );

    let target = b
        .ledger()
        .write()
        .await
        .deploy(DEPLOYER, Box::new(RevertingContract::new("always")));
    let sent = a
        .ledger()
        .write()
        .await
        .send(SendRequest {
            destination_chain_id: CHAIN_B,
            target,
            sender: SENDER,
            value: 0,
            gas_limit: 300_000,
            payload: b"doomed".to_vec(),
        })
        .unwrap();

    let mut retried = 0;
    let mut abandoned = 0;
    for _ in 0..10 {
        let report = relayer.poll_once().await;
        retried += report.retried;
        abandoned += report.abandoned;
    }
    assert_eq!(retried, max_retries);
    assert_eq!(abandoned, 1);

    // 一次投递失败加上有限次重试失败，之后不再产生事件
    let ledger = b.ledger();
    let ledger = ledger.read().await;
    let failed_events = ledger
        .events()
        .all()
        .iter()
        .filter(|e| matches!(e, MessengerEvent::ExecutionFailed { .. }))
        .count();
    assert_eq!(failed_events, max_retries + 1);

    let record = ledger.delivery_record(&sent.key()).unwrap();
    assert_eq!(record.execution_status, ExecutionStatus::Failed);
    assert_eq!(record.attempts as usize, max_retries + 1);
}
