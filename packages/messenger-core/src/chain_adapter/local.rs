use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::{
    ledger::Ledger,
    types::{ChainId, CrossChainMessage, DeliveryOutcome, MessageId},
    Error,
};
use super::{ChainAdapter, MessageBatch};

/// 进程内账本适配器。账本的写锁即交易的串行化点
#[derive(Clone)]
pub struct LocalAdapter {
    chain_id: ChainId,
    ledger: Arc<RwLock<Ledger>>,
}

impl LocalAdapter {
    pub fn new(ledger: Arc<RwLock<Ledger>>, chain_id: ChainId) -> Self {
        Self { chain_id, ledger }
    }

    pub fn with_new_ledger(chain_id: ChainId) -> Self {
        Self::new(Arc::new(RwLock::new(Ledger::new(chain_id))), chain_id)
    }

    pub fn ledger(&self) -> Arc<RwLock<Ledger>> {
        self.ledger.clone()
    }
}

#[async_trait]
impl ChainAdapter for LocalAdapter {
    fn chain_type(&self) -> &'static str {
        "local"
    }

    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn fetch_sent_messages(&self, cursor: u64) -> Result<MessageBatch, Error> {
        let ledger = self.ledger.read().await;
        let log = ledger.events();
        Ok(MessageBatch {
            messages: log.since(cursor).iter().filter_map(|e| e.sent_message()).collect(),
            next_cursor: log.cursor(),
        })
    }

    async fn fetch_failed_messages(&self, cursor: u64) -> Result<MessageBatch, Error> {
        let ledger = self.ledger.read().await;
        let log = ledger.events();
        Ok(MessageBatch {
            messages: log
                .since(cursor)
                .iter()
                .filter_map(|e| e.failed_message().cloned())
                .collect(),
            next_cursor: log.cursor(),
        })
    }

    async fn deliver_message(&self, message: CrossChainMessage) -> Result<DeliveryOutcome, Error> {
        self.ledger.write().await.deliver(&message)
    }

    async fn retry_message_execution(&self, message: CrossChainMessage) -> Result<DeliveryOutcome, Error> {
        self.ledger.write().await.retry_message_execution(&message)
    }

    async fn is_delivered(&self, source_chain_id: ChainId, message_id: MessageId) -> Result<bool, Error> {
        Ok(self.ledger.read().await.is_delivered(source_chain_id, message_id))
    }
}
