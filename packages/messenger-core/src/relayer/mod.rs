use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use crate::{
    config::{ChainConfig, Config, RelayerConfig, ADAPTER_LOCAL, ADAPTER_RPC},
    types::{ChainId, CrossChainMessage, DeliveryOutcome, MessageKey},
    Error, ProtocolError,
    chain_adapter::{ChainAdapter, RpcAdapter},
};
use tokio::time::{sleep, Duration};
use log::{debug, error, info, warn};

#[async_trait]
pub trait ChainAdapterFactory: Send + Sync {
    async fn create_adapter(&self, config: &ChainConfig) -> Result<Arc<dyn ChainAdapter>, Error>;
}

pub struct DefaultChainAdapterFactory;

#[async_trait]
impl ChainAdapterFactory for DefaultChainAdapterFactory {
    async fn create_adapter(&self, config: &ChainConfig) -> Result<Arc<dyn ChainAdapter>, Error> {
        let chain_id = config.chain_id()?;
        match config.adapter_type.as_str() {
            // 进程内账本无法从配置文件共享，只能通过 `Relayer::with_adapters` 嵌入
            ADAPTER_LOCAL => Err(Error::Config(format!(
                "Chain {} uses an in-process ledger; pass a LocalAdapter to Relayer::with_adapters instead",
                config.name
            ))),
            ADAPTER_RPC => {
                let adapter = RpcAdapter::new(&config.rpc_url, chain_id, config.messenger_address()?);
                Ok(Arc::new(adapter))
            }
            _ => Err(Error::Chain(format!("Unsupported adapter type: {}", config.adapter_type))),
        }
    }
}

/// 单条消息的中继结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResult {
    Delivered(DeliveryOutcome),
    /// 已被投递过（本中继器或其他中继器）
    AlreadyDelivered,
    /// 目标链以协议错误拒绝，不再原样重发
    Rejected(ProtocolError),
}

/// 一轮轮询的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub delivered: usize,
    pub already_delivered: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub retried: usize,
    /// 自动重试次数用尽后放弃的消息
    pub abandoned: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursors {
    sent: u64,
    failed: u64,
}

pub struct Relayer {
    config: RelayerConfig,
    chain_adapters: BTreeMap<ChainId, Arc<dyn ChainAdapter>>,
    cursors: Mutex<HashMap<ChainId, Cursors>>,
    retry_attempts: Mutex<HashMap<MessageKey, u32>>,
}

impl Relayer {
    pub async fn new(config: Config) -> Result<Self, Error> {
        let factory = DefaultChainAdapterFactory;
        let mut adapters = Vec::new();

        for chain in &config.chains {
            let adapter = factory.create_adapter(chain).await?;
            info!("Created {} adapter for chain {} ({})", adapter.chain_type(), chain.name, chain.id);
            adapters.push(adapter);
        }

        Ok(Self::with_adapters(config.relayer, adapters))
    }

    pub fn with_adapters(config: RelayerConfig, adapters: Vec<Arc<dyn ChainAdapter>>) -> Self {
        let chain_adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.chain_id(), adapter))
            .collect();
        Self {
            config,
            chain_adapters,
            cursors: Mutex::new(HashMap::new()),
            retry_attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn adapter(&self, chain_id: &ChainId) -> Option<Arc<dyn ChainAdapter>> {
        self.chain_adapters.get(chain_id).cloned()
    }

    pub async fn start(&self) -> Result<(), Error> {
        info!("Starting relayer for {} chains...", self.chain_adapters.len());

        loop {
            let report = self.poll_once().await;
            if report != PollReport::default() {
                info!("Relayer poll finished: {:?}", report);
            }
            sleep(Duration::from_secs(self.config.poll_interval)).await;
        }
    }

    /// 轮询所有链一次：中继新的 `Sent` 事件，按配置重试执行失败的消息
    pub async fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();
        let mut cursors = self.cursors.lock().await;

        for (chain_id, adapter) in self.chain_adapters.iter() {
            let cursor = cursors.entry(*chain_id).or_default();

            match self.process_chain_events(adapter.as_ref(), cursor.sent, &mut report).await {
                Ok(next) => cursor.sent = next,
                Err(e) => {
                    error!("Failed to process events for chain {}: {}", chain_id, e);
                    report.errors += 1;
                }
            }

            if self.config.retry_failed_executions {
                match self.retry_failed_executions(adapter.as_ref(), cursor.failed, &mut report).await {
                    Ok(next) => cursor.failed = next,
                    Err(e) => {
                        error!("Failed to retry executions on chain {}: {}", chain_id, e);
                        report.errors += 1;
                    }
                }
            }
        }

        report
    }

    // 批次中任一消息因传输错误失败时不推进游标，下一轮整体重放；
    // 已投递的消息会被目标链识别并跳过
    async fn process_chain_events(
        &self,
        adapter: &dyn ChainAdapter,
        cursor: u64,
        report: &mut PollReport,
    ) -> Result<u64, Error> {
        let batch = adapter.fetch_sent_messages(cursor).await?;
        let mut first_error = None;

        for message in batch.messages {
            if !self.chain_adapters.contains_key(&message.destination_chain_id) {
                debug!("Skipping message {} for unknown chain {}", message.key(), message.destination_chain_id);
                report.skipped += 1;
                continue;
            }
            let key = message.key();
            match self.relay_message(message).await {
                Ok(RelayResult::Delivered(_)) => report.delivered += 1,
                Ok(RelayResult::AlreadyDelivered) => report.already_delivered += 1,
                Ok(RelayResult::Rejected(_)) => report.rejected += 1,
                Err(e) => {
                    error!("Failed to relay message {}: {}", key, e);
                    report.errors += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(batch.next_cursor),
        }
    }

    pub async fn relay_message(&self, message: CrossChainMessage) -> Result<RelayResult, Error> {
        let target_chain_id = message.destination_chain_id;
        let target_adapter = self
            .chain_adapters
            .get(&target_chain_id)
            .ok_or_else(|| Error::Chain(format!("Target chain adapter not found: {}", target_chain_id)))?;
        let key = message.key();

        if target_adapter.is_delivered(key.source_chain_id, key.message_id).await? {
            debug!("Message {} already delivered to {}", key, target_chain_id);
            return Ok(RelayResult::AlreadyDelivered);
        }

        // 重试提交消息
        let mut retry_count = 0;
        let max_retries = self.config.max_retries;
        let base_delay = self.config.retry_delay;

        loop {
            match target_adapter.deliver_message(message.clone()).await {
                Ok(outcome) => {
                    info!(
                        "Relayed message {} to {} (execution {})",
                        key, target_chain_id, outcome.status
                    );
                    return Ok(RelayResult::Delivered(outcome));
                }
                Err(Error::Protocol(ProtocolError::DuplicateDelivery { .. })) => {
                    debug!("Message {} was delivered concurrently", key);
                    return Ok(RelayResult::AlreadyDelivered);
                }
                Err(Error::Protocol(e)) => {
                    warn!("Message {} rejected by {}: {}", key, target_chain_id, e);
                    return Ok(RelayResult::Rejected(e));
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= max_retries {
                        error!("Max retries ({}) reached for message relay. Last error: {}", max_retries, e);
                        return Err(Error::Chain(format!("Max retries reached: {}", e)));
                    }

                    let delay = base_delay * retry_count as u64;
                    warn!(
                        "Retry {}/{} for message relay after {} seconds. Error: {}",
                        retry_count, max_retries, delay, e
                    );
                    sleep(Duration::from_secs(delay)).await;
                }
            }
        }
    }

    // 每个 `ExecutionFailed` 事件触发一次重试；重试失败会产生新的事件，下一轮继续，
    // 直到同一消息的自动重试达到 `max_retries` 次
    async fn retry_failed_executions(
        &self,
        adapter: &dyn ChainAdapter,
        cursor: u64,
        report: &mut PollReport,
    ) -> Result<u64, Error> {
        let batch = adapter.fetch_failed_messages(cursor).await?;
        let mut attempts = self.retry_attempts.lock().await;

        for message in batch.messages {
            let key = message.key();
            let attempt = attempts.entry(key).or_insert(0);
            if *attempt >= self.config.max_retries {
                warn!("Giving up on message {} after {} execution retries", key, attempt);
                report.abandoned += 1;
                continue;
            }
            *attempt += 1;

            let delay = self.config.retry_delay * (*attempt as u64 - 1);
            if delay > 0 {
                sleep(Duration::from_secs(delay)).await;
            }

            match adapter.retry_message_execution(message).await {
                Ok(outcome) => {
                    info!("Retried message {} (execution {})", key, outcome.status);
                    report.retried += 1;
                    if outcome.is_success() {
                        attempts.remove(&key);
                    }
                }
                Err(Error::Protocol(ProtocolError::AlreadyExecuted { .. })) => {
                    debug!("Message {} already executed", key);
                    attempts.remove(&key);
                }
                Err(Error::Protocol(e)) => {
                    warn!("Retry of message {} rejected: {}", key, e);
                    report.rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(batch.next_cursor)
    }
}
