use std::collections::HashMap;

use log::{debug, info};
use sha2::{Digest, Sha256};

use crate::{
    contracts::TargetContract,
    executor,
    registry::MessageRegistry,
    retry,
    sender,
    types::{Address, ChainId, CrossChainMessage, DeliveryOutcome, DeliveryRecord, MessageId, MessageKey, SendRequest},
    Error,
};

pub mod events;

pub use events::{EventLog, MessengerEvent};

/// 账本状态（不含事件日志），每个交易在它的副本上执行
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub(crate) chain_id: ChainId,
    pub(crate) registry: MessageRegistry,
    pub(crate) contracts: HashMap<Address, Box<dyn TargetContract>>,
    pub(crate) balances: HashMap<Address, u128>,
    pub(crate) deploy_nonces: HashMap<Address, u64>,
    pub(crate) last_message_id: MessageId,
}

/// 正在执行的交易：状态副本 + 待提交事件
pub struct Transaction {
    pub(crate) state: LedgerState,
    pending_events: Vec<MessengerEvent>,
}

impl Transaction {
    pub fn chain_id(&self) -> ChainId {
        self.state.chain_id
    }

    pub fn emit(&mut self, event: MessengerEvent) {
        self.pending_events.push(event);
    }
}

/// 单条链的内存账本：交易串行、原子执行，事件日志只追加
#[derive(Debug)]
pub struct Ledger {
    state: LedgerState,
    events: EventLog,
}

impl Ledger {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            state: LedgerState {
                chain_id,
                registry: MessageRegistry::new(),
                contracts: HashMap::new(),
                balances: HashMap::new(),
                deploy_nonces: HashMap::new(),
                last_message_id: MessageId::default(),
            },
            events: EventLog::new(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.state.chain_id
    }

    /// 原子执行：闭包返回 Ok 时提交状态和事件，返回 Err 时全部丢弃
    pub fn transact<T, F>(&mut self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Transaction) -> Result<T, Error>,
    {
        let mut tx = Transaction {
            state: self.state.clone(),
            pending_events: Vec::new(),
        };
        match f(&mut tx) {
            Ok(value) => {
                debug!("Committing transaction on {} with {} events", self.state.chain_id, tx.pending_events.len());
                self.state = tx.state;
                self.events.append(tx.pending_events);
                Ok(value)
            }
            Err(e) => {
                debug!("Aborting transaction on {}: {}", self.state.chain_id, e);
                Err(e)
            }
        }
    }

    pub fn send(&mut self, request: SendRequest) -> Result<CrossChainMessage, Error> {
        self.transact(|tx| sender::send(tx, request))
    }

    pub fn deliver(&mut self, message: &CrossChainMessage) -> Result<DeliveryOutcome, Error> {
        self.transact(|tx| executor::deliver(tx, message))
    }

    pub fn retry_message_execution(&mut self, message: &CrossChainMessage) -> Result<DeliveryOutcome, Error> {
        self.transact(|tx| retry::retry_message_execution(tx, message))
    }

    pub fn is_delivered(&self, source_chain_id: ChainId, message_id: MessageId) -> bool {
        self.state
            .registry
            .is_delivered(&MessageKey::new(source_chain_id, message_id))
    }

    pub fn delivery_record(&self, key: &MessageKey) -> Option<&DeliveryRecord> {
        self.state.registry.get(key)
    }

    /// 部署合约，地址由部署者和其部署次数推导
    pub fn deploy(&mut self, deployer: Address, contract: Box<dyn TargetContract>) -> Address {
        let address = self.next_contract_address(&deployer);
        *self.state.deploy_nonces.entry(deployer).or_insert(0) += 1;
        self.state.contracts.insert(address, contract);
        info!("Deployed contract at {} on {}", address, self.state.chain_id);
        address
    }

    pub fn next_contract_address(&self, deployer: &Address) -> Address {
        let nonce = self.state.deploy_nonces.get(deployer).copied().unwrap_or(0);
        derive_contract_address(deployer, nonce)
    }

    pub fn has_code(&self, address: &Address) -> bool {
        self.state.contracts.contains_key(address)
    }

    pub fn contract<T: 'static>(&self, address: &Address) -> Option<&T> {
        self.state
            .contracts
            .get(address)
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    pub fn balance_of(&self, address: &Address) -> u128 {
        self.state.balances.get(address).copied().unwrap_or(0)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

pub fn derive_contract_address(deployer: &Address, nonce: u64) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(deployer.0);
    hasher.update(nonce.to_be_bytes());
    let digest = hasher.finalize();
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Address(address)
}
