use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use crate::{types::{Address, ChainId}, Error};

/// 进程内账本，只能通过 `Relayer::with_adapters` 嵌入，配置文件中不可用
pub const ADAPTER_LOCAL: &str = "local";
pub const ADAPTER_RPC: &str = "rpc";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainConfig {
    /// 32 字节链标识，十六进制
    pub id: String,
    #[serde(rename = "adapter_type")]
    pub adapter_type: String,
    pub name: String,
    #[serde(default)]
    pub rpc_url: String,
    pub messenger_address: String,
}

impl ChainConfig {
    pub fn chain_id(&self) -> Result<ChainId, Error> {
        ChainId::from_hex(&self.id).map_err(|e| Error::Config(format!("Invalid chain ID {}: {}", self.id, e)))
    }

    pub fn messenger_address(&self) -> Result<Address, Error> {
        Address::from_hex(&self.messenger_address)
            .map_err(|e| Error::Config(format!("Invalid messenger address {}: {}", self.messenger_address, e)))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayerConfig {
    pub poll_interval: u64,
    pub max_retries: u32,
    pub retry_delay: u64,
    /// 是否自动重试目标链上执行失败的消息
    #[serde(default)]
    pub retry_failed_executions: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub relayer: RelayerConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self, Error> {
        let config_path = config_path.as_ref();
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let is_toml = config_path.extension().map(|ext| ext == "toml").unwrap_or(false);
        let config = if is_toml {
            Self::from_toml_str(&config_str)?
        } else {
            Self::from_json_str(&config_str)?
        };

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        toml::from_str(s).map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.chains.len() < 2 {
            return Err(Error::Config("At least two chains must be configured".to_string()));
        }

        // 验证链配置
        let mut seen = HashSet::new();
        for chain in &self.chains {
            if chain.adapter_type == ADAPTER_LOCAL {
                return Err(Error::Config(format!(
                    "Chain {} uses an in-process ledger, which cannot be shared through a config file",
                    chain.name
                )));
            }
            if chain.adapter_type != ADAPTER_RPC {
                return Err(Error::Config(format!("Invalid adapter type: {}", chain.adapter_type)));
            }
            let chain_id = chain.chain_id()?;
            if chain_id.is_zero() {
                return Err(Error::Config(format!("Chain ID must not be zero: {}", chain.name)));
            }
            if !seen.insert(chain_id) {
                return Err(Error::Config(format!("Duplicate chain ID: {}", chain.id)));
            }
            if chain.rpc_url.is_empty() {
                return Err(Error::Config(format!("Chain {} requires an rpc_url", chain.name)));
            }
            chain.messenger_address()?;
        }

        // 验证中继器配置
        if self.relayer.poll_interval == 0 {
            return Err(Error::Config("Relayer poll interval must be greater than 0".to_string()));
        }
        if self.relayer.max_retries == 0 {
            return Err(Error::Config("Relayer max retries must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn get_chain_config(&self, chain_id: &ChainId) -> Option<&ChainConfig> {
        self.chains
            .iter()
            .find(|c| c.chain_id().map(|id| id == *chain_id).unwrap_or(false))
    }
}
