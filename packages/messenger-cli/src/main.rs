use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use messenger_core::{relayer::Relayer, ChainId, Config, MessageId};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about = "跨链信使中继器", long_about = None)]
struct Cli {
    /// 配置文件路径（.json 或 .toml）
    #[arg(short, long, value_name = "FILE", global = true, default_value = "messenger.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 验证并解析配置文件
    ValidateConfig {
        /// 以 JSON 输出解析后的配置
        #[arg(long)]
        json: bool,
    },
    /// 启动中继器服务
    Start {
        /// 只轮询一轮并输出统计
        #[arg(long)]
        once: bool,
    },
    /// 查询消息在目标链上的投递状态
    Status {
        /// 源链 ID（十六进制）
        #[arg(long)]
        source: ChainId,
        /// 目标链 ID（十六进制）
        #[arg(long)]
        destination: ChainId,
        /// 源链上的消息编号
        #[arg(long)]
        message_id: u64,
    },
}

fn print_summary(config: &Config) {
    println!("配置文件验证成功!");
    println!("链 ({}):", config.chains.len());
    for chain in &config.chains {
        println!("  {} [{}] {} -> 信使合约 {}", chain.name, chain.adapter_type, chain.rpc_url, chain.messenger_address);
        println!("    链 ID: {}", chain.id);
    }
    let relayer = &config.relayer;
    println!(
        "中继器: 每 {}秒 轮询, 投递最多 {} 次, 重试间隔 {}秒, 自动重试失败执行: {}",
        relayer.poll_interval,
        relayer.max_retries,
        relayer.retry_delay,
        if relayer.retry_failed_executions { "是" } else { "否" }
    );
}

async fn start(config: Config, once: bool) -> Result<()> {
    let relayer = Relayer::new(config).await?;

    if once {
        let report = relayer.poll_once().await;
        println!(
            "本轮: 投递 {}, 已投递 {}, 拒绝 {}, 跳过 {}, 重试执行 {}, 放弃 {}, 错误 {}",
            report.delivered,
            report.already_delivered,
            report.rejected,
            report.skipped,
            report.retried,
            report.abandoned,
            report.errors
        );
        return Ok(());
    }

    info!("中继器初始化成功，开始运行...");
    if let Err(e) = relayer.start().await {
        error!("中继器服务异常退出: {}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn status(config: Config, source: ChainId, destination: ChainId, message_id: u64) -> Result<()> {
    let name = config
        .get_chain_config(&destination)
        .map(|c| c.name.clone())
        .ok_or_else(|| anyhow!("目标链未配置: {}", destination))?;
    let relayer = Relayer::new(config).await?;
    let adapter = relayer
        .adapter(&destination)
        .ok_or_else(|| anyhow!("目标链未配置: {}", destination))?;

    let delivered = adapter.is_delivered(source, MessageId(message_id)).await?;
    println!(
        "消息 {}:{} 在 {} 上{}",
        source,
        message_id,
        name,
        if delivered { "已投递" } else { "尚未投递" }
    );
    Ok(())
}

fn load(path: &Path) -> Result<Config> {
    info!("使用配置文件: {:?}", path);
    Ok(Config::load(path)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load(&cli.config)?;

    match cli.command {
        Commands::ValidateConfig { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_summary(&config);
            }
            Ok(())
        }
        Commands::Start { once } => start(config, once).await,
        Commands::Status { source, destination, message_id } => status(config, source, destination, message_id).await,
    }
}
