//! 会员余额转账命令行
//!
//! 提供数据库迁移、会员管理与余额转账的命令行入口。

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use member_shared::{config::AppConfig, database::ConnectionProvider, observability};
use tracing::{info, warn};

use member_service::{MemberRepository, MemberService, TransferService};

const SERVICE_NAME: &str = "member-service";

#[derive(Parser, Debug)]
#[command(
    name = "member-transfer",
    author,
    version,
    about = "Transactional balance transfers between member accounts"
)]
struct Cli {
    /// 覆盖配置中的数据库地址（如 sqlite://data/member.db）
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 执行数据库迁移
    Migrate,
    /// 创建会员（ID 冲突时自动生成新 ID）
    Create {
        #[arg(long)]
        id: String,
        #[arg(long, default_value_t = 0)]
        balance: i64,
    },
    /// 以 JSON 输出会员
    Show {
        #[arg(long)]
        id: String,
    },
    /// 转账
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: i64,
        /// 使用事务模板而不是手动控制事务
        #[arg(long)]
        template: bool,
    },
    /// 删除会员
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. 加载配置，失败时使用默认值
    let mut config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    if let Some(url) = cli.database_url.clone() {
        config.database.url = url;
    }

    // 2. 初始化可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    observability::init(&obs_config)?;
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 初始化连接池
    let provider = ConnectionProvider::connect(&config.database)
        .await
        .context("failed to connect to database")?;

    let result = run(cli.command, &provider, &config).await;
    provider.close().await;
    result
}

async fn run(command: Commands, provider: &ConnectionProvider, config: &AppConfig) -> Result<()> {
    let repo = Arc::new(MemberRepository::new(provider.clone()));

    match command {
        Commands::Migrate => {
            provider.run_migrations().await?;
            info!("Migrations applied");
        }
        Commands::Create { id, balance } => {
            let member = MemberService::new(repo).create(&id, balance).await?;
            if member.id != id {
                warn!(requested = %id, actual = %member.id, "会员 ID 已被占用，使用了新 ID");
            }
            println!("{}", serde_json::to_string_pretty(&member)?);
        }
        Commands::Show { id } => {
            let member = MemberService::new(repo).find(&id).await?;
            println!("{}", serde_json::to_string_pretty(&member)?);
        }
        Commands::Transfer {
            from,
            to,
            amount,
            template,
        } => {
            let service = TransferService::from_config(provider.clone(), &config.transfer);
            let result = if template {
                service.transfer_with_template(&from, &to, amount).await
            } else {
                service.transfer(&from, &to, amount).await
            };
            result.with_context(|| format!("transfer {} -> {} ({}) failed", from, to, amount))?;
            println!("transferred {} from {} to {}", amount, from, to);
        }
        Commands::Delete { id } => {
            MemberService::new(repo).delete(&id).await?;
            println!("deleted {}", id);
        }
    }

    Ok(())
}
