//! 数据库连接管理模块
//!
//! 提供有界连接池、连接与事务上下文的绑定，以及连接的获取与归还。
//!
//! ## 连接归属
//!
//! - 无事务上下文时，每次 `lease` 从连接池取出一个新连接，`release` 后归还
//! - 有活动事务上下文时，`lease` 始终返回上下文绑定的同一物理连接，
//!   `release` 延迟到事务上下文释放时统一处理

use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions,
};
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{DataAccessError, Result};
use crate::observability::metrics;
use crate::transaction::TransactionContext;
use crate::translator::{ExceptionTranslator, SqlErrorCodeTranslator};

/// 连接池状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// 当前已建立的连接数（含空闲与使用中）
    pub size: u32,
    /// 空闲连接数
    pub idle: usize,
    pub max_connections: u32,
}

/// 租用的连接
///
/// 绑定在事务上下文中的连接只是借用，归还由上下文负责。
pub enum ConnectionLease<'a> {
    Bound {
        tx_id: Uuid,
        conn: &'a mut SqliteConnection,
    },
    Pooled(PoolConnection<Sqlite>),
}

impl ConnectionLease<'_> {
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound { .. })
    }
}

impl Deref for ConnectionLease<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Bound { conn, .. } => conn,
            Self::Pooled(conn) => conn,
        }
    }
}

impl DerefMut for ConnectionLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Bound { conn, .. } => conn,
            Self::Pooled(conn) => conn,
        }
    }
}

/// 连接提供者
///
/// 包装 SQLite 连接池，负责连接获取、事务开启和异常转换。
#[derive(Clone)]
pub struct ConnectionProvider {
    pool: SqlitePool,
    translator: Arc<dyn ExceptionTranslator>,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl ConnectionProvider {
    /// 创建连接池
    #[instrument(skip(config), fields(url = %config.url, max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::connect_with_translator(config, Arc::new(SqlErrorCodeTranslator::new())).await
    }

    /// 使用自定义异常转换器创建连接池
    pub async fn connect_with_translator(
        config: &DatabaseConfig,
        translator: Arc<dyn ExceptionTranslator>,
    ) -> Result<Self> {
        info!("Connecting to database...");

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| translator.translate("connect", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout());

        // 数据库文件所在目录不存在时先创建
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| DataAccessError::ConnectionFailure {
                    task: "connect".to_string(),
                    message: format!("创建目录 {} 失败: {}", parent.display(), e),
                })?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(config.idle_timeout())
            .connect_with(options)
            .await
            .map_err(|e| translator.translate("connect", e))?;

        info!("Database connection pool created");

        Ok(Self {
            pool,
            translator,
            max_connections: config.max_connections,
            acquire_timeout: config.acquire_timeout(),
        })
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 转换驱动错误
    pub fn translate(&self, task: &str, err: sqlx::Error) -> DataAccessError {
        self.translator.translate(task, err)
    }

    /// 从连接池获取连接
    ///
    /// 连接池耗尽时等待，超过 `acquire_timeout` 返回 `PoolExhausted`
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        match self.pool.acquire().await {
            Ok(conn) => {
                trace!(status = ?self.status(), "获取连接");
                Ok(conn)
            }
            Err(sqlx::Error::PoolTimedOut) => {
                metrics::record_pool_timeout();
                warn!(
                    max_connections = self.max_connections,
                    acquire_timeout_ms = self.acquire_timeout.as_millis() as u64,
                    "获取连接超时，连接池已耗尽"
                );
                Err(DataAccessError::PoolExhausted(format!(
                    "max_connections={}, acquire_timeout={}ms",
                    self.max_connections,
                    self.acquire_timeout.as_millis()
                )))
            }
            Err(e) => Err(self.translate("acquire", e)),
        }
    }

    /// 获取连接并开启事务，返回绑定该连接的事务上下文
    pub async fn begin(&self) -> Result<TransactionContext> {
        let conn = self.acquire().await?;
        TransactionContext::begin(conn, self.translator.clone()).await
    }

    /// 租用连接
    ///
    /// 传入活动的事务上下文时返回其绑定的连接，否则从连接池获取新连接
    pub async fn lease<'a>(
        &self,
        ctx: Option<&'a mut TransactionContext>,
    ) -> Result<ConnectionLease<'a>> {
        match ctx {
            Some(ctx) => {
                let tx_id = ctx.id();
                let conn = ctx.connection()?;
                Ok(ConnectionLease::Bound { tx_id, conn })
            }
            None => Ok(ConnectionLease::Pooled(self.acquire().await?)),
        }
    }

    /// 归还租用的连接
    ///
    /// 绑定在事务上下文中的连接不在此归还
    pub fn release(&self, lease: ConnectionLease<'_>) {
        match lease {
            ConnectionLease::Bound { tx_id, .. } => {
                trace!(tx_id = %tx_id, "连接属于活动事务，延迟到事务结束时释放");
            }
            ConnectionLease::Pooled(conn) => {
                drop(conn);
                trace!("连接已归还连接池");
            }
        }
    }

    /// 连接池状态
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_connections: self.max_connections,
        }
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| self.translate("health_check", e))
    }

    /// 运行迁移
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Database migrations applied");
        Ok(())
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}
