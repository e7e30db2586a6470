//! 统一错误处理模块
//!
//! 定义数据访问层对外暴露的技术中立错误类型。底层驱动错误只在仓储/连接池边界
//! 经 `ExceptionTranslator` 转换一次，上层只依赖这里的分类。

use thiserror::Error;
use uuid::Uuid;

/// 数据访问错误类型
#[derive(Debug, Error)]
pub enum DataAccessError {
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("主键冲突: task={task}, code={code}, {message}")]
    DuplicateKey {
        task: String,
        code: String,
        message: String,
    },

    #[error("连接池耗尽: {0}")]
    PoolExhausted(String),

    #[error("数据库连接失败: task={task}, {message}")]
    ConnectionFailure { task: String, message: String },

    #[error("事务已结束: tx={0}")]
    TransactionClosed(Uuid),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("数据库错误: task={task}, code={code:?}, {message}")]
    Store {
        task: String,
        code: Option<String>,
        message: String,
    },
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, DataAccessError>;

impl DataAccessError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::DuplicateKey { .. } => "DUPLICATE_KEY",
            Self::PoolExhausted(_) => "POOL_EXHAUSTED",
            Self::ConnectionFailure { .. } => "CONNECTION_FAILURE",
            Self::TransactionClosed(_) | Self::Migration(_) | Self::Store { .. } => "STORE_ERROR",
        }
    }

    /// 是否为键冲突（调用方可重新生成 ID 后重试）
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
