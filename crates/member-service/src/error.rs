//! 会员服务错误类型
//!
//! 定义服务层的业务错误，并把数据访问错误归入统一的错误分类

use std::fmt;

use member_shared::error::DataAccessError;
use thiserror::Error;

/// 错误分类
///
/// 调用方只需依据分类决定处理方式，不需要关心底层存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    DuplicateKey,
    ValidationFailed,
    PoolExhausted,
    ConnectionFailure,
    StoreError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::DuplicateKey => "duplicate_key",
            Self::ValidationFailed => "validation_failed",
            Self::PoolExhausted => "pool_exhausted",
            Self::ConnectionFailure => "connection_failure",
            Self::StoreError => "store_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会员服务错误类型
#[derive(Debug, Error)]
pub enum MemberError {
    // === 数据访问错误 ===
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    // === 业务校验错误 ===
    #[error("会员校验失败: member_id={member_id}, {reason}")]
    ValidationFailed { member_id: String, reason: String },

    #[error("转账金额无效: {0}")]
    InvalidAmount(i64),

    // === 转账错误 ===
    /// 事务已回滚，`source` 为导致回滚的原因
    #[error("转账失败，已回滚: from={from_id}, to={to_id}, 原因: {source}")]
    TransferFailed {
        from_id: String,
        to_id: String,
        source: Box<MemberError>,
    },
}

/// 会员服务 Result 类型别名
pub type Result<T> = std::result::Result<T, MemberError>;

impl MemberError {
    pub fn validation(member_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            member_id: member_id.into(),
            reason: reason.into(),
        }
    }

    pub fn transfer_failed(from_id: &str, to_id: &str, source: MemberError) -> Self {
        Self::TransferFailed {
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            source: Box::new(source),
        }
    }

    /// 错误分类，`TransferFailed` 取其根因的分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DataAccess(e) => match e {
                DataAccessError::NotFound { .. } => ErrorKind::NotFound,
                DataAccessError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
                DataAccessError::PoolExhausted(_) => ErrorKind::PoolExhausted,
                DataAccessError::ConnectionFailure { .. } => ErrorKind::ConnectionFailure,
                DataAccessError::TransactionClosed(_)
                | DataAccessError::Migration(_)
                | DataAccessError::Store { .. } => ErrorKind::StoreError,
            },
            Self::ValidationFailed { .. } | Self::InvalidAmount(_) => ErrorKind::ValidationFailed,
            Self::TransferFailed { source, .. } => source.kind(),
        }
    }

    /// 展开 `TransferFailed`，返回最内层的错误
    pub fn root_cause(&self) -> &MemberError {
        match self {
            Self::TransferFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// 检查是否为可恢复的错误（重新生成主键或稍后重试）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DuplicateKey | ErrorKind::PoolExhausted | ErrorKind::ConnectionFailure
        )
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::ValidationFailed | ErrorKind::DuplicateKey
        )
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DataAccess(e) => e.error_code(),
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::TransferFailed { .. } => "TRANSFER_FAILED",
        }
    }
}
