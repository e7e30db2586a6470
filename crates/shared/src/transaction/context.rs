//! 事务上下文
//!
//! 事务上下文独占一个池连接，开启后该连接处于手动提交模式，
//! 同一上下文中的所有数据访问都在这个连接上执行。

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::error::{DataAccessError, Result};
use crate::observability::metrics;
use crate::translator::ExceptionTranslator;

/// 事务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Open,
    Committed,
    RolledBack,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事务上下文
///
/// 生命周期：`begin` → 若干次数据访问 → `commit` 或 `rollback` → `release`。
///
/// `release` 负责把连接恢复为自动提交并归还连接池。未经 `release` 就被丢弃
/// （例如 future 被取消或 panic 展开）时，仍处于开启状态的事务所在连接会被
/// 关闭而不是归还，SQLite 在连接关闭时回滚未提交的事务。
pub struct TransactionContext {
    id: Uuid,
    conn: Option<PoolConnection<Sqlite>>,
    status: TransactionStatus,
    auto_commit: bool,
    discard: bool,
    translator: Arc<dyn ExceptionTranslator>,
    started: Instant,
}

impl TransactionContext {
    /// 在给定连接上开启事务
    ///
    /// 使用 `BEGIN IMMEDIATE` 在开启时即获取写锁，并发写事务按顺序执行
    pub(crate) async fn begin(
        mut conn: PoolConnection<Sqlite>,
        translator: Arc<dyn ExceptionTranslator>,
    ) -> Result<Self> {
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| translator.translate("begin", e))?;

        let id = Uuid::new_v4();
        debug!(tx_id = %id, "事务已开启");

        Ok(Self {
            id,
            conn: Some(conn),
            status: TransactionStatus::Open,
            auto_commit: false,
            discard: false,
            translator,
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Open
    }

    /// 连接是否已恢复为自动提交模式
    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// 获取事务绑定的连接
    ///
    /// 事务已提交或回滚后返回 `TransactionClosed`
    pub fn connection(&mut self) -> Result<&mut SqliteConnection> {
        if self.status != TransactionStatus::Open {
            return Err(DataAccessError::TransactionClosed(self.id));
        }
        self.conn
            .as_deref_mut()
            .ok_or(DataAccessError::TransactionClosed(self.id))
    }

    /// 提交事务
    #[instrument(skip(self), fields(tx_id = %self.id))]
    pub async fn commit(&mut self) -> Result<()> {
        let conn = self.connection()?;
        match sqlx::query("COMMIT").execute(conn).await {
            Ok(_) => {
                self.status = TransactionStatus::Committed;
                self.auto_commit = true;
                metrics::record_transaction("committed");
                debug!(
                    elapsed_ms = self.started.elapsed().as_millis() as u64,
                    "事务已提交"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "事务提交失败");
                Err(self.translator.translate("commit", e))
            }
        }
    }

    /// 回滚事务
    ///
    /// 已回滚时直接返回；回滚失败时连接标记为丢弃，释放时关闭而不归还
    #[instrument(skip(self), fields(tx_id = %self.id))]
    pub async fn rollback(&mut self) -> Result<()> {
        match self.status {
            TransactionStatus::RolledBack => return Ok(()),
            TransactionStatus::Committed => {
                return Err(DataAccessError::TransactionClosed(self.id));
            }
            TransactionStatus::Open => {}
        }

        let conn = self
            .conn
            .as_deref_mut()
            .ok_or(DataAccessError::TransactionClosed(self.id))?;
        let result = sqlx::query("ROLLBACK").execute(conn).await;
        self.status = TransactionStatus::RolledBack;

        match result {
            Ok(_) => {
                self.auto_commit = true;
                metrics::record_transaction("rolled_back");
                debug!("事务已回滚");
                Ok(())
            }
            Err(e) => {
                self.discard = true;
                metrics::record_transaction("rollback_failed");
                error!(error = %e, "事务回滚失败，连接将被丢弃");
                Err(self.translator.translate("rollback", e))
            }
        }
    }

    /// 释放事务上下文
    ///
    /// 仍处于开启状态的事务先回滚；连接恢复自动提交后归还连接池。
    /// 释放过程中的错误只记录日志，不向调用方传播。
    pub async fn release(mut self) {
        if self.status == TransactionStatus::Open {
            warn!(tx_id = %self.id, "释放时事务仍未结束，执行回滚");
            if let Err(e) = self.rollback().await {
                error!(tx_id = %self.id, error = %e, "释放前回滚失败");
            }
        }

        if let Some(conn) = self.conn.take() {
            if self.discard {
                warn!(tx_id = %self.id, "连接状态未知，关闭连接而不归还连接池");
                drop(conn.detach());
            } else {
                drop(conn);
            }
        }

        debug!(
            tx_id = %self.id,
            status = %self.status,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "事务上下文已释放"
        );
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.status == TransactionStatus::Open || self.discard {
                warn!(
                    tx_id = %self.id,
                    status = %self.status,
                    "事务上下文未释放即被丢弃，关闭连接以中止事务"
                );
                metrics::record_transaction("aborted");
                drop(conn.detach());
            }
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("auto_commit", &self.auto_commit)
            .field("discard", &self.discard)
            .finish()
    }
}
