//! 事务模板
//!
//! 以闭包方式执行事务：闭包成功则提交，失败则回滚，最后释放连接。
//! 闭包只负责业务逻辑，事务边界由模板统一处理。

use std::fmt::Display;

use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::database::ConnectionProvider;
use crate::error::DataAccessError;
use crate::transaction::TransactionContext;

#[derive(Clone)]
pub struct TransactionTemplate {
    provider: ConnectionProvider,
}

impl TransactionTemplate {
    pub fn new(provider: ConnectionProvider) -> Self {
        Self { provider }
    }

    /// 在事务中执行闭包并返回其结果
    ///
    /// - 闭包返回 `Ok`：提交，提交失败时返回提交错误
    /// - 闭包返回 `Err`：回滚后原样返回闭包的错误，回滚失败只记录日志
    /// - 获取连接失败：直接返回，闭包不会执行
    ///
    /// 闭包 panic 或返回的 future 被取消时，事务上下文随之被丢弃，连接关闭，
    /// 未提交的修改不会生效。
    pub async fn execute<T, E, F>(&self, callback: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut TransactionContext) -> BoxFuture<'c, Result<T, E>>,
        E: From<DataAccessError> + Display,
    {
        let mut ctx = self.provider.begin().await?;
        let tx_id = ctx.id();

        match callback(&mut ctx).await {
            Ok(value) => {
                let committed = ctx.commit().await;
                ctx.release().await;
                committed.map(|_| value).map_err(E::from)
            }
            Err(e) => {
                warn!(tx_id = %tx_id, error = %e, "事务执行失败，回滚");
                if let Err(rollback_err) = ctx.rollback().await {
                    error!(tx_id = %tx_id, error = %rollback_err, "回滚失败");
                }
                ctx.release().await;
                Err(e)
            }
        }
    }

    /// 在事务中执行无返回值的闭包
    pub async fn execute_without_result<E, F>(&self, callback: F) -> Result<(), E>
    where
        F: for<'c> FnOnce(&'c mut TransactionContext) -> BoxFuture<'c, Result<(), E>>,
        E: From<DataAccessError> + Display,
    {
        self.execute(callback).await
    }
}
