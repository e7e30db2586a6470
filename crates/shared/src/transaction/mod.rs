//! 事务管理模块
//!
//! - `TransactionContext`：绑定单个连接的事务上下文，手动控制提交、回滚与释放
//! - `TransactionTemplate`：模板方式执行业务闭包，自动提交或回滚并释放连接
//!
//! 两种方式提供相同的原子性与资源释放保证。

mod context;
mod template;

pub use context::{TransactionContext, TransactionStatus};
pub use template::TransactionTemplate;
