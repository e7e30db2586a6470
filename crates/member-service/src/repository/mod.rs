//! 数据库仓储层
//!
//! 封装 `member` 表的 SQL 操作，驱动错误在这里经异常转换器转换为 `DataAccessError`。
//!
//! ## 连接使用
//!
//! - 传入事务上下文时，所有语句在上下文绑定的连接上执行，仓储不开启也不关闭连接
//! - 不传事务上下文时，每条语句租用一个池连接，执行完立即归还

mod member_repo;
mod traits;

pub use member_repo::MemberRepository;
pub use traits::*;
