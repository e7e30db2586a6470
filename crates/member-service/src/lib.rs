//! 会员余额服务
//!
//! 提供会员账户之间的事务性余额转账。
//!
//! ## 核心功能
//!
//! - **余额转账**：在单个事务中扣减付款方并入账收款方，任一步失败整体回滚
//! - **转账策略**：可插拔的转账校验（如禁止转入名单），余额不足始终拒绝
//! - **会员管理**：创建（主键冲突时重新生成 ID 重试一次）、查询、删除
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `repository`: 数据库仓储层
//! - `policy`: 转账校验策略
//! - `service`: 业务服务层

pub mod error;
pub mod models;
pub mod policy;
pub mod repository;
pub mod service;

pub use error::{ErrorKind, MemberError, Result};
pub use models::*;
pub use policy::{BlockedMemberPolicy, PolicyChain, TransferPolicy};
pub use repository::{MemberRepository, MemberRepositoryTrait};
pub use service::{MemberService, TransferService};
