//! 服务层
//!
//! 实现会员业务逻辑，持有事务边界。
//!
//! ## 模块结构
//!
//! - `transfer_service`: 余额转账（手动事务与事务模板两种方式）
//! - `member_service`: 会员创建、查询、删除

pub mod member_service;
pub mod transfer_service;

pub use member_service::{IdGenerator, MemberService, random_suffix_generator};
pub use transfer_service::TransferService;
