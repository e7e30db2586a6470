//! 共享库
//!
//! 包含会员服务共用的配置、错误处理、异常转换、数据库连接池、事务管理与可观测性等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transaction;
pub mod translator;
