//! 会员服务领域模型

pub mod member;

pub use member::Member;
