//! 会员实体

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 会员账户
///
/// 对应 `member` 表，`id` 为业务主键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: String,
    pub balance: i64,
}

impl Member {
    pub fn new(id: impl Into<String>, balance: i64) -> Self {
        Self {
            id: id.into(),
            balance,
        }
    }

    /// 扣减后的余额，溢出时返回 None
    pub fn balance_after_debit(&self, amount: i64) -> Option<i64> {
        self.balance.checked_sub(amount)
    }

    /// 入账后的余额，溢出时返回 None
    pub fn balance_after_credit(&self, amount: i64) -> Option<i64> {
        self.balance.checked_add(amount)
    }
}
