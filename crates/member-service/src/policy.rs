//! 转账校验策略
//!
//! 转账在扣减付款方之后、入账收款方之前执行校验；校验失败会使整个事务回滚。
//! 余额不足由转账服务自身拒绝，策略只承载额外的业务规则。

use std::collections::HashSet;

use member_shared::config::TransferConfig;

use crate::error::{MemberError, Result};
use crate::models::Member;

/// 转账校验策略接口
#[cfg_attr(test, mockall::automock)]
pub trait TransferPolicy: Send + Sync {
    /// `from` 与 `to` 为扣减前读取的会员快照
    fn check(&self, from: &Member, to: &Member, amount: i64) -> Result<()>;
}

/// 禁止向名单内的会员转入
#[derive(Debug, Clone)]
pub struct BlockedMemberPolicy {
    blocked: HashSet<String>,
}

impl BlockedMemberPolicy {
    pub fn new<I, S>(blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocked: blocked.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for BlockedMemberPolicy {
    fn default() -> Self {
        Self::new(["ex"])
    }
}

impl TransferPolicy for BlockedMemberPolicy {
    fn check(&self, _from: &Member, to: &Member, _amount: i64) -> Result<()> {
        if self.blocked.contains(&to.id) {
            return Err(MemberError::validation(&to.id, "收款会员被禁止转入"));
        }
        Ok(())
    }
}

/// 按顺序执行多个策略，遇到第一个失败即返回
#[derive(Default)]
pub struct PolicyChain {
    policies: Vec<Box<dyn TransferPolicy>>,
}

impl PolicyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: impl TransferPolicy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    /// 根据转账配置构建策略链
    pub fn from_config(config: &TransferConfig) -> Self {
        let mut chain = Self::new();
        if !config.blocked_members.is_empty() {
            chain = chain.with(BlockedMemberPolicy::new(config.blocked_members.iter().cloned()));
        }
        chain
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl TransferPolicy for PolicyChain {
    fn check(&self, from: &Member, to: &Member, amount: i64) -> Result<()> {
        self.policies
            .iter()
            .try_for_each(|policy| policy.check(from, to, amount))
    }
}
