//! 余额转账服务
//!
//! 在单个事务中完成两个会员之间的余额转移，包括：
//! - 请求校验（金额为正、付款方与收款方不同）
//! - 读取双方余额
//! - 扣减付款方（余额不足时拒绝）
//! - 转账策略校验
//! - 入账收款方
//!
//! ## 转账流程
//!
//! 1. 请求校验 -> 2. 获取连接并开启事务 -> 3. 读取双方 -> 4. 扣减付款方
//!    -> 5. 策略校验 -> 6. 入账收款方 -> 7. 提交（任一步失败则回滚）
//!    -> 8. 释放连接
//!
//! 事务边界提供两种写法：`transfer` 手动控制开启、提交、回滚与释放，
//! `transfer_with_template` 交给 `TransactionTemplate` 处理。两者的原子性
//! 与连接释放保证相同。

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use member_shared::config::TransferConfig;
use member_shared::database::ConnectionProvider;
use member_shared::error::DataAccessError;
use member_shared::observability::metrics;
use member_shared::transaction::{TransactionContext, TransactionTemplate};
use tracing::{error, info, instrument, warn};

use crate::error::{MemberError, Result};
use crate::policy::{PolicyChain, TransferPolicy};
use crate::repository::{MemberRepository, MemberRepositoryTrait};

const MODE_MANUAL: &str = "manual";
const MODE_TEMPLATE: &str = "template";

/// 转账服务
pub struct TransferService<R = MemberRepository> {
    provider: ConnectionProvider,
    template: TransactionTemplate,
    repo: Arc<R>,
    policy: Arc<dyn TransferPolicy>,
}

impl TransferService<MemberRepository> {
    /// 使用默认仓储和按配置构建的策略链
    pub fn from_config(provider: ConnectionProvider, config: &TransferConfig) -> Self {
        let repo = Arc::new(MemberRepository::new(provider.clone()));
        let policy = Arc::new(PolicyChain::from_config(config));
        Self::new(provider, repo, policy)
    }
}

impl<R> TransferService<R>
where
    R: MemberRepositoryTrait + 'static,
{
    pub fn new(provider: ConnectionProvider, repo: Arc<R>, policy: Arc<dyn TransferPolicy>) -> Self {
        let template = TransactionTemplate::new(provider.clone());
        Self {
            provider,
            template,
            repo,
            policy,
        }
    }

    /// 转账（手动控制事务边界）
    ///
    /// 业务步骤失败时回滚并返回 `TransferFailed`；获取连接失败时直接返回，
    /// 此时尚未开启事务。
    #[instrument(skip(self), fields(mode = MODE_MANUAL))]
    pub async fn transfer(&self, from_id: &str, to_id: &str, amount: i64) -> Result<()> {
        let start = Instant::now();
        if let Err(e) = validate_request(from_id, to_id, amount) {
            record_outcome(MODE_MANUAL, "rejected", start);
            return Err(e);
        }

        let mut ctx = match self.provider.begin().await {
            Ok(ctx) => ctx,
            Err(e) => {
                let result: Result<()> = Err(e.into());
                finish(MODE_MANUAL, &result, start, from_id, to_id, amount);
                return result;
            }
        };

        let outcome = execute_transfer(
            self.repo.as_ref(),
            self.policy.as_ref(),
            &mut ctx,
            from_id,
            to_id,
            amount,
        )
        .await;

        let result = match outcome {
            Ok(()) => ctx.commit().await.map_err(MemberError::from),
            Err(e) => {
                warn!(tx_id = %ctx.id(), error = %e, "转账失败，回滚事务");
                if let Err(rollback_err) = ctx.rollback().await {
                    error!(tx_id = %ctx.id(), error = %rollback_err, "回滚失败");
                }
                Err(MemberError::transfer_failed(from_id, to_id, e))
            }
        };

        // 提交失败时事务仍处于开启状态，release 会先回滚
        ctx.release().await;

        finish(MODE_MANUAL, &result, start, from_id, to_id, amount);
        result
    }

    /// 转账（事务模板）
    #[instrument(skip(self), fields(mode = MODE_TEMPLATE))]
    pub async fn transfer_with_template(&self, from_id: &str, to_id: &str, amount: i64) -> Result<()> {
        let start = Instant::now();
        if let Err(e) = validate_request(from_id, to_id, amount) {
            record_outcome(MODE_TEMPLATE, "rejected", start);
            return Err(e);
        }

        let repo = Arc::clone(&self.repo);
        let policy = Arc::clone(&self.policy);
        let from = from_id.to_string();
        let to = to_id.to_string();

        let result = self
            .template
            .execute_without_result(move |ctx| {
                async move {
                    execute_transfer(repo.as_ref(), policy.as_ref(), ctx, &from, &to, amount)
                        .await
                        .map_err(|e| MemberError::transfer_failed(&from, &to, e))
                }
                .boxed()
            })
            .await;

        finish(MODE_TEMPLATE, &result, start, from_id, to_id, amount);
        result
    }
}

/// 请求校验，不涉及任何连接
fn validate_request(from_id: &str, to_id: &str, amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(MemberError::InvalidAmount(amount));
    }
    if from_id == to_id {
        return Err(MemberError::validation(from_id, "付款方与收款方不能相同"));
    }
    Ok(())
}

/// 在给定事务中执行转账的业务步骤
async fn execute_transfer<R>(
    repo: &R,
    policy: &dyn TransferPolicy,
    ctx: &mut TransactionContext,
    from_id: &str,
    to_id: &str,
    amount: i64,
) -> Result<()>
where
    R: MemberRepositoryTrait + ?Sized,
{
    let from = repo.find_by_id(Some(&mut *ctx), from_id).await?;
    let to = repo.find_by_id(Some(&mut *ctx), to_id).await?;

    let debited = from
        .balance_after_debit(amount)
        .ok_or_else(|| MemberError::validation(from_id, "扣减后余额溢出"))?;
    // 余额不足与策略配置无关，始终拒绝
    if debited < 0 {
        return Err(MemberError::validation(
            from_id,
            format!("余额不足: balance={}, amount={}", from.balance, amount),
        ));
    }
    apply_balance(repo, ctx, from_id, debited).await?;

    policy.check(&from, &to, amount)?;

    let credited = to
        .balance_after_credit(amount)
        .ok_or_else(|| MemberError::validation(to_id, "入账后余额溢出"))?;
    apply_balance(repo, ctx, to_id, credited).await?;

    Ok(())
}

/// 写入余额，未命中任何行视为会员不存在
async fn apply_balance<R>(
    repo: &R,
    ctx: &mut TransactionContext,
    member_id: &str,
    balance: i64,
) -> Result<()>
where
    R: MemberRepositoryTrait + ?Sized,
{
    let affected = repo.update_balance(Some(ctx), member_id, balance).await?;
    if affected == 0 {
        return Err(DataAccessError::not_found("member", member_id).into());
    }
    Ok(())
}

fn record_outcome(mode: &str, status: &str, start: Instant) {
    metrics::record_transfer(mode, status, start.elapsed().as_secs_f64());
}

/// 记录转账结果
///
/// - `committed`：已提交
/// - `rolled_back`：业务步骤失败，事务已回滚
/// - `failed`：未能开启或提交事务
fn finish(mode: &str, result: &Result<()>, start: Instant, from_id: &str, to_id: &str, amount: i64) {
    let status = match result {
        Ok(()) => {
            info!(mode, from_id, to_id, amount, "转账完成");
            "committed"
        }
        Err(MemberError::TransferFailed { .. }) => "rolled_back",
        Err(e) => {
            warn!(mode, from_id, to_id, error = %e, "转账未执行");
            "failed"
        }
    };
    record_outcome(mode, status, start);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use member_shared::test_utils::TestDatabase;

    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Member;
    use crate::policy::MockTransferPolicy;

    fn service_with(
        db: &TestDatabase,
        policy: MockTransferPolicy,
    ) -> TransferService<MemberRepository> {
        let provider = db.provider().clone();
        let repo = Arc::new(MemberRepository::new(provider.clone()));
        TransferService::new(provider, repo, Arc::new(policy))
    }

    fn accepting_policy() -> MockTransferPolicy {
        let mut policy = MockTransferPolicy::new();
        policy.expect_check().returning(|_, _, _| Ok(()));
        policy
    }

    fn snapshot_policy() -> MockTransferPolicy {
        let mut policy = MockTransferPolicy::new();
        policy
            .expect_check()
            .withf(|from: &Member, to: &Member, amount: &i64| {
                from.balance == 10_000 && to.balance == 0 && *amount == 2_000
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        policy
    }

    #[tokio::test]
    async fn test_policy_sees_balances_read_before_debit() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 10_000).await;
        db.seed_member("memberB", 0).await;
        let service = service_with(&db, snapshot_policy());

        service.transfer("memberA", "memberB", 2_000).await.unwrap();

        assert_eq!(db.balance_of("memberA").await, Some(8_000));
        assert_eq!(db.balance_of("memberB").await, Some(2_000));
    }

    #[tokio::test]
    async fn test_template_policy_sees_balances_read_before_debit() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 10_000).await;
        db.seed_member("memberB", 0).await;
        let service = service_with(&db, snapshot_policy());

        service
            .transfer_with_template("memberA", "memberB", 2_000)
            .await
            .unwrap();

        assert_eq!(db.balance_of("memberA").await, Some(8_000));
        assert_eq!(db.balance_of("memberB").await, Some(2_000));
        db.assert_pool_reclaimable().await;
    }

    #[tokio::test]
    async fn test_policy_rejection_rolls_back_debit() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 10_000).await;
        db.seed_member("memberB", 0).await;

        let mut policy = MockTransferPolicy::new();
        policy
            .expect_check()
            .times(2)
            .returning(|_, to, _| Err(MemberError::validation(&to.id, "rejected")));
        let service = service_with(&db, policy);

        let err = service.transfer("memberA", "memberB", 2_000).await.unwrap_err();
        assert!(matches!(err, MemberError::TransferFailed { .. }));
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        let err = service
            .transfer_with_template("memberA", "memberB", 2_000)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        assert_eq!(db.balance_of("memberA").await, Some(10_000));
        assert_eq!(db.balance_of("memberB").await, Some(0));
        db.assert_pool_reclaimable().await;
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected_before_policy() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 10_000).await;

        let mut policy = MockTransferPolicy::new();
        policy.expect_check().never();
        let service = service_with(&db, policy);

        let err = service.transfer("memberA", "memberA", 100).await.unwrap_err();
        assert!(matches!(err, MemberError::ValidationFailed { .. }));

        let err = service.transfer("memberA", "memberB", 0).await.unwrap_err();
        assert!(matches!(err, MemberError::InvalidAmount(0)));

        let err = service
            .transfer_with_template("memberA", "memberB", -1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);

        assert_eq!(db.balance_of("memberA").await, Some(10_000));
    }

    #[tokio::test]
    async fn test_missing_recipient_is_not_found() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 10_000).await;

        let mut policy = MockTransferPolicy::new();
        policy.expect_check().never();
        let service = service_with(&db, policy);

        for err in [
            service.transfer("memberA", "ghost", 100).await.unwrap_err(),
            service
                .transfer_with_template("memberA", "ghost", 100)
                .await
                .unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::NotFound);
            assert!(matches!(err, MemberError::TransferFailed { ref to_id, .. } if to_id == "ghost"));
        }
        assert_eq!(db.balance_of("memberA").await, Some(10_000));
    }

    #[tokio::test]
    async fn test_credit_overflow_rolls_back() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 10).await;
        db.seed_member("memberB", i64::MAX).await;
        let service = service_with(&db, accepting_policy());

        let err = service.transfer("memberA", "memberB", 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(matches!(
            err.root_cause(),
            MemberError::ValidationFailed { member_id, .. } if member_id == "memberB"
        ));

        assert_eq!(db.balance_of("memberA").await, Some(10));
        assert_eq!(db.balance_of("memberB").await, Some(i64::MAX));
    }

    #[tokio::test]
    async fn test_overdraft_rejected_even_when_policy_accepts() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 100).await;
        db.seed_member("memberB", 0).await;

        let mut policy = MockTransferPolicy::new();
        policy.expect_check().never();
        let service = service_with(&db, policy);

        for err in [
            service.transfer("memberA", "memberB", 150).await.unwrap_err(),
            service
                .transfer_with_template("memberA", "memberB", 150)
                .await
                .unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::ValidationFailed);
            assert!(matches!(
                err.root_cause(),
                MemberError::ValidationFailed { member_id, .. } if member_id == "memberA"
            ));
        }

        assert_eq!(db.balance_of("memberA").await, Some(100));
        assert_eq!(db.balance_of("memberB").await, Some(0));
        db.assert_pool_reclaimable().await;
    }

    #[tokio::test]
    async fn test_pool_exhausted_is_returned_directly() {
        let db = TestDatabase::with_pool(1, Duration::from_millis(100)).await;
        db.seed_member("memberA", 10_000).await;
        db.seed_member("memberB", 0).await;

        let mut policy = MockTransferPolicy::new();
        policy.expect_check().never();
        let service = service_with(&db, policy);

        let held = db.provider().acquire().await.unwrap();
        for err in [
            service.transfer("memberA", "memberB", 100).await.unwrap_err(),
            service
                .transfer_with_template("memberA", "memberB", 100)
                .await
                .unwrap_err(),
        ] {
            assert!(matches!(
                err,
                MemberError::DataAccess(DataAccessError::PoolExhausted(_))
            ));
            assert_eq!(err.kind(), ErrorKind::PoolExhausted);
        }
        drop(held);

        assert_eq!(db.balance_of("memberA").await, Some(10_000));
    }

    #[tokio::test]
    async fn test_from_config_blocks_ex() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 10_000).await;
        db.seed_member("ex", 0).await;
        let service = TransferService::from_config(db.provider().clone(), &TransferConfig::default());

        let err = service.transfer("memberA", "ex", 2_000).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert_eq!(db.balance_of("memberA").await, Some(10_000));
        assert_eq!(db.balance_of("ex").await, Some(0));
    }
}
