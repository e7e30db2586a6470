//! 会员仓储
//!
//! 提供会员余额的查询与更新，支持在事务上下文中执行

use async_trait::async_trait;
use member_shared::database::ConnectionProvider;
use member_shared::error::{DataAccessError, Result};
use member_shared::transaction::TransactionContext;
use tracing::debug;

use super::traits::MemberRepositoryTrait;
use crate::models::Member;

/// 会员仓储
pub struct MemberRepository {
    provider: ConnectionProvider,
}

impl MemberRepository {
    pub fn new(provider: ConnectionProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl MemberRepositoryTrait for MemberRepository {
    async fn find_by_id(&self, ctx: Option<&mut TransactionContext>, id: &str) -> Result<Member> {
        let mut lease = self.provider.lease(ctx).await?;
        let result = sqlx::query_as::<_, Member>(
            r#"
            SELECT id, balance
            FROM member
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *lease)
        .await;
        self.provider.release(lease);

        match result {
            Ok(Some(member)) => Ok(member),
            Ok(None) => Err(DataAccessError::not_found("member", id)),
            Err(e) => Err(self.provider.translate("find_by_id", e)),
        }
    }

    async fn update_balance(
        &self,
        ctx: Option<&mut TransactionContext>,
        id: &str,
        balance: i64,
    ) -> Result<u64> {
        let mut lease = self.provider.lease(ctx).await?;
        let result = sqlx::query(
            r#"
            UPDATE member
            SET balance = ?1
            WHERE id = ?2
            "#,
        )
        .bind(balance)
        .bind(id)
        .execute(&mut *lease)
        .await;
        self.provider.release(lease);

        let affected = result
            .map_err(|e| self.provider.translate("update_balance", e))?
            .rows_affected();
        debug!(member_id = %id, balance, affected, "余额已更新");
        Ok(affected)
    }

    async fn insert(&self, ctx: Option<&mut TransactionContext>, member: &Member) -> Result<Member> {
        let mut lease = self.provider.lease(ctx).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO member (id, balance)
            VALUES (?1, ?2)
            "#,
        )
        .bind(&member.id)
        .bind(member.balance)
        .execute(&mut *lease)
        .await;
        self.provider.release(lease);

        result.map_err(|e| self.provider.translate("insert", e))?;
        Ok(member.clone())
    }

    async fn delete(&self, ctx: Option<&mut TransactionContext>, id: &str) -> Result<u64> {
        let mut lease = self.provider.lease(ctx).await?;
        let result = sqlx::query("DELETE FROM member WHERE id = ?1")
            .bind(id)
            .execute(&mut *lease)
            .await;
        self.provider.release(lease);

        Ok(result
            .map_err(|e| self.provider.translate("delete", e))?
            .rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use member_shared::test_utils::TestDatabase;

    use super::*;

    #[tokio::test]
    async fn test_find_by_id() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 10_000).await;
        let repo = MemberRepository::new(db.provider().clone());

        let member = repo.find_by_id(None, "memberA").await.unwrap();
        assert_eq!(member, Member::new("memberA", 10_000));

        let err = repo.find_by_id(None, "missing").await.unwrap_err();
        assert!(matches!(err, DataAccessError::NotFound { ref id, .. } if id == "missing"));
    }

    #[tokio::test]
    async fn test_update_balance_reports_affected_rows() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 10_000).await;
        let repo = MemberRepository::new(db.provider().clone());

        assert_eq!(repo.update_balance(None, "memberA", 8_000).await.unwrap(), 1);
        assert_eq!(repo.update_balance(None, "missing", 8_000).await.unwrap(), 0);
        assert_eq!(db.balance_of("memberA").await, Some(8_000));
    }

    #[tokio::test]
    async fn test_insert_duplicate_key_is_translated() {
        let db = TestDatabase::new().await;
        let repo = MemberRepository::new(db.provider().clone());

        let member = Member::new("memberV1", 100);
        repo.insert(None, &member).await.unwrap();
        let err = repo.insert(None, &member).await.unwrap_err();

        assert!(err.is_duplicate_key());
        assert_eq!(err.error_code(), "DUPLICATE_KEY");
        assert_eq!(db.member_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = TestDatabase::new().await;
        db.seed_member("memberA", 1).await;
        let repo = MemberRepository::new(db.provider().clone());

        assert_eq!(repo.delete(None, "memberA").await.unwrap(), 1);
        assert_eq!(repo.delete(None, "memberA").await.unwrap(), 0);
        assert!(matches!(
            repo.find_by_id(None, "memberA").await,
            Err(DataAccessError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_operations_share_context_connection() {
        // 连接池只有一个连接：事务内的多次访问必须复用绑定的连接
        let db = TestDatabase::with_pool(1, Duration::from_millis(200)).await;
        db.seed_member("memberA", 100).await;
        let repo = MemberRepository::new(db.provider().clone());

        let mut ctx = db.provider().begin().await.unwrap();
        let member = repo.find_by_id(Some(&mut ctx), "memberA").await.unwrap();
        repo.update_balance(Some(&mut ctx), "memberA", member.balance - 40)
            .await
            .unwrap();
        repo.insert(Some(&mut ctx), &Member::new("memberB", 40))
            .await
            .unwrap();

        // 事务内可以读到未提交的修改
        let member = repo.find_by_id(Some(&mut ctx), "memberA").await.unwrap();
        assert_eq!(member.balance, 60);

        ctx.rollback().await.unwrap();
        ctx.release().await;

        assert_eq!(db.balance_of("memberA").await, Some(100));
        assert_eq!(db.balance_of("memberB").await, None);
        db.assert_pool_reclaimable().await;
    }
}
