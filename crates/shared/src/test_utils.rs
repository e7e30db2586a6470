//! 测试工具模块
//!
//! 提供基于临时文件的 SQLite 测试数据库、数据准备与断言辅助函数。
//! 每个 `TestDatabase` 拥有独立的数据库文件，测试之间互不干扰。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::database::ConnectionProvider;

/// 测试数据库
///
/// 持有临时目录，drop 时连同数据库文件一起删除
pub struct TestDatabase {
    provider: ConnectionProvider,
    config: DatabaseConfig,
    _dir: TempDir,
}

impl TestDatabase {
    /// 默认测试数据库：连接池 5 个连接，获取超时 5 秒
    pub async fn new() -> Self {
        Self::with_pool(5, Duration::from_secs(5)).await
    }

    /// 指定连接池大小与获取超时
    pub async fn with_pool(max_connections: u32, acquire_timeout: Duration) -> Self {
        crate::observability::tracing::init_for_test();

        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("member.db").display()),
            max_connections,
            acquire_timeout_ms: acquire_timeout.as_millis() as u64,
            ..Default::default()
        };

        let provider = ConnectionProvider::connect(&config)
            .await
            .expect("创建测试连接池失败");
        provider.run_migrations().await.expect("测试数据库迁移失败");

        Self {
            provider,
            config,
            _dir: dir,
        }
    }

    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    /// 直接写入一条会员记录（绕过仓储）
    pub async fn seed_member(&self, id: &str, balance: i64) {
        sqlx::query("INSERT INTO member (id, balance) VALUES (?1, ?2)")
            .bind(id)
            .bind(balance)
            .execute(self.provider.pool())
            .await
            .expect("插入测试会员失败");
    }

    /// 读取已提交的余额，记录不存在时返回 None
    pub async fn balance_of(&self, id: &str) -> Option<i64> {
        sqlx::query_scalar::<_, i64>("SELECT balance FROM member WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.provider.pool())
            .await
            .expect("查询测试会员余额失败")
    }

    /// 会员记录总数
    pub async fn member_count(&self) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM member")
            .fetch_one(self.provider.pool())
            .await
            .expect("统计测试会员失败")
    }

    /// 断言连接池中的连接都已归还
    ///
    /// 同时持有 `max_connections` 个连接；任何连接泄漏都会导致获取超时
    pub async fn assert_pool_reclaimable(&self) {
        let mut held = Vec::with_capacity(self.config.max_connections as usize);
        for i in 0..self.config.max_connections {
            let conn = self
                .provider
                .acquire()
                .await
                .unwrap_or_else(|e| panic!("第 {} 个连接获取失败，存在连接泄漏: {}", i + 1, e));
            held.push(conn);
        }
    }
}

/// 生成唯一的测试会员 ID
///
/// 使用原子计数器确保并行测试时的唯一性
pub fn unique_member_id(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::SeqCst);
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, seq, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_member_id() {
        let a = unique_member_id("member");
        let b = unique_member_id("member");
        assert_ne!(a, b);
        assert!(a.starts_with("member-"));
    }

    #[tokio::test]
    async fn test_seed_and_read_balance() {
        let db = TestDatabase::new().await;
        db.seed_member("memberV100", 10_000).await;

        assert_eq!(db.balance_of("memberV100").await, Some(10_000));
        assert_eq!(db.balance_of("missing").await, None);
        assert_eq!(db.member_count().await, 1);
        db.assert_pool_reclaimable().await;
    }
}
