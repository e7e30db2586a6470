//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现

use async_trait::async_trait;
use member_shared::error::Result;
use member_shared::transaction::TransactionContext;

use crate::models::Member;

/// 会员仓储接口
// mockall 无法为 `Option<&mut TransactionContext>` 参数生成 mock，测试改用包装真实仓储的实现
#[async_trait]
pub trait MemberRepositoryTrait: Send + Sync {
    /// 按 ID 查询，不存在时返回 `NotFound`
    async fn find_by_id(&self, ctx: Option<&mut TransactionContext>, id: &str) -> Result<Member>;

    /// 更新余额，返回受影响的行数
    async fn update_balance(
        &self,
        ctx: Option<&mut TransactionContext>,
        id: &str,
        balance: i64,
    ) -> Result<u64>;

    /// 插入会员，主键冲突时返回 `DuplicateKey`
    async fn insert(&self, ctx: Option<&mut TransactionContext>, member: &Member) -> Result<Member>;

    /// 删除会员，返回受影响的行数
    async fn delete(&self, ctx: Option<&mut TransactionContext>, id: &str) -> Result<u64>;
}
