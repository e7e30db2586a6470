//! 会员服务
//!
//! 会员的创建、查询与删除。创建时遇到主键冲突会重新生成 ID 并重试一次。

use std::fmt;
use std::sync::Arc;

use member_shared::error::DataAccessError;
use member_shared::observability::metrics;
use rand::Rng;
use tracing::{info, instrument, warn};

use crate::error::{MemberError, Result};
use crate::models::Member;
use crate::repository::{MemberRepository, MemberRepositoryTrait};

/// 主键冲突时的 ID 生成函数，入参为冲突的 ID
pub type IdGenerator = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// 默认 ID 生成：在原 ID 后追加 0..10000 的随机数
pub fn random_suffix_generator() -> IdGenerator {
    Arc::new(|id: &str| format!("{}{}", id, rand::rng().random_range(0..10_000)))
}

pub struct MemberService<R = MemberRepository> {
    repo: Arc<R>,
    id_generator: IdGenerator,
}

impl<R: MemberRepositoryTrait> MemberService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            id_generator: random_suffix_generator(),
        }
    }

    pub fn with_id_generator(mut self, id_generator: IdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// 创建会员
    ///
    /// 主键冲突时用新生成的 ID 重试一次，返回实际写入的会员
    #[instrument(skip(self))]
    pub async fn create(&self, id: &str, balance: i64) -> Result<Member> {
        if id.is_empty() {
            return Err(MemberError::validation(id, "会员 ID 不能为空"));
        }
        if balance < 0 {
            return Err(MemberError::validation(id, "初始余额不能为负数"));
        }

        match self.repo.insert(None, &Member::new(id, balance)).await {
            Ok(member) => {
                info!(member_id = %member.id, "会员已创建");
                Ok(member)
            }
            Err(e) if e.is_duplicate_key() => {
                let retry_id = (self.id_generator)(id);
                warn!(member_id = %id, retry_id = %retry_id, "会员 ID 冲突，使用新 ID 重试");

                let result = self.repo.insert(None, &Member::new(retry_id, balance)).await;
                metrics::record_duplicate_recovery(result.is_ok());
                let member = result?;
                info!(member_id = %member.id, "会员已创建");
                Ok(member)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 按 ID 查询会员
    pub async fn find(&self, id: &str) -> Result<Member> {
        Ok(self.repo.find_by_id(None, id).await?)
    }

    /// 删除会员，不存在时返回 `NotFound`
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let affected = self.repo.delete(None, id).await?;
        if affected == 0 {
            return Err(DataAccessError::not_found("member", id).into());
        }
        info!(member_id = %id, "会员已删除");
        Ok(())
    }
}

impl<R> fmt::Debug for MemberService<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberService").finish_non_exhaustive()
    }
}
