//! 异常转换模块
//!
//! 将 sqlx 驱动错误（含数据库原生错误码）转换为 `DataAccessError`。
//! 转换只发生在仓储和连接池边界，服务层不感知任何驱动或错误码细节。

use std::collections::HashSet;

use tracing::debug;

use crate::error::DataAccessError;

/// SQLSTATE 唯一约束冲突（H2 同样使用该错误码）
pub const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
/// SQLITE_CONSTRAINT_PRIMARYKEY
pub const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
/// SQLITE_CONSTRAINT_UNIQUE
pub const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// 异常转换器接口
pub trait ExceptionTranslator: Send + Sync {
    /// 转换驱动错误，`task` 描述失败的操作（如 `member.insert`）
    fn translate(&self, task: &str, err: sqlx::Error) -> DataAccessError;
}

/// 原生错误码分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeClass {
    DuplicateKey,
    ConnectionFailure,
}

/// 基于原生错误码的默认转换器
#[derive(Debug, Clone)]
pub struct SqlErrorCodeTranslator {
    duplicate_key_codes: HashSet<String>,
    connection_failure_codes: HashSet<String>,
}

impl Default for SqlErrorCodeTranslator {
    fn default() -> Self {
        Self {
            duplicate_key_codes: [
                SQLSTATE_UNIQUE_VIOLATION,
                SQLITE_CONSTRAINT_PRIMARYKEY,
                SQLITE_CONSTRAINT_UNIQUE,
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            // SQLITE_CANTOPEN, SQLITE_NOTADB
            connection_failure_codes: ["14", "26"].into_iter().map(String::from).collect(),
        }
    }
}

impl SqlErrorCodeTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加视为键冲突的错误码
    pub fn with_duplicate_key_code(mut self, code: impl Into<String>) -> Self {
        self.duplicate_key_codes.insert(code.into());
        self
    }

    /// 追加视为连接失败的错误码
    pub fn with_connection_failure_code(mut self, code: impl Into<String>) -> Self {
        self.connection_failure_codes.insert(code.into());
        self
    }

    /// 按原生错误码分类
    ///
    /// SQLSTATE `08` 类为连接异常
    pub fn classify(&self, code: &str) -> Option<CodeClass> {
        if self.duplicate_key_codes.contains(code) {
            Some(CodeClass::DuplicateKey)
        } else if self.connection_failure_codes.contains(code)
            || (code.len() == 5 && code.starts_with("08"))
        {
            Some(CodeClass::ConnectionFailure)
        } else {
            None
        }
    }

    fn translate_database(
        &self,
        task: &str,
        db_err: &(dyn sqlx::error::DatabaseError + 'static),
    ) -> DataAccessError {
        let code = db_err.code().map(|c| c.into_owned());
        let message = db_err.message().to_string();

        let class = code.as_deref().and_then(|c| self.classify(c)).or_else(|| {
            // 未登记的错误码回退到驱动自身的约束分类
            db_err.is_unique_violation().then_some(CodeClass::DuplicateKey)
        });

        match class {
            Some(CodeClass::DuplicateKey) => DataAccessError::DuplicateKey {
                task: task.to_string(),
                code: code.unwrap_or_default(),
                message,
            },
            Some(CodeClass::ConnectionFailure) => DataAccessError::ConnectionFailure {
                task: task.to_string(),
                message,
            },
            None => DataAccessError::Store {
                task: task.to_string(),
                code,
                message,
            },
        }
    }
}

impl ExceptionTranslator for SqlErrorCodeTranslator {
    fn translate(&self, task: &str, err: sqlx::Error) -> DataAccessError {
        let translated = match &err {
            sqlx::Error::Database(db_err) => self.translate_database(task, db_err.as_ref()),
            // 驱动不携带主键，实体记为任务名
            sqlx::Error::RowNotFound => DataAccessError::not_found(task, "<unknown>"),
            sqlx::Error::PoolTimedOut => {
                DataAccessError::PoolExhausted(format!("task={}, {}", task, err))
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DataAccessError::ConnectionFailure {
                task: task.to_string(),
                message: err.to_string(),
            },
            _ => DataAccessError::Store {
                task: task.to_string(),
                code: None,
                message: err.to_string(),
            },
        };

        debug!(
            task,
            error_code = translated.error_code(),
            error = %err,
            "数据访问异常已转换"
        );
        translated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_duplicate_codes() {
        let translator = SqlErrorCodeTranslator::new();
        assert_eq!(translator.classify("23505"), Some(CodeClass::DuplicateKey));
        assert_eq!(translator.classify("1555"), Some(CodeClass::DuplicateKey));
        assert_eq!(translator.classify("2067"), Some(CodeClass::DuplicateKey));
    }

    #[test]
    fn test_classify_connection_codes() {
        let translator = SqlErrorCodeTranslator::new();
        assert_eq!(translator.classify("08006"), Some(CodeClass::ConnectionFailure));
        assert_eq!(translator.classify("14"), Some(CodeClass::ConnectionFailure));
        assert_eq!(translator.classify("787"), None);
        // 仅五位 SQLSTATE 才按 08 类判断
        assert_eq!(translator.classify("0801"), None);
    }

    #[test]
    fn test_custom_codes() {
        let translator = SqlErrorCodeTranslator::new()
            .with_duplicate_key_code("1062")
            .with_connection_failure_code("2006");
        assert_eq!(translator.classify("1062"), Some(CodeClass::DuplicateKey));
        assert_eq!(translator.classify("2006"), Some(CodeClass::ConnectionFailure));
    }

    #[test]
    fn test_translate_driver_errors() {
        let translator = SqlErrorCodeTranslator::new();

        assert!(matches!(
            translator.translate("acquire", sqlx::Error::PoolTimedOut),
            DataAccessError::PoolExhausted(_)
        ));
        assert!(matches!(
            translator.translate("acquire", sqlx::Error::PoolClosed),
            DataAccessError::ConnectionFailure { .. }
        ));
        match translator.translate("member.find_by_id", sqlx::Error::RowNotFound) {
            DataAccessError::NotFound { entity, id } => {
                assert_eq!(entity, "member.find_by_id");
                assert_eq!(id, "<unknown>");
            }
            other => panic!("unexpected: {:?}", other),
        }

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(
            translator.translate("query", sqlx::Error::Io(io)).error_code(),
            "CONNECTION_FAILURE"
        );
    }
}
