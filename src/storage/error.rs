// 存储层错误定义 - 带标签的错误类型，调用方可据此决定重试策略

use thiserror::Error;

/// 存储层错误
///
/// 所有仓库操作以此类型失败，绝不在存储层内 panic：
/// - `StorageUnavailable`: 数据库打开失败，后续所有操作都会失败，直到重试成功
/// - `WriteFailed`: 写事务失败并已回滚，聚合行与访问日志不会出现不一致，可重试
/// - `QueryFailed`: 读查询失败，调用方应退化为空结果并记录日志
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("存储不可用: {0}")]
    StorageUnavailable(#[source] sqlx::Error),

    #[error("写入失败: {0}")]
    WriteFailed(#[source] sqlx::Error),

    #[error("查询失败: {0}")]
    QueryFailed(#[source] sqlx::Error),
}

impl StoreError {
    /// 该错误是否允许调用方原样重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::WriteFailed(_) | StoreError::StorageUnavailable(_)
        )
    }
}
