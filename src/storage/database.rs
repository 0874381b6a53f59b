// 存储句柄 - 进程级懒打开与模式检测

use super::cache::CachedRepository;
use super::config::{DatabaseConfig, StorageConfig};
use super::error::StoreError;
use super::models::SchemaMode;
use super::repository::degraded::DegradedRepository;
use super::repository::full::FullRepository;
use super::repository::VisitRepository;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// 进程级存储句柄
///
/// 首次使用时才真正打开数据库并检测模式；并发的首次调用共享
/// 同一个进行中的打开操作，不会竞争出重复建表。打开失败不会
/// 固化：下一次调用会重新尝试
pub struct StorageHandle {
    db_path: String,
    repo: OnceCell<Arc<dyn VisitRepository>>,
}

impl StorageHandle {
    pub fn new(config: &StorageConfig) -> Self {
        let DatabaseConfig::SQLite { db_path } = &config.database;
        Self {
            db_path: db_path.clone(),
            repo: OnceCell::new(),
        }
    }

    /// 获取仓库实例，必要时执行首次打开
    pub async fn repository(&self) -> Result<Arc<dyn VisitRepository>, StoreError> {
        self.repo
            .get_or_try_init(|| open_repository(&self.db_path))
            .await
            .cloned()
    }

    /// 存储是否已经打开（监控用，不触发打开）
    pub fn is_open(&self) -> bool {
        self.repo.initialized()
    }
}

/// 打开数据库，检测模式，构建对应的仓库实现
///
/// 模式只在这里确定一次，之后所有调用都通过 trait 对象进行
async fn open_repository(db_path: &str) -> Result<Arc<dyn VisitRepository>, StoreError> {
    info!("打开访问数据库: {}", db_path);

    if let Some(parent) = std::path::Path::new(db_path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::StorageUnavailable(sqlx::Error::Io(e)))?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .idle_timeout(std::time::Duration::from_secs(300))
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await
        .map_err(StoreError::StorageUnavailable)?;

    let mode = detect_schema_mode(&pool).await?;

    let repo: Arc<dyn VisitRepository> = match mode {
        SchemaMode::Degraded => {
            warn!("检测到旧版布局（仅聚合表），窗口查询将退化为近似值");
            let inner = DegradedRepository::from_pool(pool);
            inner.initialize_tables().await?;
            Arc::new(CachedRepository::new(Arc::new(inner)))
        }
        SchemaMode::Full => {
            let inner = FullRepository::from_pool(pool);
            inner.initialize_tables().await?;
            Arc::new(CachedRepository::new(Arc::new(inner)))
        }
    };

    info!("存储已就绪，模式: {:?}", repo.schema_mode());
    Ok(repo)
}

/// 检测数据库布局版本
///
/// meta 表的版本标记优先；没有标记时，只有 domains 而没有 visits
/// 的数据库判定为旧版布局；全新文件使用完整模式。绝不假设更丰富
/// 的布局一定存在
async fn detect_schema_mode(pool: &SqlitePool) -> Result<SchemaMode, StoreError> {
    if table_exists(pool, "meta").await? {
        let version: Option<String> =
            sqlx::query_scalar("SELECT value FROM meta WHERE key = 'schema_version'")
                .fetch_optional(pool)
                .await
                .map_err(StoreError::StorageUnavailable)?;

        if let Some(version) = version {
            return Ok(match version.as_str() {
                "1" => SchemaMode::Degraded,
                _ => SchemaMode::Full,
            });
        }
    }

    let has_domains = table_exists(pool, "domains").await?;
    let has_visits = table_exists(pool, "visits").await?;

    Ok(if has_domains && !has_visits {
        SchemaMode::Degraded
    } else {
        SchemaMode::Full
    })
}

async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool, StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(pool)
            .await
            .map_err(StoreError::StorageUnavailable)?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::local_now;

    fn handle_for(path: &std::path::Path) -> StorageHandle {
        StorageHandle::new(&StorageConfig {
            database: DatabaseConfig::SQLite {
                db_path: path.to_str().unwrap().to_string(),
            },
        })
    }

    #[tokio::test]
    async fn test_fresh_database_selects_full_mode() {
        let dir = tempfile::tempdir().unwrap();
        let handle = handle_for(&dir.path().join("fresh.db"));

        let repo = handle.repository().await.unwrap();
        assert_eq!(repo.schema_mode(), SchemaMode::Full);
    }

    #[tokio::test]
    async fn test_legacy_layout_selects_degraded_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");

        // 先用旧版实现写入，确认重新打开时检测为降级模式
        {
            let repo = DegradedRepository::new(path.to_str().unwrap())
                .await
                .unwrap();
            repo.record_visit("example.com", local_now()).await.unwrap();
        }

        let handle = handle_for(&path);
        let repo = handle.repository().await.unwrap();
        assert_eq!(repo.schema_mode(), SchemaMode::Degraded);
        assert_eq!(
            repo.get_aggregate("example.com")
                .await
                .unwrap()
                .unwrap()
                .visit_count,
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_open_shares_one_init() {
        let dir = tempfile::tempdir().unwrap();
        let handle = Arc::new(handle_for(&dir.path().join("race.db")));

        // 并发首次打开不得竞争出重复建表
        let mut handles = Vec::new();
        for _ in 0..8 {
            let handle = handle.clone();
            handles.push(tokio::spawn(async move {
                handle.repository().await.map(|r| r.schema_mode())
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), SchemaMode::Full);
        }
        assert!(handle.is_open());
    }

    #[tokio::test]
    async fn test_reopen_keeps_full_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");

        {
            let handle = handle_for(&path);
            let repo = handle.repository().await.unwrap();
            repo.record_visit("example.com", local_now()).await.unwrap();
        }

        let handle = handle_for(&path);
        let repo = handle.repository().await.unwrap();
        assert_eq!(repo.schema_mode(), SchemaMode::Full);
    }
}
