// 降级模式存储实现 - 仅聚合表的旧版布局

use super::VisitRepository;
use crate::storage::error::StoreError;
use crate::storage::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{info, warn};

/// 降级模式的 SQLite 实现
///
/// 旧版数据库只有聚合表，没有逐次访问日志。窗口查询只能用
/// last_visit 的新近程度做启发式：last_visit 落在窗口内的域名
/// 以终身 visit_count 充当窗口计数。这是有意保留的不精确近似，
/// 不要在未确认产品意图前把它"修"成精确值
pub struct DegradedRepository {
    pool: SqlitePool,
}

impl DegradedRepository {
    /// 创建新的降级模式存储连接
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        info!("初始化降级模式存储: {}", db_path);

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

        let repo = Self { pool };
        repo.initialize_tables().await?;

        Ok(repo)
    }

    /// 基于已打开的连接池构建（模式检测完成后由 StorageHandle 调用）
    pub(crate) fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VisitRepository for DegradedRepository {
    // ========== 写入操作 ==========

    async fn record_visit(
        &self,
        domain: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<DomainAggregate, StoreError> {
        // 没有日志表，upsert 聚合行本身就是完整的写事务
        let mut tx = self.pool.begin().await.map_err(StoreError::WriteFailed)?;

        // 与完整模式相同的边界收敛：乱序提交不得回拨 last_visit
        // 或推进 first_visit
        sqlx::query(
            r#"
            INSERT INTO domains (domain, first_visit, last_visit, visit_count)
            VALUES (?1, ?2, ?2, 1)
            ON CONFLICT(domain) DO UPDATE SET
                visit_count = visit_count + 1,
                first_visit = MIN(first_visit, excluded.first_visit),
                last_visit = MAX(last_visit, excluded.last_visit)
        "#,
        )
        .bind(domain)
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::WriteFailed)?;

        let aggregate = sqlx::query_as::<_, DomainAggregate>(
            r#"
            SELECT domain, first_visit, last_visit, visit_count
            FROM domains
            WHERE domain = ?
            "#,
        )
        .bind(domain)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::WriteFailed)?;

        tx.commit().await.map_err(StoreError::WriteFailed)?;

        Ok(aggregate)
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM domains")
            .execute(&self.pool)
            .await
            .map_err(StoreError::WriteFailed)?;

        info!("已清空所有访问记录（降级模式）");
        Ok(())
    }

    // ========== 读取操作 ==========

    async fn get_aggregate(&self, domain: &str) -> Result<Option<DomainAggregate>, StoreError> {
        sqlx::query_as::<_, DomainAggregate>(
            r#"
            SELECT domain, first_visit, last_visit, visit_count
            FROM domains
            WHERE domain = ?
            "#,
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::QueryFailed)
    }

    async fn list_aggregates(&self, order: SortKey) -> Result<Vec<DomainAggregate>, StoreError> {
        let sql = match order {
            SortKey::LastVisit => {
                r#"
                SELECT domain, first_visit, last_visit, visit_count
                FROM domains
                ORDER BY last_visit DESC
                "#
            }
            SortKey::VisitCount => {
                r#"
                SELECT domain, first_visit, last_visit, visit_count
                FROM domains
                ORDER BY visit_count DESC
                "#
            }
        };

        sqlx::query_as::<_, DomainAggregate>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::QueryFailed)
    }

    async fn list_visits(
        &self,
        _domain: Option<&str>,
        _since: DateTime<Utc>,
    ) -> Result<Vec<VisitEvent>, StoreError> {
        // 旧版布局没有逐次记录，按空序列处理
        warn!("降级模式不保存访问日志，list_visits 返回空");
        Ok(Vec::new())
    }

    async fn aggregate_period(
        &self,
        since: DateTime<Utc>,
        domain: Option<&str>,
    ) -> Result<Vec<DomainPeriodStats>, StoreError> {
        // 启发式窗口查询：last_visit 在窗口内则报告终身计数
        let stats = match domain {
            Some(domain) => {
                sqlx::query_as::<_, DomainPeriodStats>(
                    r#"
                    SELECT
                        domain,
                        visit_count AS period_visit_count,
                        last_visit AS period_last_visit,
                        first_visit
                    FROM domains
                    WHERE last_visit >= ? AND domain = ?
                    "#,
                )
                .bind(since)
                .bind(domain)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, DomainPeriodStats>(
                    r#"
                    SELECT
                        domain,
                        visit_count AS period_visit_count,
                        last_visit AS period_last_visit,
                        first_visit
                    FROM domains
                    WHERE last_visit >= ?
                    "#,
                )
                .bind(since)
                .fetch_all(&self.pool)
                .await
            }
        };

        stats.map_err(StoreError::QueryFailed)
    }

    async fn count_visits_since(
        &self,
        domain: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        // 与 aggregate_period 相同的近似：新近访问过就按终身计数算
        let aggregate = self.get_aggregate(domain).await?;
        Ok(match aggregate {
            Some(agg) if agg.last_visit >= since => agg.visit_count,
            _ => 0,
        })
    }

    // ========== 元数据 ==========

    async fn initialize_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS domains (
                domain TEXT PRIMARY KEY,
                first_visit DATETIME NOT NULL,
                last_visit DATETIME NOT NULL,
                visit_count INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::StorageUnavailable)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::StorageUnavailable)?;

        sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '1')")
            .execute(&self.pool)
            .await
            .map_err(StoreError::StorageUnavailable)?;

        info!("降级模式表结构初始化完成");
        Ok(())
    }

    async fn get_stats(&self) -> Result<(i64, i64, i64), StoreError> {
        let domain_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM domains")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::QueryFailed)?;

        let total_size: i64 = sqlx::query_scalar(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::QueryFailed)?;

        // 没有日志表，事件数报 0
        Ok((domain_count, 0, total_size))
    }

    fn schema_mode(&self) -> SchemaMode {
        SchemaMode::Degraded
    }
}
