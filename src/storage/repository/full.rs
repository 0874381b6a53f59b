// 完整模式存储实现 - 聚合表 + 追加式访问日志

use super::VisitRepository;
use crate::storage::error::StoreError;
use crate::storage::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

/// 完整模式的 SQLite 实现
///
/// 访问日志是事实来源，聚合表是随写随更新的物化视图，
/// 两者在同一个事务内变更，任何时刻都可以从日志重算出聚合
pub struct FullRepository {
    pool: SqlitePool,
}

impl FullRepository {
    /// 创建新的完整模式存储连接
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        info!("初始化完整模式存储: {}", db_path);

        // 确保数据库文件的目录存在
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::StorageUnavailable(sqlx::Error::Io(e)))?;
        }

        // 创建连接池 - ?mode=rwc 确保文件不存在时创建
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

    /// 获取连接池引用
    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl VisitRepository for FullRepository {
    // ========== 写入操作 ==========

    async fn record_visit(
        &self,
        domain: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<DomainAggregate, StoreError> {
        // 日志追加与聚合 upsert 必须落在同一个事务里，
        // 任何一步失败都整体回滚，聚合行与日志不会出现计数偏差
        let mut tx = self.pool.begin().await.map_err(StoreError::WriteFailed)?;

        sqlx::query(
            r#"
            INSERT INTO visits (domain, timestamp)
            VALUES (?1, ?2)
        "#,
        )
        .bind(domain)
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::WriteFailed)?;

        // 提交顺序与时间戳顺序可能不一致（时间戳在写入排队前就已取好），
        // 用 MIN/MAX 收敛边界，保证聚合行始终等于日志的重算结果
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
        // 两张表在同一个事务内清空 - 不允许出现只清了一半的状态
        let mut tx = self.pool.begin().await.map_err(StoreError::WriteFailed)?;

        sqlx::query("DELETE FROM visits")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::WriteFailed)?;

        sqlx::query("DELETE FROM domains")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::WriteFailed)?;

        tx.commit().await.map_err(StoreError::WriteFailed)?;

        info!("已清空所有访问记录");
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
        domain: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<VisitEvent>, StoreError> {
        let visits = match domain {
            Some(domain) => {
                sqlx::query_as::<_, VisitEvent>(
                    r#"
                    SELECT id, domain, timestamp
                    FROM visits
                    WHERE domain = ? AND timestamp >= ?
                    ORDER BY timestamp
                    "#,
                )
                .bind(domain)
                .bind(since)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, VisitEvent>(
                    r#"
                    SELECT id, domain, timestamp
                    FROM visits
                    WHERE timestamp >= ?
                    ORDER BY timestamp
                    "#,
                )
                .bind(since)
                .fetch_all(&self.pool)
                .await
            }
        };

        visits.map_err(StoreError::QueryFailed)
    }

    async fn aggregate_period(
        &self,
        since: DateTime<Utc>,
        domain: Option<&str>,
    ) -> Result<Vec<DomainPeriodStats>, StoreError> {
        // 对访问日志做精确的窗口分组，再关联聚合表取 first_visit；
        // 窗口内没有事件的域名不会出现在结果里
        let stats = match domain {
            Some(domain) => {
                sqlx::query_as::<_, DomainPeriodStats>(
                    r#"
                    SELECT
                        v.domain AS domain,
                        COUNT(*) AS period_visit_count,
                        MAX(v.timestamp) AS period_last_visit,
                        d.first_visit AS first_visit
                    FROM visits v
                    JOIN domains d ON d.domain = v.domain
                    WHERE v.timestamp >= ? AND v.domain = ?
                    GROUP BY v.domain
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
                        v.domain AS domain,
                        COUNT(*) AS period_visit_count,
                        MAX(v.timestamp) AS period_last_visit,
                        d.first_visit AS first_visit
                    FROM visits v
                    JOIN domains d ON d.domain = v.domain
                    WHERE v.timestamp >= ?
                    GROUP BY v.domain
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
        sqlx::query_scalar("SELECT COUNT(*) FROM visits WHERE domain = ? AND timestamp >= ?")
            .bind(domain)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::QueryFailed)
    }

    // ========== 元数据 ==========

    async fn initialize_tables(&self) -> Result<(), StoreError> {
        // 域名聚合表
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

        // 访问日志表（追加写入）
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                timestamp DATETIME NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::StorageUnavailable)?;

        // 模式标记表
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

        sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', '2')")
            .execute(&self.pool)
            .await
            .map_err(StoreError::StorageUnavailable)?;

        // 窗口查询与配额检查的索引
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_visits_domain_timestamp ON visits(domain, timestamp)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::StorageUnavailable)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_visits_timestamp ON visits(timestamp)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::StorageUnavailable)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_domains_last_visit ON domains(last_visit)")
            .execute(&self.pool)
            .await
            .map_err(StoreError::StorageUnavailable)?;

        info!("完整模式表结构初始化完成");
        Ok(())
    }

    async fn get_stats(&self) -> Result<(i64, i64, i64), StoreError> {
        let domain_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM domains")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::QueryFailed)?;

        let visit_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visits")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::QueryFailed)?;

        let total_size: i64 = sqlx::query_scalar(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::QueryFailed)?;

        Ok((domain_count, visit_count, total_size))
    }

    fn schema_mode(&self) -> SchemaMode {
        SchemaMode::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_repo() -> (tempfile::TempDir, FullRepository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repo = FullRepository::new(path.to_str().unwrap()).await.unwrap();
        (dir, repo)
    }

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
            .and_utc()
    }

    #[tokio::test]
    async fn test_record_visit_counts_are_exact() {
        let (_dir, repo) = test_repo().await;
        let t0 = ts(2025, 3, 1, 10, 0, 0);

        // N 次记录后 visit_count == N，first/last 分别为首末时间戳
        for i in 0..5 {
            repo.record_visit("example.com", t0 + Duration::minutes(i))
                .await
                .unwrap();
        }

        let agg = repo.get_aggregate("example.com").await.unwrap().unwrap();
        assert_eq!(agg.visit_count, 5);
        assert_eq!(agg.first_visit, t0);
        assert_eq!(agg.last_visit, t0 + Duration::minutes(4));
    }

    #[tokio::test]
    async fn test_aggregate_matches_event_log() {
        let (_dir, repo) = test_repo().await;
        let t0 = ts(2025, 3, 1, 9, 0, 0);

        for i in 0..7 {
            repo.record_visit("a.com", t0 + Duration::seconds(i))
                .await
                .unwrap();
        }
        repo.record_visit("b.com", t0).await.unwrap();

        // 聚合表是物化视图：从日志重算必须与聚合行一致
        let agg = repo.get_aggregate("a.com").await.unwrap().unwrap();
        let visits = repo
            .list_visits(Some("a.com"), DateTime::UNIX_EPOCH)
            .await
            .unwrap();
        assert_eq!(agg.visit_count, visits.len() as i64);
        assert_eq!(
            agg.last_visit,
            visits.iter().map(|v| v.timestamp).max().unwrap()
        );
        assert_eq!(
            agg.first_visit,
            visits.iter().map(|v| v.timestamp).min().unwrap()
        );
    }

    #[tokio::test]
    async fn test_out_of_order_commits_keep_aggregate_consistent() {
        let (_dir, repo) = test_repo().await;
        let t1 = ts(2025, 3, 1, 12, 0, 0);
        let t2 = ts(2025, 3, 1, 12, 0, 30);

        // 较早的时间戳后提交（并发写入的提交顺序与取时刻顺序无关）
        repo.record_visit("example.com", t2).await.unwrap();
        let agg = repo.record_visit("example.com", t1).await.unwrap();

        assert_eq!(agg.visit_count, 2);
        assert_eq!(agg.first_visit, t1);
        assert_eq!(agg.last_visit, t2);

        // 聚合行仍与日志的重算结果一致
        let visits = repo
            .list_visits(Some("example.com"), DateTime::UNIX_EPOCH)
            .await
            .unwrap();
        assert_eq!(
            agg.last_visit,
            visits.iter().map(|v| v.timestamp).max().unwrap()
        );
        assert_eq!(
            agg.first_visit,
            visits.iter().map(|v| v.timestamp).min().unwrap()
        );
    }

    #[tokio::test]
    async fn test_concurrent_record_visit_no_lost_updates() {
        let (_dir, repo) = test_repo().await;
        let repo = std::sync::Arc::new(repo);
        let t0 = ts(2025, 3, 1, 12, 0, 0);

        // 同一域名并发写入不得丢失计数
        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.record_visit("example.com", t0 + Duration::seconds(i))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let agg = repo.get_aggregate("example.com").await.unwrap().unwrap();
        assert_eq!(agg.visit_count, 20);
    }

    #[tokio::test]
    async fn test_visit_ids_monotonically_increase() {
        let (_dir, repo) = test_repo().await;
        let t0 = ts(2025, 3, 1, 8, 0, 0);

        for i in 0..4 {
            repo.record_visit("example.com", t0 + Duration::seconds(i))
                .await
                .unwrap();
        }

        let visits = repo.list_visits(None, DateTime::UNIX_EPOCH).await.unwrap();
        let ids: Vec<i64> = visits.iter().map(|v| v.id.unwrap()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn test_aggregate_period_excludes_out_of_window() {
        let (_dir, repo) = test_repo().await;

        repo.record_visit("old.com", ts(2025, 2, 1, 10, 0, 0))
            .await
            .unwrap();
        repo.record_visit("new.com", ts(2025, 3, 1, 10, 0, 0))
            .await
            .unwrap();
        repo.record_visit("new.com", ts(2025, 3, 1, 11, 0, 0))
            .await
            .unwrap();

        let stats = repo
            .aggregate_period(ts(2025, 3, 1, 0, 0, 0), None)
            .await
            .unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].domain, "new.com");
        assert_eq!(stats[0].period_visit_count, 2);
        assert_eq!(stats[0].period_last_visit, ts(2025, 3, 1, 11, 0, 0));
    }

    #[tokio::test]
    async fn test_clear_all_leaves_no_residue() {
        let (_dir, repo) = test_repo().await;
        let t0 = ts(2025, 3, 1, 10, 0, 0);

        repo.record_visit("a.com", t0).await.unwrap();
        repo.record_visit("b.com", t0).await.unwrap();
        repo.clear_all().await.unwrap();

        assert!(repo
            .list_aggregates(SortKey::VisitCount)
            .await
            .unwrap()
            .is_empty());
        assert!(repo
            .list_visits(None, DateTime::UNIX_EPOCH)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_list_aggregates_sort_order() {
        let (_dir, repo) = test_repo().await;

        // busy.com 访问多但较早，late.com 访问少但较晚
        for i in 0..3 {
            repo.record_visit("busy.com", ts(2025, 3, 1, 8, i, 0))
                .await
                .unwrap();
        }
        repo.record_visit("late.com", ts(2025, 3, 1, 20, 0, 0))
            .await
            .unwrap();

        let by_count = repo.list_aggregates(SortKey::VisitCount).await.unwrap();
        assert_eq!(by_count[0].domain, "busy.com");

        let by_recency = repo.list_aggregates(SortKey::LastVisit).await.unwrap();
        assert_eq!(by_recency[0].domain, "late.com");
    }

    #[tokio::test]
    async fn test_count_visits_since() {
        let (_dir, repo) = test_repo().await;

        repo.record_visit("example.com", ts(2025, 3, 1, 23, 59, 59))
            .await
            .unwrap();
        repo.record_visit("example.com", ts(2025, 3, 2, 0, 30, 0))
            .await
            .unwrap();

        // 昨天 23:59:59 的访问不落在今天的日历日窗口内
        let count = repo
            .count_visits_since("example.com", ts(2025, 3, 2, 0, 0, 0))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
