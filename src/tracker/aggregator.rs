// 周期聚合器 - 把时间窗口翻译成存储查询并整理排序

use super::period::Period;
use crate::storage::{DomainPeriodStats, SortKey, StoreError, VisitRepository};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 周期聚合器
///
/// 算法：计算窗口起点，交给仓库做分组统计（完整/降级模式各有
/// 策略），再按调用方要求的字段降序排序。窗口内没有事件的域名
/// 不会出现在结果里
pub struct PeriodAggregator {
    repo: Arc<dyn VisitRepository>,
}

impl PeriodAggregator {
    pub fn new(repo: Arc<dyn VisitRepository>) -> Self {
        Self { repo }
    }

    /// 查询窗口内所有域名的统计，按 sort 降序
    pub async fn domains(
        &self,
        period: Period,
        sort: SortKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<DomainPeriodStats>, StoreError> {
        let boundary = period.start_boundary(now);
        let mut stats = self.repo.aggregate_period(boundary, None).await?;

        match sort {
            SortKey::VisitCount => {
                stats.sort_by(|a, b| {
                    b.period_visit_count
                        .cmp(&a.period_visit_count)
                        .then_with(|| b.period_last_visit.cmp(&a.period_last_visit))
                });
            }
            SortKey::LastVisit => {
                stats.sort_by(|a, b| b.period_last_visit.cmp(&a.period_last_visit));
            }
        }

        Ok(stats)
    }

    /// 查询单个域名在窗口内的统计，窗口内无访问时返回 None
    pub async fn domain(
        &self,
        domain: &str,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<Option<DomainPeriodStats>, StoreError> {
        let boundary = period.start_boundary(now);
        let stats = self.repo.aggregate_period(boundary, Some(domain)).await?;
        Ok(stats.into_iter().next())
    }

    /// 今天窗口内某域名的访问次数（配额检查路径）
    pub async fn today_count(&self, domain: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let boundary = Period::Today.start_boundary(now);
        self.repo.count_visits_since(domain, boundary).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FullRepository;
    use chrono::Duration;

    async fn aggregator() -> (tempfile::TempDir, Arc<dyn VisitRepository>, PeriodAggregator) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agg.db");
        let repo: Arc<dyn VisitRepository> =
            Arc::new(FullRepository::new(path.to_str().unwrap()).await.unwrap());
        let agg = PeriodAggregator::new(repo.clone());
        (dir, repo, agg)
    }

    fn ts(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(2025, 3, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
            .and_utc()
    }

    #[tokio::test]
    async fn test_scenario_today_vs_all() {
        let (_dir, repo, agg) = aggregator().await;

        // T、T+1min、T+25h 三次访问；在 T+26h 查询
        let t = ts(1, 10, 0);
        repo.record_visit("example.com", t).await.unwrap();
        repo.record_visit("example.com", t + Duration::minutes(1))
            .await
            .unwrap();
        repo.record_visit("example.com", t + Duration::hours(25))
            .await
            .unwrap();

        let query_time = t + Duration::hours(26);

        // today 只包含 T+25h 那一次（T+25h 与查询时刻同属一个日历日）
        let today = agg
            .domain("example.com", Period::Today, query_time)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(today.period_visit_count, 1);

        // all 包含全部三次
        let all = agg
            .domain("example.com", Period::All, query_time)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(all.period_visit_count, 3);
    }

    #[tokio::test]
    async fn test_yesterday_excluded_two_minutes_apart() {
        let (_dir, repo, agg) = aggregator().await;

        repo.record_visit("example.com", ts(1, 23, 59))
            .await
            .unwrap();

        // 两分钟后查询，但已跨日历日
        let result = agg
            .domain("example.com", Period::Today, ts(2, 0, 1))
            .await
            .unwrap();
        assert!(result.is_none());

        assert_eq!(agg.today_count("example.com", ts(2, 0, 1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sorting_by_count_and_recency() {
        let (_dir, repo, agg) = aggregator().await;

        for i in 0..3 {
            repo.record_visit("busy.com", ts(1, 8, i)).await.unwrap();
        }
        repo.record_visit("late.com", ts(1, 20, 0)).await.unwrap();

        let by_count = agg
            .domains(Period::All, SortKey::VisitCount, ts(1, 21, 0))
            .await
            .unwrap();
        assert_eq!(by_count[0].domain, "busy.com");

        let by_recency = agg
            .domains(Period::All, SortKey::LastVisit, ts(1, 21, 0))
            .await
            .unwrap();
        assert_eq!(by_recency[0].domain, "late.com");
    }

    #[tokio::test]
    async fn test_today_count_for_quota_path() {
        let (_dir, repo, agg) = aggregator().await;

        for i in 0..5 {
            repo.record_visit("example.com", ts(2, 9, i)).await.unwrap();
        }
        repo.record_visit("example.com", ts(1, 9, 0)).await.unwrap();

        assert_eq!(
            agg.today_count("example.com", ts(2, 12, 0)).await.unwrap(),
            5
        );
    }
}
