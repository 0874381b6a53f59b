// 时间窗口定义与边界计算

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 聚合查询的时间窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Week,
    Month,
    All,
}

impl Period {
    /// 计算窗口起点
    ///
    /// `today` 用日历日语义：取 `now` 所在日的零点，而不是滚动的
    /// 24 小时窗口——昨天 23:59 的访问与今天 00:01 的查询只差两分钟
    /// 但不属于"今天"。`week`/`month` 是滚动窗口，`all` 从纪元起
    ///
    /// `now` 按本地墙上时间传入（见 storage::local_now 的存储约定）
    pub fn start_boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Period::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always valid")
                .and_utc(),
            Period::Week => now - Duration::hours(7 * 24),
            Period::Month => now - Duration::hours(30 * 24),
            Period::All => DateTime::UNIX_EPOCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(d: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(2025, 3, d)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_today_is_calendar_day_not_rolling_window() {
        // 00:01 的访问与 23:59 的查询相隔近 24 小时，但同属"今天"
        let late_query = ts(5, 23, 59, 0);
        let boundary = Period::Today.start_boundary(late_query);
        assert!(ts(5, 0, 1, 0) >= boundary);

        // 昨天 23:59 的访问在今天 00:01 查询时必须被排除
        let early_query = ts(6, 0, 1, 0);
        let boundary = Period::Today.start_boundary(early_query);
        assert!(ts(5, 23, 59, 0) < boundary);
        assert_eq!(boundary, ts(6, 0, 0, 0));
    }

    #[test]
    fn test_boundary_inclusive_at_midnight_edge() {
        // 23:59:59 的访问在当天 23:59:59 查询时仍在窗口内
        let boundary = Period::Today.start_boundary(ts(5, 23, 59, 59));
        assert!(ts(5, 23, 59, 59) >= boundary);

        // 次日 00:00:01 查询时则不在
        let boundary = Period::Today.start_boundary(ts(6, 0, 0, 1));
        assert!(ts(5, 23, 59, 59) < boundary);
    }

    #[test]
    fn test_week_and_month_are_rolling() {
        let now = ts(31, 12, 0, 0);
        assert_eq!(Period::Week.start_boundary(now), ts(24, 12, 0, 0));
        assert_eq!(Period::Month.start_boundary(now), ts(1, 12, 0, 0));
    }

    #[test]
    fn test_all_starts_at_epoch() {
        assert_eq!(
            Period::All.start_boundary(ts(1, 0, 0, 0)),
            DateTime::UNIX_EPOCH
        );
    }

    #[test]
    fn test_period_serde() {
        assert_eq!(serde_json::to_string(&Period::Today).unwrap(), "\"today\"");
        let p: Period = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(p, Period::All);
    }
}
