// 数据模型定义 - 访问统计相关的数据库实体结构

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// 获取当前本地时间（以 DateTime<Utc> 类型表示，但值为本地时间）
/// 数据库中统一存储本地墙上时间，日历日边界计算因此不需要时区转换
pub fn local_now() -> DateTime<Utc> {
    Local::now().naive_local().and_utc()
}

/// 域名聚合行 - 每个不同域名一条
///
/// 约束：`visit_count` 与访问日志中该域名的行数严格一致，
/// `first_visit` 一经写入不再变更，`last_visit` 单调不减
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DomainAggregate {
    /// 规范化后的主机名（小写，无 scheme/路径），唯一键
    pub domain: String,
    #[serde(serialize_with = "serialize_datetime_as_local")]
    pub first_visit: DateTime<Utc>,
    #[serde(serialize_with = "serialize_datetime_as_local")]
    pub last_visit: DateTime<Utc>,
    pub visit_count: i64,
}

/// 单次访问事件 - 追加写入，永不更新
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VisitEvent {
    /// 由存储层分配的单调递增ID
    pub id: Option<i64>,
    pub domain: String,
    #[serde(serialize_with = "serialize_datetime_as_local")]
    pub timestamp: DateTime<Utc>,
}

/// 某时间窗口内的域名统计（周期聚合查询的输出行）
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DomainPeriodStats {
    pub domain: String,
    /// 窗口内的访问次数（降级模式下为终身计数的近似值）
    pub period_visit_count: i64,
    #[serde(serialize_with = "serialize_datetime_as_local")]
    pub period_last_visit: DateTime<Utc>,
    #[serde(serialize_with = "serialize_datetime_as_local")]
    pub first_visit: DateTime<Utc>,
}

/// 聚合列表的排序字段，均为降序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    LastVisit,
    VisitCount,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::VisitCount
    }
}

/// 存储层模式标识 - 打开数据库时一次性确定，之后不再按调用分支
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMode {
    /// 完整模式：聚合表 + 追加式访问日志，周期查询精确
    Full,
    /// 降级模式：仅聚合表（旧版布局），周期查询为近似值
    Degraded,
}

/// 自定义序列化：DateTime<Utc> -> 不带时区标记的字符串
/// 数据库中存储的已经是本地时间（虽然类型是DateTime<Utc>），
/// 直接格式化为 "YYYY-MM-DDTHH:MM:SS"，前端不再做时区转换
pub(crate) fn serialize_datetime_as_local<S>(
    dt: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_serde() {
        let json = serde_json::to_string(&SortKey::LastVisit).unwrap();
        assert_eq!(json, "\"last_visit\"");
        let key: SortKey = serde_json::from_str("\"visit_count\"").unwrap();
        assert_eq!(key, SortKey::VisitCount);
    }

    #[test]
    fn test_aggregate_serializes_local_timestamp() {
        let ts = chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
            .and_utc();
        let agg = DomainAggregate {
            domain: "example.com".to_string(),
            first_visit: ts,
            last_visit: ts,
            visit_count: 1,
        };
        let json = serde_json::to_string(&agg).unwrap();
        assert!(json.contains("2025-03-01T08:30:00"));
        assert!(!json.contains('Z'));
    }
}
