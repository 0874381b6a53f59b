// Repository 抽象层 - 定义访问存储的操作接口

pub mod degraded;
pub mod full;

use super::error::StoreError;
use super::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 访问存储操作接口 - 完整模式与降级模式都必须实现此 trait
///
/// 模式在打开数据库时一次性确定，调用方只持有 trait 对象，
/// 不允许在单次调用里再按模式分支
#[async_trait]
pub trait VisitRepository: Send + Sync {
    // ========== 写入操作 ==========

    /// 记录一次访问
    ///
    /// 单个事务内完成访问日志追加与聚合行 upsert：
    /// 域名不存在时以 count=1 创建，存在时 count+1 并推进 last_visit，
    /// first_visit 保持不变。并发调用不会丢失计数
    async fn record_visit(
        &self,
        domain: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<DomainAggregate, StoreError>;

    /// 原子清空所有表 - 要么全部清空，要么保持原状
    async fn clear_all(&self) -> Result<(), StoreError>;

    // ========== 读取操作 ==========

    /// 获取单个域名的聚合行
    async fn get_aggregate(&self, domain: &str) -> Result<Option<DomainAggregate>, StoreError>;

    /// 获取所有聚合行，按指定字段降序
    ///
    /// 每次调用都是一次新的读取，结果物化为 Vec
    async fn list_aggregates(&self, order: SortKey) -> Result<Vec<DomainAggregate>, StoreError>;

    /// 获取 timestamp >= since 的访问事件，按时间升序
    /// domain 为 None 时返回所有域名的事件
    async fn list_visits(
        &self,
        domain: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<VisitEvent>, StoreError>;

    /// 窗口聚合：统计 timestamp >= since 的访问，按域名分组
    ///
    /// 完整模式对访问日志做精确的 GROUP BY；
    /// 降级模式只能以 last_visit 是否落在窗口内作为启发式，
    /// 命中时用终身 visit_count 充当窗口计数（已知的不精确近似）
    async fn aggregate_period(
        &self,
        since: DateTime<Utc>,
        domain: Option<&str>,
    ) -> Result<Vec<DomainPeriodStats>, StoreError>;

    /// 统计单个域名在 timestamp >= since 内的访问次数（配额检查路径）
    async fn count_visits_since(
        &self,
        domain: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    // ========== 元数据 ==========

    /// 初始化表结构
    async fn initialize_tables(&self) -> Result<(), StoreError>;

    /// 获取存储统计信息 (域名数, 访问事件数, 数据库大小)
    async fn get_stats(&self) -> Result<(i64, i64, i64), StoreError>;

    /// 当前存储模式
    fn schema_mode(&self) -> SchemaMode;
}
