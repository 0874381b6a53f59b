//! 数据查询命令
//!
//! 提供各类数据查询接口，包括：
//! - 窗口聚合查询（弹窗列表）
//! - 数据库状态查询
//! - 存储统计查询

use crate::storage::{self, local_now, DomainPeriodStats, SchemaMode, SortKey};
use crate::tracker::{Period, PeriodAggregator};
use crate::AppState;
use serde::Serialize;
use tracing::warn;

/// 数据库状态
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatus {
    pub opened: bool,
    pub schema_mode: Option<SchemaMode>,
}

/// 获取指定窗口内的域名统计列表
///
/// # 参数
/// - `period`: 时间窗口 (today/week/month/all)
/// - `sort_by`: 排序字段 (visit_count/last_visit)，降序
///
/// 查询失败时退化为空列表并记录日志——弹窗显示空态，
/// 不弹错误对话框
pub async fn get_domains(
    state: &AppState,
    period: Period,
    sort_by: SortKey,
) -> Result<Vec<DomainPeriodStats>, String> {
    let repo = match state.storage.repository().await {
        Ok(repo) => repo,
        Err(e) => {
            warn!("存储不可用，域名列表返回空: {}", e);
            return Ok(Vec::new());
        }
    };

    let aggregator = PeriodAggregator::new(repo);
    match aggregator.domains(period, sort_by, local_now()).await {
        Ok(domains) => Ok(domains),
        Err(e) => {
            warn!("域名统计查询失败，返回空列表: {}", e);
            Ok(Vec::new())
        }
    }
}

/// 获取单个域名的访问事件列表（timestamp >= 窗口起点，升序）
pub async fn get_visits(
    state: &AppState,
    domain: String,
    period: Period,
) -> Result<Vec<storage::VisitEvent>, String> {
    let repo = state.storage.repository().await.map_err(|e| e.to_string())?;
    let since = period.start_boundary(local_now());
    repo.list_visits(Some(&domain), since)
        .await
        .map_err(|e| e.to_string())
}

/// 获取数据库状态
pub async fn get_database_status(state: &AppState) -> Result<DatabaseStatus, String> {
    if !state.storage.is_open() {
        return Ok(DatabaseStatus {
            opened: false,
            schema_mode: None,
        });
    }
    let repo = state.storage.repository().await.map_err(|e| e.to_string())?;
    Ok(DatabaseStatus {
        opened: true,
        schema_mode: Some(repo.schema_mode()),
    })
}

/// 获取存储统计信息 (域名数, 访问事件数, 数据库大小)
pub async fn get_stats(state: &AppState) -> Result<(i64, i64, i64), String> {
    state
        .storage
        .repository()
        .await
        .map_err(|e| e.to_string())?
        .get_stats()
        .await
        .map_err(|e| e.to_string())
}
