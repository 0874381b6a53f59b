//! 访问写入与清空命令

use crate::event_bus::AppEvent;
use crate::storage::{local_now, DomainAggregate};
use crate::AppState;
use tracing::info;

/// 验证域名参数是否有效
fn validate_domain(domain: &str) -> Result<(), String> {
    if domain.is_empty() || domain.contains('/') || domain.contains(char::is_whitespace) {
        return Err(format!("无效的域名: {:?}", domain));
    }
    Ok(())
}

/// 记录一次对指定域名的访问，返回更新后的聚合行
///
/// 聚合行与访问日志在同一事务内落盘；失败时整体回滚，
/// 调用方可重试
pub async fn record_visit(state: &AppState, domain: String) -> Result<DomainAggregate, String> {
    validate_domain(&domain)?;
    let domain = domain.to_lowercase();

    let repo = state.storage.repository().await.map_err(|e| e.to_string())?;
    let timestamp = local_now();
    let aggregate = repo
        .record_visit(&domain, timestamp)
        .await
        .map_err(|e| e.to_string())?;

    state.event_bus.publish(AppEvent::VisitRecorded {
        domain,
        timestamp,
        aggregate: aggregate.clone(),
    });

    Ok(aggregate)
}

/// 清空所有访问记录（两张表原子清空）
pub async fn clear_domains(state: &AppState) -> Result<(), String> {
    info!("手动触发清空访问记录");
    state
        .storage
        .repository()
        .await
        .map_err(|e| e.to_string())?
        .clear_all()
        .await
        .map_err(|e| e.to_string())?;

    state.event_bus.publish(AppEvent::StorageCleared);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_domain() {
        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("").is_err());
        assert!(validate_domain("example.com/path").is_err());
        assert!(validate_domain("exa mple.com").is_err());
    }
}
