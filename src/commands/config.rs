//! 配置开关命令
//!
//! 所有开关都经由 SettingsManager 单一入口落盘；
//! 分类器和配额评估器在下一次调用时拿到新快照

use crate::event_bus::AppEvent;
use crate::models::{AppConfig, PersistedAppConfig};
use crate::AppState;
use tracing::info;

/// 获取应用配置
pub async fn get_app_config(state: &AppState) -> Result<PersistedAppConfig, String> {
    Ok(state.settings.get().await)
}

/// 更新配置（部分更新，只写入 Some 的字段）
pub async fn update_config(
    state: &AppState,
    config: AppConfig,
) -> Result<PersistedAppConfig, String> {
    let updated = state
        .settings
        .update(config)
        .await
        .map_err(|e| e.to_string())?;

    state.event_bus.publish(AppEvent::ConfigUpdated {
        config_type: "app".to_string(),
    });

    Ok(updated)
}

/// 切换访问追踪总开关
pub async fn toggle_tracking(state: &AppState, enabled: bool) -> Result<(), String> {
    info!("访问追踪开关: {}", enabled);
    apply_toggle(
        state,
        AppConfig {
            tracking_enabled: Some(enabled),
            ..Default::default()
        },
        "tracking",
    )
    .await
}

/// 切换弹窗展示开关
pub async fn toggle_popup(state: &AppState, enabled: bool) -> Result<(), String> {
    apply_toggle(
        state,
        AppConfig {
            popup_enabled: Some(enabled),
            ..Default::default()
        },
        "popup",
    )
    .await
}

/// 切换配额功能开关
pub async fn toggle_quota(state: &AppState, enabled: bool) -> Result<(), String> {
    info!("配额功能开关: {}", enabled);
    apply_toggle(
        state,
        AppConfig {
            quota_enabled: Some(enabled),
            ..Default::default()
        },
        "quota",
    )
    .await
}

/// 切换硬阻断开关
pub async fn toggle_hard_block(state: &AppState, enabled: bool) -> Result<(), String> {
    info!("硬阻断开关: {}", enabled);
    apply_toggle(
        state,
        AppConfig {
            hard_block_enabled: Some(enabled),
            ..Default::default()
        },
        "hard_block",
    )
    .await
}

/// 设置单个域名的当日访问上限（0 表示移除配额）
pub async fn set_site_quota(
    state: &AppState,
    domain: String,
    max_per_day: u32,
) -> Result<PersistedAppConfig, String> {
    info!("设置配额: {} -> {}/天", domain, max_per_day);
    let updated = state
        .settings
        .set_site_quota(&domain.to_lowercase(), max_per_day)
        .await
        .map_err(|e| e.to_string())?;

    state.event_bus.publish(AppEvent::ConfigUpdated {
        config_type: "quota".to_string(),
    });

    Ok(updated)
}

async fn apply_toggle(state: &AppState, update: AppConfig, kind: &str) -> Result<(), String> {
    state
        .settings
        .update(update)
        .await
        .map_err(|e| e.to_string())?;

    state.event_bus.publish(AppEvent::ConfigUpdated {
        config_type: kind.to_string(),
    });
    Ok(())
}
