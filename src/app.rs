//! 应用程序初始化和启动
//!
//! 负责引擎的完整启动流程，包括：
//! - 日志系统初始化
//! - 设置加载
//! - 存储句柄构建（实际打开推迟到首次使用）
//! - 执法分发器与追踪服务装配
//! - 后台事件日志任务

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::event_bus::{AppEvent, EventBus};
use crate::logger::{self, LogBroadcaster};
use crate::settings::SettingsManager;
use crate::storage::{DatabaseConfig, StorageConfig, StorageHandle};
use crate::tracker::{EnforcementDispatcher, VisitTracker};
use crate::AppState;

/// 初始化日志系统并返回推送器
///
/// 只能调用一次；重复初始化返回的错误由调用方决定是否忽略
pub fn init_logging() -> Arc<LogBroadcaster> {
    let broadcaster = Arc::new(LogBroadcaster::new(256));
    if let Err(e) = logger::init_with_broadcaster(broadcaster.clone()) {
        eprintln!("日志系统初始化失败: {}", e);
    }
    broadcaster
}

/// 装配引擎并返回共享状态
///
/// `data_dir` 下存放设置文件；数据库路径取自设置中的存储配置。
/// 存储在这里只构建句柄，真正的打开和模式检测发生在首次访问
pub async fn bootstrap(data_dir: &Path) -> anyhow::Result<Arc<AppState>> {
    info!("初始化访问统计引擎...");

    let settings = Arc::new(SettingsManager::new(data_dir.join("config.json")).await?);
    let config = settings.get().await;

    // 相对的数据库路径以数据目录为基准解析
    let storage_config = resolve_storage_paths(config.storage.clone(), data_dir);
    let storage = Arc::new(StorageHandle::new(&storage_config));
    let event_bus = Arc::new(EventBus::new(512));
    let enforcement = Arc::new(EnforcementDispatcher::new(256));

    let tracker = Arc::new(VisitTracker::new(
        storage.clone(),
        settings.clone(),
        enforcement.clone(),
        event_bus.clone(),
    ));

    let state = Arc::new(AppState {
        storage,
        settings,
        event_bus,
        enforcement,
        tracker,
    });

    spawn_event_logger(&state);

    info!("引擎装配完成");
    Ok(state)
}

/// 把配置里的相对数据库路径解析到数据目录下
fn resolve_storage_paths(mut config: StorageConfig, data_dir: &Path) -> StorageConfig {
    let DatabaseConfig::SQLite { db_path } = &mut config.database;
    if !Path::new(db_path.as_str()).is_absolute() {
        *db_path = data_dir.join(&*db_path).to_string_lossy().into_owned();
    }
    config
}

/// 后台任务：把总线上的关键事件落到日志里
fn spawn_event_logger(state: &Arc<AppState>) {
    let mut receiver = state.event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(AppEvent::VisitRecorded { domain, aggregate, .. }) => {
                    info!("访问: {} (累计 {})", domain, aggregate.visit_count);
                }
                Ok(AppEvent::QuotaExceeded { domain, state }) => {
                    warn!("配额超限: {} -> {:?}", domain, state);
                }
                Ok(AppEvent::StorageCleared) => {
                    info!("访问记录已清空");
                }
                Ok(AppEvent::VisitWriteFailed { domain, error }) => {
                    warn!("访问写入失败: {} ({})", domain, error);
                }
                Ok(AppEvent::ConfigUpdated { config_type }) => {
                    info!("配置已更新: {}", config_type);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("事件日志任务落后，丢失 {} 条事件", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
