//! 网站访问统计与每日配额引擎
//!
//! 核心数据流：
//! 浏览器导航事件 → 导航分类器 →（接受则）访问入库 →
//! 周期聚合（按需，由徽章/弹窗/配额检查触发）→ 配额评估 → 执法分发
//!
//! 弹窗渲染、徽章绘制和消息传输属于外部协作方，
//! 它们只消费这里暴露的读写操作

pub mod app;
pub mod commands;
pub mod event_bus;
pub mod logger;
pub mod models;
pub mod settings;
pub mod storage;
pub mod tracker;

use std::sync::Arc;

use event_bus::EventBus;
use settings::SettingsManager;
use storage::StorageHandle;
use tracker::{EnforcementDispatcher, VisitTracker};

/// 应用状态 - 各组件的共享句柄
pub struct AppState {
    /// 存储句柄（懒打开）
    pub storage: Arc<StorageHandle>,
    /// 设置管理器
    pub settings: Arc<SettingsManager>,
    /// 事件总线
    pub event_bus: Arc<EventBus>,
    /// 执法分发器
    pub enforcement: Arc<EnforcementDispatcher>,
    /// 访问追踪服务
    pub tracker: Arc<VisitTracker>,
}
