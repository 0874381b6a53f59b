// 应用配置模型 - 设置文件的持久化结构与部分更新载荷

use crate::storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 持久化的应用配置（JSON 文件整体读写）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedAppConfig {
    /// 访问追踪总开关
    #[serde(default = "default_true")]
    pub tracking_enabled: bool,
    /// 弹窗展示开关（引擎只透传，由 UI 消费）
    #[serde(default = "default_true")]
    pub popup_enabled: bool,
    /// 配额功能开关
    #[serde(default)]
    pub quota_enabled: bool,
    /// 超限时硬阻断（false 则只弹软提醒）
    #[serde(default)]
    pub hard_block_enabled: bool,
    /// 每域名的当日访问上限；缺失或 0 表示不限
    #[serde(default)]
    pub site_quotas: HashMap<String, u32>,
    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_true() -> bool {
    true
}

impl Default for PersistedAppConfig {
    fn default() -> Self {
        Self {
            tracking_enabled: true,
            popup_enabled: true,
            quota_enabled: false,
            hard_block_enabled: false,
            site_quotas: HashMap::new(),
            storage: StorageConfig::default(),
        }
    }
}

impl PersistedAppConfig {
    /// 取某域名配置的当日上限，未配置或为 0 按"无配额"处理
    pub fn quota_for(&self, domain: &str) -> Option<u32> {
        self.site_quotas.get(domain).copied().filter(|max| *max > 0)
    }
}

/// 配置的部分更新载荷 - 只有 Some 的字段会被写入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub tracking_enabled: Option<bool>,
    pub popup_enabled: Option<bool>,
    pub quota_enabled: Option<bool>,
    pub hard_block_enabled: Option<bool>,
    pub site_quotas: Option<HashMap<String, u32>>,
}
