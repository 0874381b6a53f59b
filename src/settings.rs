use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::RwLock;

use crate::models::{AppConfig, PersistedAppConfig};

/// 设置管理器 - 所有配置更新的单一入口
///
/// 分类器和配额评估器在每次调用时拿配置快照，不读全局变量，
/// 因此开关切换在它们的下一次调用自然生效
pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<PersistedAppConfig>,
}

impl SettingsManager {
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                serde_json::from_slice::<PersistedAppConfig>(&bytes).unwrap_or_default()
            }
            _ => {
                let default = PersistedAppConfig::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json).await?;
                default
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(initial),
        })
    }

    /// 获取当前配置快照
    pub async fn get(&self) -> PersistedAppConfig {
        self.data.read().await.clone()
    }

    /// 部分更新配置并落盘
    pub async fn update(&self, update: AppConfig) -> Result<PersistedAppConfig> {
        let mut config = self.data.write().await;

        if let Some(value) = update.tracking_enabled {
            config.tracking_enabled = value;
        }
        if let Some(value) = update.popup_enabled {
            config.popup_enabled = value;
        }
        if let Some(value) = update.quota_enabled {
            config.quota_enabled = value;
        }
        if let Some(value) = update.hard_block_enabled {
            config.hard_block_enabled = value;
        }
        if let Some(quotas) = update.site_quotas {
            config.site_quotas = quotas;
        }

        self.save(&config).await?;
        Ok(config.clone())
    }

    /// 设置单个域名的当日上限；max_per_day 为 0 表示移除配额
    pub async fn set_site_quota(
        &self,
        domain: &str,
        max_per_day: u32,
    ) -> Result<PersistedAppConfig> {
        let mut config = self.data.write().await;

        if max_per_day == 0 {
            config.site_quotas.remove(domain);
        } else {
            config
                .site_quotas
                .insert(domain.to_string(), max_per_day);
        }

        self.save(&config).await?;
        Ok(config.clone())
    }

    async fn save(&self, config: &PersistedAppConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        {
            let settings = SettingsManager::new(path.clone()).await.unwrap();
            settings
                .update(AppConfig {
                    quota_enabled: Some(true),
                    ..Default::default()
                })
                .await
                .unwrap();
            settings.set_site_quota("example.com", 5).await.unwrap();
        }

        // 重新加载后配置仍在
        let settings = SettingsManager::new(path).await.unwrap();
        let config = settings.get().await;
        assert!(config.quota_enabled);
        assert_eq!(config.quota_for("example.com"), Some(5));
    }

    #[tokio::test]
    async fn test_zero_quota_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsManager::new(dir.path().join("config.json"))
            .await
            .unwrap();

        settings.set_site_quota("example.com", 5).await.unwrap();
        settings.set_site_quota("example.com", 0).await.unwrap();

        let config = settings.get().await;
        assert!(config.site_quotas.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let settings = SettingsManager::new(path).await.unwrap();
        assert!(settings.get().await.tracking_enabled);
    }
}
