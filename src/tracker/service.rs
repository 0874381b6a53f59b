// 访问追踪服务 - 串起分类、入库、配额评估与执法分发

use super::aggregator::PeriodAggregator;
use super::classifier::{classify, NavigationEvent};
use super::enforcement::EnforcementDispatcher;
use super::quota::{evaluate, QuotaPolicy, QuotaState};
use crate::event_bus::{AppEvent, EventBus};
use crate::settings::SettingsManager;
use crate::storage::{local_now, StorageHandle};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// 访问追踪服务
///
/// 数据流：导航事件 → 分类器 →（接受则）入库 → 当日计数 →
/// 配额评估 → 执法分发。写入失败只记日志并发事件，不向上抛——
/// 下一次导航自然就是重试
pub struct VisitTracker {
    storage: Arc<StorageHandle>,
    settings: Arc<SettingsManager>,
    dispatcher: Arc<EnforcementDispatcher>,
    event_bus: Arc<EventBus>,
}

impl VisitTracker {
    pub fn new(
        storage: Arc<StorageHandle>,
        settings: Arc<SettingsManager>,
        dispatcher: Arc<EnforcementDispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            storage,
            settings,
            dispatcher,
            event_bus,
        }
    }

    /// 处理一条原始导航事件
    ///
    /// `page` 是导航发生的页面实例，Some 时配额结果会分发到该实例
    pub async fn handle_navigation(&self, event: &NavigationEvent, page: Option<Uuid>) {
        let config = self.settings.get().await;

        // 分类器拒绝是静默的，不算错误
        let Some(domain) = classify(event, config.tracking_enabled) else {
            debug!("导航未计为访问: {}", event.url);
            return;
        };

        let repo = match self.storage.repository().await {
            Ok(repo) => repo,
            Err(e) => {
                warn!("存储不可用，本次访问丢弃，下次导航重试: {}", e);
                self.event_bus.publish(AppEvent::VisitWriteFailed {
                    domain,
                    error: e.to_string(),
                });
                return;
            }
        };

        let timestamp = local_now();
        let aggregate = match repo.record_visit(&domain, timestamp).await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                warn!("访问写入失败，下次导航重试: {}", e);
                self.event_bus.publish(AppEvent::VisitWriteFailed {
                    domain,
                    error: e.to_string(),
                });
                return;
            }
        };

        debug!("访问已记录: {} (累计 {})", domain, aggregate.visit_count);
        self.event_bus.publish(AppEvent::VisitRecorded {
            domain: domain.clone(),
            timestamp,
            aggregate,
        });

        // 计数在当日窗口内单调递增，每次新访问都要重新评估配额
        self.evaluate_and_dispatch(&domain, page).await;
    }

    /// 页面加载时的配额复查（不产生新的访问记录）
    pub async fn check_page(&self, domain: &str, page: Uuid) {
        self.evaluate_and_dispatch(domain, Some(page)).await;
    }

    async fn evaluate_and_dispatch(&self, domain: &str, page: Option<Uuid>) {
        let config = self.settings.get().await;
        let policy = QuotaPolicy {
            quota_enabled: config.quota_enabled,
            hard_block_enabled: config.hard_block_enabled,
        };
        let max_per_day = config.quota_for(domain);

        // 配额未配置时不必读库
        if !policy.quota_enabled || max_per_day.is_none() {
            return;
        }

        // 上游数据任何一步缺失都按 Ok 放行，绝不误触阻断
        let count = match self.storage.repository().await {
            Ok(repo) => {
                let aggregator = PeriodAggregator::new(repo);
                match aggregator.today_count(domain, local_now()).await {
                    Ok(count) => count,
                    Err(e) => {
                        warn!("配额计数查询失败，按未超限处理: {}", e);
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("存储不可用，配额检查跳过: {}", e);
                return;
            }
        };

        let state = evaluate(count, max_per_day, policy);
        if state != QuotaState::Ok {
            self.event_bus.publish(AppEvent::QuotaExceeded {
                domain: domain.to_string(),
                state,
            });
            if let Some(page) = page {
                self.dispatcher.apply(page, state).await;
            }
        }
    }
}
