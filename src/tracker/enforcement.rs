// 执法分发器 - 把配额状态落实为页面实例上的可见效果

use super::quota::QuotaState;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// 发往页面实例的单向效果消息
///
/// 引擎侧只负责分发，具体渲染（横幅、遮罩）由页面侧协作方完成
#[derive(Debug, Clone, PartialEq)]
pub enum PageEffect {
    /// 普通提示文本
    ShowMessage { text: String },
    /// 软超限提醒：可关闭、自动过期
    QuotaNotice { message: String },
    /// 硬阻断遮罩：全视口、无关闭入口
    HardBlockOverlay { domain: String, count: i64, max: u32 },
    /// 页面实例销毁时释放滚动锁
    ReleaseScrollLock,
}

/// 单个页面实例的执法状态（不跨重载持久化）
struct PageState {
    domain: String,
    /// 软提醒是否已经展示过 - 每个页面实例至多一次
    notice_shown: bool,
    /// 当前生效的遮罩载荷；Some 表示该实例处于硬阻断中
    overlay: Option<(i64, u32)>,
}

/// 执法分发器
///
/// 每个页面实例（以 Uuid 标识）至多一个可见效果：软超限提醒在
/// 同一实例内不重复；硬阻断遮罩被页面 DOM 移除时重新下发（反应式
/// 纠正回路）；实例销毁时释放滚动锁并丢弃状态。同一状态重复分发
/// 不会产生重复的 UI 元素
pub struct EnforcementDispatcher {
    pages: RwLock<HashMap<Uuid, PageState>>,
    effects: broadcast::Sender<(Uuid, PageEffect)>,
}

impl EnforcementDispatcher {
    /// 创建分发器
    ///
    /// # 参数
    /// - `capacity`: 效果通道缓冲区大小，建议 100-1000
    pub fn new(capacity: usize) -> Self {
        let (effects, _) = broadcast::channel(capacity);
        Self {
            pages: RwLock::new(HashMap::new()),
            effects,
        }
    }

    /// 订阅效果消息流
    pub fn subscribe(&self) -> broadcast::Receiver<(Uuid, PageEffect)> {
        self.effects.subscribe()
    }

    /// 注册一个新页面实例，返回其标识
    pub async fn register_page(&self, domain: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.pages.write().await.insert(
            id,
            PageState {
                domain: domain.to_string(),
                notice_shown: false,
                overlay: None,
            },
        );
        id
    }

    /// 分发配额状态到指定页面实例
    ///
    /// 幂等：同一实例、同一状态重复调用不会再次发出效果
    pub async fn apply(&self, page: Uuid, state: QuotaState) {
        let mut pages = self.pages.write().await;
        let Some(page_state) = pages.get_mut(&page) else {
            // 未注册或已销毁的实例，按缺失数据放行
            tracing::trace!("忽略发往未知页面实例的执法请求: {}", page);
            return;
        };

        match state {
            QuotaState::Ok => {}
            QuotaState::SoftExceeded { count, max } => {
                if !page_state.notice_shown {
                    page_state.notice_shown = true;
                    let message = format!(
                        "今日访问 {} 已达 {} 次（上限 {} 次）",
                        page_state.domain, count, max
                    );
                    self.emit(page, PageEffect::QuotaNotice { message });
                }
            }
            QuotaState::HardExceeded { count, max } => {
                if page_state.overlay.is_none() {
                    page_state.overlay = Some((count, max));
                    let domain = page_state.domain.clone();
                    self.emit(page, PageEffect::HardBlockOverlay { domain, count, max });
                }
            }
        }
    }

    /// 页面侧报告遮罩被移除 - 实例仍处于硬阻断时重新下发
    pub async fn overlay_detached(&self, page: Uuid) {
        let pages = self.pages.read().await;
        if let Some(page_state) = pages.get(&page) {
            if let Some((count, max)) = page_state.overlay {
                tracing::debug!("页面 {} 的遮罩被移除，重新下发", page);
                self.emit(
                    page,
                    PageEffect::HardBlockOverlay {
                        domain: page_state.domain.clone(),
                        count,
                        max,
                    },
                );
            }
        }
    }

    /// 发送普通提示消息
    pub async fn show_message(&self, page: Uuid, text: &str) {
        if self.pages.read().await.contains_key(&page) {
            self.emit(
                page,
                PageEffect::ShowMessage {
                    text: text.to_string(),
                },
            );
        }
    }

    /// 页面实例销毁：释放滚动锁并丢弃状态
    pub async fn teardown(&self, page: Uuid) {
        let removed = self.pages.write().await.remove(&page);
        if let Some(page_state) = removed {
            if page_state.overlay.is_some() {
                self.emit(page, PageEffect::ReleaseScrollLock);
            }
        }
    }

    /// 当前存活的页面实例数（监控用）
    pub async fn page_count(&self) -> usize {
        self.pages.read().await.len()
    }

    fn emit(&self, page: Uuid, effect: PageEffect) {
        // 没有订阅者时消息被丢弃，这是正常的
        let _ = self.effects.send((page, effect));
    }
}
