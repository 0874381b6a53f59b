//! 页面实例与导航控制命令
//!
//! 页面侧协作方通过这些接口上报生命周期与导航事件，
//! 并经由执法分发器的效果通道接收单向效果消息

use crate::tracker::NavigationEvent;
use crate::AppState;
use uuid::Uuid;

/// 注册一个新页面实例（页面加载时调用），并立即做一次配额复查
pub async fn page_opened(state: &AppState, domain: String) -> Result<Uuid, String> {
    let domain = domain.to_lowercase();
    let page = state.enforcement.register_page(&domain).await;
    state.tracker.check_page(&domain, page).await;
    Ok(page)
}

/// 页面实例销毁（卸载时调用）：释放滚动锁并丢弃执法状态
pub async fn page_closed(state: &AppState, page: Uuid) -> Result<(), String> {
    state.enforcement.teardown(page).await;
    Ok(())
}

/// 页面侧报告硬阻断遮罩被 DOM 操作移除 - 引擎会重新下发
pub async fn overlay_detached(state: &AppState, page: Uuid) -> Result<(), String> {
    state.enforcement.overlay_detached(page).await;
    Ok(())
}

/// 向页面实例发送普通提示消息
pub async fn show_message(state: &AppState, page: Uuid, text: String) -> Result<(), String> {
    state.enforcement.show_message(page, &text).await;
    Ok(())
}

/// 处理一条原始导航事件
///
/// 被分类器拒绝的导航静默忽略；写入失败只记日志，
/// 下次导航自然重试，永不向页面侧报错
pub async fn handle_navigation(
    state: &AppState,
    event: NavigationEvent,
    page: Option<Uuid>,
) -> Result<(), String> {
    state.tracker.handle_navigation(&event, page).await;
    Ok(())
}
