// 导航分类器 - 判定一次浏览器导航是否算作真实的用户访问

use serde::{Deserialize, Serialize};
use url::Url;

/// 浏览器导航的过渡类型（webNavigation 语义）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    /// 用户手动输入地址
    Typed,
    /// 点击书签
    AutoBookmark,
    /// 地址栏联想建议
    Generated,
    /// 表单提交
    FormSubmit,
    /// 页面刷新
    Reload,
    /// 点击链接
    Link,
    /// 其他（自动重定向、子框架加载、预取等），一律不计
    #[serde(other)]
    Other,
}

/// 原始导航事件 - 由浏览器侧采集后送入引擎
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub url: String,
    /// 0 表示顶层框架，其余为内嵌 iframe
    pub frame_id: i64,
    pub transition_type: TransitionType,
    #[serde(default)]
    pub transition_qualifiers: Vec<String>,
    pub is_top_level: bool,
}

/// 判定一次导航是否计为访问，接受则返回规范化主机名
///
/// 规则按顺序执行：
/// 1. 非顶层框架不计（iframe 加载不是用户访问）
/// 2. 追踪总开关关闭时不计
/// 3. 非 http/https 或主机名无法解析不计
/// 4. 过渡类型必须在白名单内，或限定符包含 from_address_bar
///
/// 白名单把自动重定向、预取和脚本驱动的跳转挡在外面，
/// 否则配额和统计信号都会被灌水。拒绝是静默的，不是错误
pub fn classify(event: &NavigationEvent, tracking_enabled: bool) -> Option<String> {
    if event.frame_id != 0 || !event.is_top_level {
        return None;
    }

    if !tracking_enabled {
        return None;
    }

    let url = Url::parse(&event.url).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    let host = url.host_str()?.to_lowercase();

    let user_initiated = matches!(
        event.transition_type,
        TransitionType::Typed
            | TransitionType::AutoBookmark
            | TransitionType::Generated
            | TransitionType::FormSubmit
            | TransitionType::Reload
            | TransitionType::Link
    ) || event
        .transition_qualifiers
        .iter()
        .any(|q| q == "from_address_bar");

    if user_initiated {
        Some(host)
    } else {
        None
    }
}
