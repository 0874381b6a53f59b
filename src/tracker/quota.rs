// 配额评估器 - 把当日计数与配置比对，产出执法信号

use serde::{Deserialize, Serialize};

/// 配额相关的开关快照
///
/// 由调用方在每次评估时传入（配置更新经由 SettingsManager 单一
/// 入口落盘，下一次评估自然看到新值），评估器自身不持有全局状态
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaPolicy {
    pub quota_enabled: bool,
    pub hard_block_enabled: bool,
}

/// 配额评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QuotaState {
    /// 未超限（含配额未配置/未启用的情况）
    Ok,
    /// 超限，软警告：可关闭的提醒
    SoftExceeded { count: i64, max: u32 },
    /// 超限，硬阻断：全页遮罩
    HardExceeded { count: i64, max: u32 },
}

/// 评估某域名的配额状态
///
/// `max_per_day` 为 None 或 0 表示未设置配额。判定用严格大于：
/// 恰好用满 maxPerDay 次仍是 Ok，第 maxPerDay+1 次才触发。
/// 计数在窗口内单调递增，所以每次新访问和每次页面加载都要重新评估。
/// 上游数据缺失按 Ok 处理（宁可放行，不误伤）
pub fn evaluate(today_count: i64, max_per_day: Option<u32>, policy: QuotaPolicy) -> QuotaState {
    if !policy.quota_enabled {
        return QuotaState::Ok;
    }

    let max = match max_per_day {
        Some(max) if max > 0 => max,
        _ => return QuotaState::Ok,
    };

    if today_count <= max as i64 {
        return QuotaState::Ok;
    }

    if policy.hard_block_enabled {
        QuotaState::HardExceeded {
            count: today_count,
            max,
        }
    } else {
        QuotaState::SoftExceeded {
            count: today_count,
            max,
        }
    }
}
