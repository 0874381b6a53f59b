// 追踪引擎模块 - 分类、聚合、配额与执法

pub mod aggregator;
pub mod classifier;
pub mod enforcement;
pub mod period;
pub mod quota;
pub mod service;

pub use aggregator::PeriodAggregator;
pub use classifier::{classify, NavigationEvent, TransitionType};
pub use enforcement::{EnforcementDispatcher, PageEffect};
pub use period::Period;
pub use quota::{evaluate, QuotaPolicy, QuotaState};
pub use service::VisitTracker;
