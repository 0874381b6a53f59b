//! 引擎边界命令模块
//!
//! 提供 UI 与设置协作方调用的所有异步接口，按功能分组：
//! - query: 数据查询命令
//! - storage: 访问写入与清空命令
//! - config: 配置开关命令
//! - control: 页面实例与导航控制命令

pub mod config;
pub mod control;
pub mod query;
pub mod storage;

// 重新导出所有命令
pub use config::*;
pub use control::*;
pub use query::*;
pub use storage::*;
