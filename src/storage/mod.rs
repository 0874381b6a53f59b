// 存储模块 - 访问记录的持久化抽象层

// 子模块
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repository;

// 重新导出主要类型
pub use cache::CachedRepository;
pub use config::{DatabaseConfig, StorageConfig};
pub use database::StorageHandle;
pub use error::StoreError;
pub use models::*;
pub use repository::VisitRepository;

// 重新导出具体实现（可选，用于高级用法）
pub use repository::degraded::DegradedRepository;
pub use repository::full::FullRepository;
