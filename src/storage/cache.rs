// 缓存层 - 加速弹窗/徽章的高频聚合读取

use super::error::StoreError;
use super::models::*;
use super::repository::VisitRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 简单的 LRU 缓存实现
struct LruCache<K: Eq + std::hash::Hash + Clone, V: Clone> {
    entries: HashMap<K, (V, u64)>,
    max_size: usize,
    tick: u64,
}

impl<K: Eq + std::hash::Hash + Clone, V: Clone> LruCache<K, V> {
    fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            tick: 0,
        }
    }

    fn get(&mut self, key: &K) -> Option<V> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|(value, touched)| {
            *touched = tick;
            value.clone()
        })
    }

    fn put(&mut self, key: K, value: V) {
        self.tick += 1;

        // 缓存已满时淘汰最久未访问的项
        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, touched))| *touched)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(key, (value, self.tick));
    }

    fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.tick = 0;
    }
}

/// 带缓存的访问仓库包装器
///
/// 只缓存聚合读取（单域名查询与全量列表）；窗口查询和配额计数
/// 必须看到最新写入，直接透传。任何写入都会使相关缓存失效，
/// 避免弹窗读到陈旧计数
pub struct CachedRepository {
    inner: Arc<dyn VisitRepository>,
    aggregate_cache: RwLock<LruCache<String, DomainAggregate>>,
    listing_cache: RwLock<LruCache<SortKey, Vec<DomainAggregate>>>,
}

impl CachedRepository {
    pub fn new(inner: Arc<dyn VisitRepository>) -> Self {
        Self {
            inner,
            aggregate_cache: RwLock::new(LruCache::new(256)),
            listing_cache: RwLock::new(LruCache::new(2)),
        }
    }

    async fn invalidate_domain(&self, domain: &str) {
        self.aggregate_cache
            .write()
            .await
            .invalidate(&domain.to_string());
        self.listing_cache.write().await.clear();
    }

    async fn clear_cache(&self) {
        self.aggregate_cache.write().await.clear();
        self.listing_cache.write().await.clear();
    }
}

#[async_trait]
impl VisitRepository for CachedRepository {
    async fn record_visit(
        &self,
        domain: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<DomainAggregate, StoreError> {
        let aggregate = self.inner.record_visit(domain, timestamp).await?;

        // 返回值不回填缓存：并发写入时回填顺序与事务提交顺序无关，
        // 旧的聚合行可能盖在新的之上。写入只做失效，下次读取重新加载
        self.invalidate_domain(domain).await;

        Ok(aggregate)
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.inner.clear_all().await?;
        self.clear_cache().await;
        Ok(())
    }

    async fn get_aggregate(&self, domain: &str) -> Result<Option<DomainAggregate>, StoreError> {
        // 先查缓存
        {
            let mut cache = self.aggregate_cache.write().await;
            if let Some(aggregate) = cache.get(&domain.to_string()) {
                return Ok(Some(aggregate));
            }
        }

        // 未命中，读数据库；只缓存存在的行，None 不缓存
        let aggregate = self.inner.get_aggregate(domain).await?;
        if let Some(aggregate) = &aggregate {
            let mut cache = self.aggregate_cache.write().await;
            cache.put(domain.to_string(), aggregate.clone());
        }

        Ok(aggregate)
    }

    async fn list_aggregates(&self, order: SortKey) -> Result<Vec<DomainAggregate>, StoreError> {
        {
            let mut cache = self.listing_cache.write().await;
            if let Some(listing) = cache.get(&order) {
                return Ok(listing);
            }
        }

        let listing = self.inner.list_aggregates(order).await?;

        {
            let mut cache = self.listing_cache.write().await;
            cache.put(order, listing.clone());
        }

        Ok(listing)
    }

    async fn list_visits(
        &self,
        domain: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<VisitEvent>, StoreError> {
        // 日志查询不缓存
        self.inner.list_visits(domain, since).await
    }

    async fn aggregate_period(
        &self,
        since: DateTime<Utc>,
        domain: Option<&str>,
    ) -> Result<Vec<DomainPeriodStats>, StoreError> {
        // 窗口查询的边界随查询时刻变化，不缓存
        self.inner.aggregate_period(since, domain).await
    }

    async fn count_visits_since(
        &self,
        domain: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        // 配额路径必须读到最新计数
        self.inner.count_visits_since(domain, since).await
    }

    async fn initialize_tables(&self) -> Result<(), StoreError> {
        self.inner.initialize_tables().await
    }

    async fn get_stats(&self) -> Result<(i64, i64, i64), StoreError> {
        self.inner.get_stats().await
    }

    fn schema_mode(&self) -> SchemaMode {
        self.inner.schema_mode()
    }
}
