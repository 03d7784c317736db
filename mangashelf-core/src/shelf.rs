//! Cached catalog access
//!
//! [`Shelf`] is what front ends talk to: the active provider's six
//! operations, each routed through the query cache under its own key.

use std::sync::Arc;

use crate::cache::{keys, QueryCache, QueryError, QueryOutcome};
use crate::domain::{CatalogItem, ChapterItem, PageItem, PagedResult};
use crate::provider::{CatalogProvider, ProviderRegistry};

pub type QueryResult<T> = Result<QueryOutcome<T>, QueryError>;

#[derive(Clone)]
pub struct Shelf {
    registry: Arc<ProviderRegistry>,
    cache: QueryCache,
}

impl Shelf {
    pub fn new(registry: Arc<ProviderRegistry>, cache: QueryCache) -> Self {
        Self { registry, cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn provider(&self) -> Arc<dyn CatalogProvider> {
        self.registry.active()
    }

    pub async fn trending(&self, limit: usize) -> QueryResult<PagedResult<CatalogItem>> {
        let provider = self.provider();
        let key = keys::trending(provider.id(), limit);
        self.cache
            .query(&key, move || {
                let provider = Arc::clone(&provider);
                async move { provider.trending(limit).await }
            })
            .await
    }

    pub async fn latest(&self, limit: usize) -> QueryResult<PagedResult<CatalogItem>> {
        let provider = self.provider();
        let key = keys::latest(provider.id(), limit);
        self.cache
            .query(&key, move || {
                let provider = Arc::clone(&provider);
                async move { provider.latest(limit).await }
            })
            .await
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> QueryResult<PagedResult<CatalogItem>> {
        let provider = self.provider();
        let key = keys::search(provider.id(), query, limit);
        let query = query.trim().to_string();
        self.cache
            .query(&key, move || {
                let provider = Arc::clone(&provider);
                let query = query.clone();
                async move { provider.search(&query, limit).await }
            })
            .await
    }

    pub async fn get_manga(&self, id: &str) -> QueryResult<CatalogItem> {
        let provider = self.provider();
        let key = keys::manga(provider.id(), id);
        let id = id.to_string();
        self.cache
            .query(&key, move || {
                let provider = Arc::clone(&provider);
                let id = id.clone();
                async move { provider.get_manga(&id).await }
            })
            .await
    }

    pub async fn get_chapters(
        &self,
        manga_id: &str,
        limit: Option<usize>,
    ) -> QueryResult<PagedResult<ChapterItem>> {
        let provider = self.provider();
        let key = keys::chapters(provider.id(), manga_id, limit);
        let manga_id = manga_id.to_string();
        self.cache
            .query(&key, move || {
                let provider = Arc::clone(&provider);
                let manga_id = manga_id.clone();
                async move { provider.get_chapters(&manga_id, limit).await }
            })
            .await
    }

    pub async fn get_chapter_pages(&self, chapter_id: &str) -> QueryResult<Vec<PageItem>> {
        let provider = self.provider();
        let key = keys::chapter_pages(provider.id(), chapter_id);
        let chapter_id = chapter_id.to_string();
        self.cache
            .query(&key, move || {
                let provider = Arc::clone(&provider);
                let chapter_id = chapter_id.clone();
                async move { provider.get_chapter_pages(&chapter_id).await }
            })
            .await
    }
}
