//! Provider registry
//!
//! Holds the configured catalog providers and which one is active. Built once
//! at startup, then shared as `Arc<ProviderRegistry>`.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::comick::ComickProvider;
use super::CatalogProvider;
use crate::config::ShelfConfig;

pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn CatalogProvider>>,
    active: &'static str,
}

impl ProviderRegistry {
    /// Registry with a single provider, which becomes active
    pub fn new(provider: Arc<dyn CatalogProvider>) -> Self {
        let active = provider.id();
        let mut providers = BTreeMap::new();
        providers.insert(active, provider);
        Self { providers, active }
    }

    /// Default registry: the Comick backend built from configuration
    pub fn from_config(config: &ShelfConfig) -> Result<Self> {
        let comick = ComickProvider::from_config(config)?;
        Ok(Self::new(Arc::new(comick)))
    }

    /// Add another provider; ids must be unique
    pub fn register(&mut self, provider: Arc<dyn CatalogProvider>) -> Result<()> {
        let id = provider.id();
        if self.providers.contains_key(id) {
            bail!("Provider '{}' is already registered", id);
        }
        debug!("Registered catalog provider '{}'", id);
        self.providers.insert(id, provider);
        Ok(())
    }

    /// Switch the active provider
    pub fn activate(&mut self, id: &str) -> Result<()> {
        match self.providers.get_key_value(id) {
            Some((&key, _)) => {
                self.active = key;
                Ok(())
            }
            None => bail!(
                "Unknown provider '{}' (registered: {})",
                id,
                self.ids().join(", ")
            ),
        }
    }

    pub fn active(&self) -> Arc<dyn CatalogProvider> {
        // `active` always names a registered provider
        Arc::clone(&self.providers[self.active])
    }

    pub fn active_id(&self) -> &'static str {
        self.active
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn CatalogProvider>> {
        self.providers.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CatalogItem, ChapterItem, PageItem, PagedResult};
    use async_trait::async_trait;

    struct StubProvider(&'static str);

    #[async_trait]
    impl CatalogProvider for StubProvider {
        fn id(&self) -> &'static str {
            self.0
        }

        fn name(&self) -> &'static str {
            "Stub"
        }

        async fn trending(&self, _limit: usize) -> crate::Result<PagedResult<CatalogItem>> {
            Ok(PagedResult::complete(vec![CatalogItem::new(self.0, "x")]))
        }

        async fn latest(&self, _limit: usize) -> crate::Result<PagedResult<CatalogItem>> {
            Ok(PagedResult::complete(vec![]))
        }

        async fn search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> crate::Result<PagedResult<CatalogItem>> {
            Ok(PagedResult::complete(vec![]))
        }

        async fn get_manga(&self, id: &str) -> crate::Result<CatalogItem> {
            Ok(CatalogItem::new(id, "x"))
        }

        async fn get_chapters(
            &self,
            _manga_id: &str,
            _limit: Option<usize>,
        ) -> crate::Result<PagedResult<ChapterItem>> {
            Ok(PagedResult::complete(vec![]))
        }

        async fn get_chapter_pages(&self, _chapter_id: &str) -> crate::Result<Vec<PageItem>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_first_provider_is_active() {
        let registry = ProviderRegistry::new(Arc::new(StubProvider("one")));
        assert_eq!(registry.active_id(), "one");
        assert_eq!(registry.ids(), vec!["one"]);
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = ProviderRegistry::new(Arc::new(StubProvider("one")));
        registry.register(Arc::new(StubProvider("two"))).unwrap();
        assert!(registry.register(Arc::new(StubProvider("two"))).is_err());
        assert_eq!(registry.ids(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_activate_switches_provider() {
        let mut registry = ProviderRegistry::new(Arc::new(StubProvider("one")));
        registry.register(Arc::new(StubProvider("two"))).unwrap();
        registry.activate("two").unwrap();

        let trending = registry.active().trending(1).await.unwrap();
        assert_eq!(trending.items[0].id, "two");
        assert!(registry.activate("missing").is_err());
        assert_eq!(registry.active_id(), "two");
    }

    #[test]
    fn test_default_registry_uses_comick() {
        let registry = ProviderRegistry::from_config(&ShelfConfig::default()).unwrap();
        assert_eq!(registry.active_id(), "comick");
        assert!(registry.get("comick").is_some());
    }
}
