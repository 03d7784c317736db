//! Catalog providers - Abstraction over manga catalog backends
//!
//! Call sites depend on [`CatalogProvider`] only. One backend is wired today:
//! - Comick (HTTP API), see [`comick::ComickProvider`]
//!
//! Providers are held by a [`registry::ProviderRegistry`] created once at
//! startup and passed explicitly to whatever needs catalog access.

pub mod comick;
pub mod registry;

use async_trait::async_trait;

use crate::domain::{CatalogItem, ChapterItem, PageItem, PagedResult};
use crate::error::Result;

pub use registry::ProviderRegistry;

/// Listing size used when the caller does not ask for one
pub const DEFAULT_LIMIT: usize = 20;

/// Trait for catalog backends
///
/// Implementations normalize their upstream payloads into the domain model
/// and degrade to partial results instead of failing on shape drift.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Stable identifier used for registration and cache keys
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn name(&self) -> &'static str;

    /// Currently trending items, in upstream rank order
    async fn trending(&self, limit: usize) -> Result<PagedResult<CatalogItem>>;

    /// Distinct items owning the most recently published chapters
    async fn latest(&self, limit: usize) -> Result<PagedResult<CatalogItem>>;

    async fn search(&self, query: &str, limit: usize) -> Result<PagedResult<CatalogItem>>;

    /// One item with its full detail
    async fn get_manga(&self, id: &str) -> Result<CatalogItem>;

    /// Chapters of an item, ascending by chapter number
    async fn get_chapters(
        &self,
        manga_id: &str,
        limit: Option<usize>,
    ) -> Result<PagedResult<ChapterItem>>;

    /// Pages of a chapter; entries without a usable image are left out
    async fn get_chapter_pages(&self, chapter_id: &str) -> Result<Vec<PageItem>>;
}
