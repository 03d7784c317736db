//! Comick catalog backend
//!
//! Every operation follows the same path: one GET through the [`Transport`],
//! the strict schema first, manual extraction when the strict schema does not
//! match, then a single mapping step from [`records`] into the domain model.

pub mod client;
pub mod extract;
pub mod records;
pub mod schema;
pub mod urls;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use self::client::{HttpClient, Transport};
use self::records::{ChapterRecord, ComicRecord, ImageEntry, TrendingListing};
use self::schema::{
    ChapterImage, ChaptersResponse, ComicResponse, FeedChapter, SearchComic, Shape, TopListing,
    Validated,
};
use self::urls::{is_internal_key, ImageHost};
use super::CatalogProvider;
use crate::config::ShelfConfig;
use crate::domain::{sort_chapters, CatalogItem, ChapterItem, PageItem, PagedResult};
use crate::error::{CatalogError, Result};

pub const PROVIDER_ID: &str = "comick";

pub struct ComickProvider {
    transport: Arc<dyn Transport>,
    base_url: Url,
    images: ImageHost,
}

impl ComickProvider {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: &str,
        image_base_url: &str,
    ) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| {
            CatalogError::InvalidRequest(format!("Invalid API base URL '{}': {}", base_url, e))
        })?;
        if parsed.cannot_be_a_base() {
            return Err(CatalogError::InvalidRequest(format!(
                "API base URL '{}' cannot carry a path",
                base_url
            )));
        }

        Ok(Self {
            transport,
            base_url: parsed,
            images: ImageHost::new(image_base_url),
        })
    }

    /// Provider talking to the configured API over HTTP
    pub fn from_config(config: &ShelfConfig) -> Result<Self> {
        let client = HttpClient::from_config(config)?;
        Self::new(
            Arc::new(client),
            &config.api_base_url,
            &config.image_base_url,
        )
    }

    pub fn images(&self) -> &ImageHost {
        &self.images
    }

    /// Build an endpoint URL. Segments and query values are percent-encoded.
    fn endpoint(
        &self,
        segments: &[&str],
        trailing_slash: bool,
        query: &[(&str, String)],
    ) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                CatalogError::InvalidRequest(format!(
                    "API base URL '{}' cannot carry a path",
                    self.base_url
                ))
            })?;
            path.pop_if_empty().extend(segments);
            if trailing_slash {
                path.push("");
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET and decode; a missing body is handed to the schemas as `null`
    async fn fetch(&self, url: Url) -> Result<Value> {
        Ok(self.transport.get_json(url).await?.unwrap_or(Value::Null))
    }

    /// Translate a public slug into the internal key used by chapter listings
    async fn lookup_internal_key(&self, slug: &str) -> Result<String> {
        let raw = self
            .fetch(self.endpoint(&["v1.0", "comic", slug], true, &[])?)
            .await?;
        extract::internal_key(&raw).ok_or_else(|| CatalogError::Schema {
            shape: Shape::ComicDetail.name(),
            reason: "no hid in comic detail".to_string(),
        })
    }

    /// Internal key for `manga_id`, falling back to the id itself when the
    /// lookup fails
    async fn resolve_internal_key(&self, manga_id: &str) -> String {
        if is_internal_key(manga_id) {
            return manga_id.to_string();
        }

        match self.lookup_internal_key(manga_id).await {
            Ok(key) => {
                debug!("Resolved '{}' to internal key '{}'", manga_id, key);
                key
            }
            Err(e) => {
                warn!(
                    "Could not resolve internal key for '{}', using it as-is: {}",
                    manga_id, e
                );
                manga_id.to_string()
            }
        }
    }

    fn items(&self, records: Vec<ComicRecord>) -> impl Iterator<Item = CatalogItem> + '_ {
        records
            .into_iter()
            .filter_map(move |record| record.into_item(&self.images))
    }
}

fn require_id<'a>(id: &'a str, what: &str) -> Result<&'a str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CatalogError::InvalidRequest(format!("{} id is empty", what)));
    }
    Ok(id)
}

#[async_trait]
impl CatalogProvider for ComickProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn name(&self) -> &'static str {
        "Comick"
    }

    async fn trending(&self, limit: usize) -> Result<PagedResult<CatalogItem>> {
        let url = self.endpoint(&["top"], false, &[("type", "trending".to_string())])?;
        let raw = self.fetch(url).await?;

        let listing = Validated::<TopListing>::strict(Shape::TopListing, &raw)
            .map(TrendingListing::from)
            .or_extract(|| extract::trending_listing(&raw))
            .into_result()?;

        debug!(
            "Trending periods {:?}, selected {:?}",
            listing.periods.keys().collect::<Vec<_>>(),
            listing.selected_period()
        );

        let items = self.items(listing.select(limit)).collect();
        Ok(PagedResult::complete(items))
    }

    async fn latest(&self, limit: usize) -> Result<PagedResult<CatalogItem>> {
        let url = self.endpoint(
            &["chapter"],
            true,
            &[("order", "new".to_string()), ("page", "1".to_string())],
        )?;
        let raw = self.fetch(url).await?;

        let records: Vec<ComicRecord> = Validated::<Vec<FeedChapter>>::strict(Shape::LatestFeed, &raw)
            .map(|chapters| {
                chapters
                    .into_iter()
                    .map(|chapter| ComicRecord::from(chapter.md_comics))
                    .collect::<Vec<_>>()
            })
            .or_extract(|| Some(extract::latest_feed(&raw)))
            .into_result()?;

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for item in self.items(records) {
            if items.len() >= limit {
                break;
            }
            if seen.insert(item.id.clone()) {
                items.push(item);
            }
        }

        Ok(PagedResult::complete(items))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<PagedResult<CatalogItem>> {
        let url = self.endpoint(
            &["v1.0", "search"],
            true,
            &[("q", query.to_string()), ("limit", limit.to_string())],
        )?;
        let raw = self.fetch(url).await?;

        let records: Vec<ComicRecord> = Validated::<Vec<SearchComic>>::strict(Shape::SearchResults, &raw)
            .map(|comics| comics.into_iter().map(ComicRecord::from).collect::<Vec<_>>())
            .or_extract(|| Some(extract::search_results(&raw)))
            .into_result()?;

        let items = self.items(records).take(limit).collect();
        Ok(PagedResult::complete(items))
    }

    async fn get_manga(&self, id: &str) -> Result<CatalogItem> {
        let id = require_id(id, "Manga")?;
        let raw = self
            .fetch(self.endpoint(&["v1.0", "comic", id], true, &[])?)
            .await?;

        let record = Validated::<ComicResponse>::strict(Shape::ComicDetail, &raw)
            .map(ComicRecord::from)
            .or_extract(|| extract::comic_detail(&raw))
            .into_result()?;

        record
            .into_item(&self.images)
            .ok_or_else(|| CatalogError::Schema {
                shape: Shape::ComicDetail.name(),
                reason: "no usable identifier or title".to_string(),
            })
    }

    async fn get_chapters(
        &self,
        manga_id: &str,
        limit: Option<usize>,
    ) -> Result<PagedResult<ChapterItem>> {
        let manga_id = require_id(manga_id, "Manga")?;
        let key = self.resolve_internal_key(manga_id).await;

        let query: Vec<(&str, String)> = limit
            .map(|limit| vec![("limit", limit.to_string())])
            .unwrap_or_default();
        let raw = self
            .fetch(self.endpoint(&["comic", key.as_str(), "chapters"], false, &query)?)
            .await?;

        let records: Vec<ChapterRecord> = Validated::<ChaptersResponse>::strict(Shape::ChapterList, &raw)
            .map(|response| {
                response
                    .chapters
                    .into_iter()
                    .map(ChapterRecord::from)
                    .collect::<Vec<_>>()
            })
            .or_extract(|| Some(extract::chapter_list(&raw)))
            .into_result()?;

        let mut chapters: Vec<ChapterItem> = records
            .into_iter()
            .filter_map(|record| record.into_item(&key, manga_id))
            .collect();
        sort_chapters(&mut chapters);

        Ok(PagedResult::complete(chapters))
    }

    async fn get_chapter_pages(&self, chapter_id: &str) -> Result<Vec<PageItem>> {
        let chapter_id = require_id(chapter_id, "Chapter")?;
        let raw = self
            .fetch(self.endpoint(&["chapter", chapter_id, "get_images"], false, &[])?)
            .await?;

        let entries: Vec<ImageEntry> = Validated::<Vec<ChapterImage>>::strict(Shape::ChapterImages, &raw)
            .map(|images| images.into_iter().map(ImageEntry::from).collect::<Vec<_>>())
            .or_extract(|| Some(extract::image_entries(&raw)))
            .into_result()?;

        let total = entries.len();
        let pages: Vec<PageItem> = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.into_page(index, &self.images))
            .collect();

        if pages.len() < total {
            debug!(
                "Chapter '{}': dropped {} of {} image entries without a usable URL",
                chapter_id,
                total - pages.len(),
                total
            );
        }
        Ok(pages)
    }
}
