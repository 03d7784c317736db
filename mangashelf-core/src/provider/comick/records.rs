//! Normalized intermediate records
//!
//! Both the strict schemas and the manual extraction path produce these
//! records, so mapping to domain values happens in exactly one place.

use std::collections::{BTreeMap, HashMap};

use super::schema::{
    self, ChapterImage, ChapterRow, ComicResponse, FeedComic, RankedComic, SearchComic,
    TopListing,
};
use super::urls::ImageHost;
use crate::domain::{CatalogItem, ChapterItem, ItemStatus, PageItem};

/// Preferred ranking period for trending listings
pub const CANONICAL_PERIOD: &str = "7";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComicRecord {
    pub slug: Option<String>,
    pub hid: Option<String>,
    pub id: Option<String>,
    pub title: Option<String>,
    pub alt_titles: Vec<String>,
    /// Storage key of the cover image
    pub cover_key: Option<String>,
    /// Ready-made cover URL
    pub cover_url: Option<String>,
    pub description: Option<String>,
    pub authors: Option<Vec<String>>,
    pub artists: Option<Vec<String>>,
    pub tags: Vec<String>,
    pub status: ItemStatus,
}

impl ComicRecord {
    /// Slug first, then the internal key, then the numeric id
    pub fn identifier(&self) -> Option<String> {
        [&self.slug, &self.hid, &self.id]
            .into_iter()
            .flatten()
            .find(|id| !id.trim().is_empty())
            .cloned()
    }

    /// Map to a catalog item; records without an identifier or a title are
    /// dropped
    pub fn into_item(self, images: &ImageHost) -> Option<CatalogItem> {
        let id = self.identifier()?;
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let cover_url = self
            .cover_url
            .as_deref()
            .and_then(|url| images.resolve(url))
            .or_else(|| self.cover_key.as_deref().and_then(|key| images.resolve(key)));

        Some(CatalogItem {
            id,
            title,
            alt_titles: self.alt_titles,
            cover_url,
            description: self.description.filter(|d| !d.trim().is_empty()),
            authors: self.authors,
            artists: self.artists,
            tags: self.tags,
            status: self.status,
        })
    }
}

impl From<RankedComic> for ComicRecord {
    fn from(comic: RankedComic) -> Self {
        Self {
            cover_key: schema::first_cover_key(&comic.md_covers),
            alt_titles: schema::alt_titles(&comic.md_titles),
            slug: Some(comic.slug),
            id: comic.id,
            title: Some(comic.title),
            ..Default::default()
        }
    }
}

impl From<FeedComic> for ComicRecord {
    fn from(comic: FeedComic) -> Self {
        Self {
            cover_key: schema::first_cover_key(&comic.md_covers),
            alt_titles: schema::alt_titles(&comic.md_titles),
            slug: comic.slug,
            hid: comic.hid,
            id: comic.id,
            title: Some(comic.title),
            cover_url: comic.cover_url,
            description: comic.desc,
            status: comic.status,
            ..Default::default()
        }
    }
}

impl From<SearchComic> for ComicRecord {
    fn from(comic: SearchComic) -> Self {
        Self {
            cover_key: schema::first_cover_key(&comic.md_covers),
            alt_titles: schema::alt_titles(&comic.md_titles),
            slug: Some(comic.slug),
            hid: Some(comic.hid),
            id: Some(comic.id),
            title: Some(comic.title),
            description: comic.desc,
            status: comic.status,
            ..Default::default()
        }
    }
}

impl From<ComicResponse> for ComicRecord {
    fn from(response: ComicResponse) -> Self {
        let comic = response.comic;
        Self {
            cover_key: schema::first_cover_key(&comic.md_covers),
            alt_titles: schema::alt_titles(&comic.md_titles),
            tags: schema::genre_names(&comic.md_comic_md_genres),
            authors: Some(schema::names(&response.authors)),
            artists: Some(schema::names(&response.artists)),
            slug: comic.slug,
            hid: Some(comic.hid),
            id: comic.id,
            title: Some(comic.title),
            description: comic.desc,
            status: comic.status,
            cover_url: None,
        }
    }
}

/// Trending rankings per period plus a slug → cover key lookup table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendingListing {
    pub periods: BTreeMap<String, Vec<ComicRecord>>,
    pub covers: HashMap<String, String>,
}

impl TrendingListing {
    /// Record cover keys from auxiliary ranking lists; first occurrence wins
    pub fn add_cover_source<'a>(&mut self, records: impl IntoIterator<Item = &'a ComicRecord>) {
        for record in records {
            if let (Some(slug), Some(key)) = (&record.slug, &record.cover_key) {
                self.covers
                    .entry(slug.clone())
                    .or_insert_with(|| key.clone());
            }
        }
    }

    pub fn selected_period(&self) -> Option<&str> {
        pick_period(self.periods.keys().map(String::as_str))
    }

    /// First `limit` entries of the selected period, in payload order
    pub fn select(mut self, limit: usize) -> Vec<ComicRecord> {
        let Some(period) = self.selected_period().map(str::to_string) else {
            return Vec::new();
        };
        let mut picked = self.periods.remove(&period).unwrap_or_default();
        picked.truncate(limit);

        for record in &mut picked {
            if record.cover_key.is_none() {
                record.cover_key = record
                    .slug
                    .as_ref()
                    .and_then(|slug| self.covers.get(slug))
                    .cloned();
            }
        }
        picked
    }
}

impl From<TopListing> for TrendingListing {
    fn from(listing: TopListing) -> Self {
        let rank: Vec<ComicRecord> = listing.rank.into_iter().map(Into::into).collect();
        let recent: Vec<ComicRecord> = listing.recent_rank.into_iter().map(Into::into).collect();

        let mut trending = TrendingListing {
            periods: listing
                .trending
                .into_iter()
                .map(|(period, comics)| (period, comics.into_iter().map(Into::into).collect()))
                .collect(),
            covers: HashMap::new(),
        };
        trending.add_cover_source(rank.iter().chain(recent.iter()));
        trending
    }
}

/// Pick the canonical period when present, otherwise the numerically
/// smallest key. Keys that are not numbers sort after every numeric key.
pub fn pick_period<'a>(keys: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let keys: Vec<&str> = keys.into_iter().collect();
    if keys.contains(&CANONICAL_PERIOD) {
        return Some(CANONICAL_PERIOD);
    }

    let period_value = |key: &str| {
        key.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(f64::INFINITY)
    };

    keys.into_iter().min_by(|a, b| {
        period_value(a)
            .total_cmp(&period_value(b))
            .then_with(|| a.cmp(b))
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterRecord {
    pub hid: Option<String>,
    pub id: Option<String>,
    pub chap: Option<String>,
    pub title: Option<String>,
    pub lang: Option<String>,
    pub published_at: Option<String>,
}

impl ChapterRecord {
    /// Map to a chapter item. `key` is the internal key the listing was
    /// fetched with, `manga_id` the identifier the caller asked for.
    pub fn into_item(self, key: &str, manga_id: &str) -> Option<ChapterItem> {
        let number = self
            .chap
            .as_deref()
            .and_then(|c| c.trim().parse::<f64>().ok())
            .filter(|n| n.is_finite());

        let id = self
            .hid
            .filter(|h| !h.is_empty())
            .or(self.id.filter(|i| !i.is_empty()))
            .or_else(|| self.chap.as_ref().map(|chap| format!("{key}-{chap}")))?;

        Some(ChapterItem {
            id,
            manga_id: manga_id.to_string(),
            title: self.title.filter(|t| !t.trim().is_empty()),
            number,
            lang: self.lang.filter(|l| !l.is_empty()),
            published_at: self.published_at.filter(|p| !p.is_empty()),
        })
    }
}

impl From<ChapterRow> for ChapterRecord {
    fn from(row: ChapterRow) -> Self {
        Self {
            hid: Some(row.hid),
            id: row.id,
            chap: row.chap,
            title: row.title,
            lang: row.lang,
            published_at: row.publish_at.or(row.created_at),
        }
    }
}

/// One raw entry of a chapter's image list
#[derive(Debug, Clone, PartialEq)]
pub enum ImageEntry {
    /// Bare string entry
    Url(String),
    /// Object entry with a ready URL and/or a storage key
    Stored {
        optimized: Option<String>,
        b2key: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    },
    /// Anything else
    Unusable,
}

impl ImageEntry {
    /// Resolve to a page at `index`, or `None` when no URL can be built
    pub fn into_page(self, index: usize, images: &ImageHost) -> Option<PageItem> {
        let (image_url, width, height) = match self {
            ImageEntry::Url(url) => (images.resolve(&url)?, None, None),
            ImageEntry::Stored {
                optimized,
                b2key,
                width,
                height,
            } => {
                let candidate = optimized
                    .filter(|o| !o.trim().is_empty())
                    .or(b2key.filter(|k| !k.trim().is_empty()))?;
                (images.resolve(&candidate)?, width, height)
            }
            ImageEntry::Unusable => return None,
        };

        Some(PageItem {
            index,
            image_url,
            width,
            height,
        })
    }
}

impl From<ChapterImage> for ImageEntry {
    fn from(image: ChapterImage) -> Self {
        ImageEntry::Stored {
            optimized: image.optimized,
            b2key: Some(image.b2key),
            width: image.w,
            height: image.h,
        }
    }
}
