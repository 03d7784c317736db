//! Structural schemas for Comick payloads
//!
//! Each endpoint gets a serde type describing the shape we expect. Required
//! fields are plain types and make the schema fail when missing or mistyped.
//! Optional fields go through [`lenient`] (or one of its siblings), which
//! turns a mistyped value into the field's default instead of failing the
//! whole record.
//!
//! Validation is a two-stage pipeline:
//!
//! ```text
//! raw JSON ──strict──► Parsed(T)
//!     │
//!     └──────────────► NeedsFallback ──extract──► Parsed(T)
//!                                          │
//!                                          └────► Failed
//! ```

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::ItemStatus;
use crate::error::{CatalogError, Result};

/// Named payload shapes, one per endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    TopListing,
    LatestFeed,
    SearchResults,
    ComicDetail,
    ChapterList,
    ChapterImages,
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::TopListing => "top listing",
            Shape::LatestFeed => "latest feed",
            Shape::SearchResults => "search results",
            Shape::ComicDetail => "comic detail",
            Shape::ChapterList => "chapter list",
            Shape::ChapterImages => "chapter images",
        }
    }
}

/// Why a payload did not match its schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub shape: Shape,
    pub reason: String,
}

impl From<SchemaMismatch> for CatalogError {
    fn from(mismatch: SchemaMismatch) -> Self {
        CatalogError::Schema {
            shape: mismatch.shape.name(),
            reason: mismatch.reason,
        }
    }
}

/// Outcome of the strict-then-tolerant pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Validated<T> {
    Parsed(T),
    NeedsFallback(SchemaMismatch),
    Failed(SchemaMismatch),
}

impl<T: DeserializeOwned> Validated<T> {
    /// Stage one: deserialize against the strict schema
    pub fn strict(shape: Shape, raw: &Value) -> Self {
        match T::deserialize(raw) {
            Ok(parsed) => Validated::Parsed(parsed),
            Err(e) => Validated::NeedsFallback(SchemaMismatch {
                shape,
                reason: e.to_string(),
            }),
        }
    }
}

impl<T> Validated<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Validated<U> {
        match self {
            Validated::Parsed(value) => Validated::Parsed(f(value)),
            Validated::NeedsFallback(m) => Validated::NeedsFallback(m),
            Validated::Failed(m) => Validated::Failed(m),
        }
    }

    /// Stage two: manual extraction, only run when stage one failed
    pub fn or_extract(self, extract: impl FnOnce() -> Option<T>) -> Validated<T> {
        match self {
            Validated::NeedsFallback(mismatch) => match extract() {
                Some(value) => {
                    debug!(
                        "{} failed strict schema ({}); recovered by manual extraction",
                        mismatch.shape.name(),
                        mismatch.reason
                    );
                    Validated::Parsed(value)
                }
                None => Validated::Failed(mismatch),
            },
            other => other,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Validated::Parsed(_))
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            Validated::Parsed(value) => Ok(value),
            Validated::NeedsFallback(m) | Validated::Failed(m) => Err(m.into()),
        }
    }
}

// ============================================================================
// Tolerant field deserializers
// ============================================================================

/// Deserialize `T`, substituting `T::default()` when the value has the wrong type
pub fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Identifier that may arrive as a string or a number
pub fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(id_from_value(&value))
}

/// Required identifier that may arrive as a string or a number
pub fn required_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value)
        .ok_or_else(|| de::Error::custom("expected a non-empty string or number identifier"))
}

/// Status as a numeric code, numeric string, or label
pub fn lenient_status<'de, D>(deserializer: D) -> std::result::Result<ItemStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(status_from_value(&value))
}

pub fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn number_from_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

pub fn status_from_value(value: &Value) -> ItemStatus {
    match value {
        Value::Number(n) => n.as_i64().map(ItemStatus::from_code).unwrap_or_default(),
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(code) => ItemStatus::from_code(code),
            Err(_) => ItemStatus::from_label(s),
        },
        _ => ItemStatus::Unknown,
    }
}

// ============================================================================
// Shared fragments
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MdCover {
    #[serde(default, deserialize_with = "lenient")]
    pub w: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    pub h: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    pub b2key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MdTitle {
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub lang: Option<String>,
}

/// Storage key of the first cover, if any
pub fn first_cover_key(covers: &[MdCover]) -> Option<String> {
    covers
        .first()
        .and_then(|c| c.b2key.clone())
        .filter(|k| !k.trim().is_empty())
}

pub fn alt_titles(titles: &[MdTitle]) -> Vec<String> {
    titles
        .iter()
        .filter_map(|t| t.title.clone())
        .filter(|t| !t.trim().is_empty())
        .collect()
}

// ============================================================================
// GET /top?type=trending
// ============================================================================

/// Entry of a ranking list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RankedComic {
    #[serde(deserialize_with = "required_id")]
    pub slug: String,

    pub title: String,

    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub md_titles: Vec<MdTitle>,

    #[serde(default, deserialize_with = "lenient")]
    pub md_covers: Vec<MdCover>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopListing {
    #[serde(default, deserialize_with = "lenient")]
    pub rank: Vec<RankedComic>,

    #[serde(rename = "recentRank", default, deserialize_with = "lenient")]
    pub recent_rank: Vec<RankedComic>,

    /// Rankings per period, keyed by period length ("7", "30", ...)
    pub trending: BTreeMap<String, Vec<RankedComic>>,
}

// ============================================================================
// GET /chapter/?order=new
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedComic {
    #[serde(default, deserialize_with = "lenient_id")]
    pub slug: Option<String>,

    #[serde(default, deserialize_with = "lenient_id")]
    pub hid: Option<String>,

    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,

    pub title: String,

    #[serde(default, deserialize_with = "lenient")]
    pub cover_url: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub md_titles: Vec<MdTitle>,

    #[serde(default, deserialize_with = "lenient")]
    pub md_covers: Vec<MdCover>,

    #[serde(default, deserialize_with = "lenient")]
    pub desc: Option<String>,

    #[serde(default, deserialize_with = "lenient_status")]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedChapter {
    pub md_comics: FeedComic,
}

// ============================================================================
// GET /v1.0/search/
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchComic {
    #[serde(deserialize_with = "required_id")]
    pub id: String,

    pub hid: String,

    pub slug: String,

    pub title: String,

    #[serde(default, deserialize_with = "lenient")]
    pub desc: Option<String>,

    #[serde(default, deserialize_with = "lenient_status")]
    pub status: ItemStatus,

    #[serde(default, deserialize_with = "lenient")]
    pub md_titles: Vec<MdTitle>,

    #[serde(default, deserialize_with = "lenient")]
    pub md_covers: Vec<MdCover>,
}

// ============================================================================
// GET /v1.0/comic/{id}/
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Person {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Genre {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComicGenre {
    #[serde(default, deserialize_with = "lenient")]
    pub md_genres: Option<Genre>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComicDetails {
    pub hid: String,

    pub title: String,

    #[serde(default, deserialize_with = "lenient_id")]
    pub slug: Option<String>,

    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub desc: Option<String>,

    #[serde(default, deserialize_with = "lenient_status")]
    pub status: ItemStatus,

    #[serde(default, deserialize_with = "lenient")]
    pub md_titles: Vec<MdTitle>,

    #[serde(default, deserialize_with = "lenient")]
    pub md_covers: Vec<MdCover>,

    #[serde(default, deserialize_with = "lenient")]
    pub md_comic_md_genres: Vec<ComicGenre>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComicResponse {
    pub comic: ComicDetails,

    #[serde(default, deserialize_with = "lenient")]
    pub authors: Vec<Person>,

    #[serde(default, deserialize_with = "lenient")]
    pub artists: Vec<Person>,
}

pub fn names(people: &[Person]) -> Vec<String> {
    people
        .iter()
        .filter_map(|p| p.name.clone())
        .filter(|n| !n.trim().is_empty())
        .collect()
}

pub fn genre_names(genres: &[ComicGenre]) -> Vec<String> {
    genres
        .iter()
        .filter_map(|g| g.md_genres.as_ref().and_then(|genre| genre.name.clone()))
        .filter(|n| !n.trim().is_empty())
        .collect()
}

// ============================================================================
// GET /comic/{hid}/chapters
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChapterRow {
    pub hid: String,

    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,

    /// Chapter number as sent upstream (string or number)
    #[serde(default, deserialize_with = "lenient_id")]
    pub chap: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub lang: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub publish_at: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChaptersResponse {
    pub chapters: Vec<ChapterRow>,

    #[serde(default, deserialize_with = "lenient")]
    pub total: Option<u64>,
}

// ============================================================================
// GET /chapter/{id}/get_images
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChapterImage {
    pub b2key: String,

    #[serde(default, deserialize_with = "lenient")]
    pub optimized: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub w: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    pub h: Option<u32>,
}
