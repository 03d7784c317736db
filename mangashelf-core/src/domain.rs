//! Provider-agnostic catalog entities
//!
//! These are plain value objects. They carry no reference back to the
//! provider that produced them, so they can be cached and persisted as-is.

use serde::{Deserialize, Serialize};

pub type CatalogId = String;
pub type ChapterId = String;

/// Publication status of a catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
    #[default]
    Unknown,
}

impl ItemStatus {
    /// Map the upstream numeric status field (1 ongoing, 2 completed)
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ItemStatus::Ongoing,
            2 => ItemStatus::Completed,
            _ => ItemStatus::Unknown,
        }
    }

    /// Map a free-form status label by prefix ("Ongoing", "completed", ...)
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("ongo") {
            ItemStatus::Ongoing
        } else if label.contains("complet") {
            ItemStatus::Completed
        } else if label.contains("hiat") {
            ItemStatus::Hiatus
        } else if label.contains("cancel") {
            ItemStatus::Cancelled
        } else {
            ItemStatus::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Ongoing => "ongoing",
            ItemStatus::Completed => "completed",
            ItemStatus::Hiatus => "hiatus",
            ItemStatus::Cancelled => "cancelled",
            ItemStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One browsable work in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Stable identifier; the slug when known, otherwise the internal id
    pub id: CatalogId,

    pub title: String,

    #[serde(default)]
    pub alt_titles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artists: Option<Vec<String>>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub status: ItemStatus,
}

impl CatalogItem {
    /// Minimal item with only the identifier and title set
    pub fn new(id: impl Into<CatalogId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            alt_titles: Vec::new(),
            cover_url: None,
            description: None,
            authors: None,
            artists: None,
            tags: Vec::new(),
            status: ItemStatus::Unknown,
        }
    }
}

/// One chapter of a catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterItem {
    pub id: ChapterId,

    /// Identifier of the owning catalog item
    pub manga_id: CatalogId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Ordering key; may be fractional ("10.5")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    /// ISO-8601 publish timestamp as reported upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

/// Sort chapters by ordering key, ascending.
///
/// Chapters without a key go last. The sort is stable, so chapters that
/// compare equal (or both lack a key) keep their input order.
pub fn sort_chapters(chapters: &mut [ChapterItem]) {
    chapters.sort_by(|a, b| match (a.number, b.number) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// One page image of a chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageItem {
    /// Position of the entry in the upstream image list.
    ///
    /// Entries without a resolvable URL are dropped without renumbering,
    /// so indices may have gaps.
    pub index: usize,

    pub image_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// One page of results plus an optional continuation cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,

    /// Opaque cursor; `None` means there are no further pages
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl<T> PagedResult<T> {
    /// A single, final page
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}
