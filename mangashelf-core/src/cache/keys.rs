//! Query keys
//!
//! A key is the operation name plus its serialized parameters, rendered as a
//! compact JSON array so it doubles as the snapshot map key.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(operation: &str, params: Value) -> Self {
        QueryKey(Value::Array(vec![Value::from(operation), params]).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Operation name, when the key was built by [`QueryKey::new`]
    pub fn operation(&self) -> Option<String> {
        serde_json::from_str::<Value>(&self.0)
            .ok()?
            .get(0)?
            .as_str()
            .map(str::to_string)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn trending(provider: &str, limit: usize) -> QueryKey {
    QueryKey::new(
        "explore.trending",
        json!({"provider": provider, "limit": limit}),
    )
}

pub fn latest(provider: &str, limit: usize) -> QueryKey {
    QueryKey::new(
        "explore.latest",
        json!({"provider": provider, "limit": limit}),
    )
}

pub fn search(provider: &str, query: &str, limit: usize) -> QueryKey {
    QueryKey::new(
        "search",
        json!({"provider": provider, "query": query.trim(), "limit": limit}),
    )
}

pub fn manga(provider: &str, id: &str) -> QueryKey {
    QueryKey::new("manga", json!({"provider": provider, "id": id.trim()}))
}

pub fn chapters(provider: &str, manga_id: &str, limit: Option<usize>) -> QueryKey {
    QueryKey::new(
        "manga.chapters",
        json!({"provider": provider, "id": manga_id.trim(), "limit": limit}),
    )
}

pub fn chapter_pages(provider: &str, chapter_id: &str) -> QueryKey {
    QueryKey::new(
        "chapter.pages",
        json!({"provider": provider, "id": chapter_id.trim()}),
    )
}
