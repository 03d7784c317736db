//! Manual extraction for payloads that failed their strict schema
//!
//! These walk the raw JSON directly and accept several known wrappers per
//! endpoint. They never fail on a single bad element; unusable elements are
//! skipped and the caller decides what an empty result means.

use serde_json::Value;

use super::records::{ChapterRecord, ComicRecord, ImageEntry, TrendingListing};
use super::schema::{id_from_value, status_from_value};

/// Follow a dotted path such as `data.trending`; `null` counts as missing
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
        .filter(|found| !found.is_null())
}

/// First path that resolves to a value
fn first_of<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|path| lookup(value, path))
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn id_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(id_from_value)
}

fn dimension_at(value: &Value, key: &str) -> Option<u32> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

/// The payload itself when it is an array, otherwise the first wrapper key
/// holding an array
pub fn probe_array<'a>(raw: &'a Value, wrappers: &[&str]) -> Option<&'a Vec<Value>> {
    if let Value::Array(items) = raw {
        return Some(items);
    }
    wrappers
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_array))
}

/// Names from a list of strings or `{ "name": ... }` objects
fn people(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|person| match person {
                Value::String(name) => Some(name.trim().to_string()),
                other => string_at(other, "name"),
            })
            .filter(|name| !name.is_empty())
            .collect(),
    )
}

/// Best-effort record from any comic-like object
pub fn comic_record(obj: &Value) -> ComicRecord {
    let alt_titles = obj
        .get("md_titles")
        .and_then(Value::as_array)
        .map(|titles| {
            titles
                .iter()
                .filter_map(|t| string_at(t, "title"))
                .collect()
        })
        .unwrap_or_default();

    let cover_key = obj
        .get("md_covers")
        .and_then(Value::as_array)
        .and_then(|covers| covers.first())
        .and_then(|cover| string_at(cover, "b2key"));

    let tags = obj
        .get("md_comic_md_genres")
        .and_then(Value::as_array)
        .map(|genres| {
            genres
                .iter()
                .filter_map(|g| g.get("md_genres").and_then(|genre| string_at(genre, "name")))
                .collect()
        })
        .unwrap_or_default();

    ComicRecord {
        slug: id_at(obj, "slug"),
        hid: id_at(obj, "hid"),
        id: id_at(obj, "id"),
        title: string_at(obj, "title"),
        alt_titles,
        cover_key,
        cover_url: string_at(obj, "cover_url").or_else(|| string_at(obj, "coverUrl")),
        description: string_at(obj, "desc").or_else(|| string_at(obj, "description")),
        authors: people(obj.get("authors")),
        artists: people(obj.get("artists")),
        tags,
        status: obj.get("status").map(status_from_value).unwrap_or_default(),
    }
}

fn comic_list(value: Option<&Value>) -> Vec<ComicRecord> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(comic_record).collect())
        .unwrap_or_default()
}

/// Trending listing, top level or under `data`. `None` only when no
/// trending map can be found at all.
pub fn trending_listing(raw: &Value) -> Option<TrendingListing> {
    let trending = first_of(raw, &["trending", "data.trending"])?.as_object()?;

    let mut listing = TrendingListing::default();
    for (period, comics) in trending {
        if let Some(items) = comics.as_array() {
            let records = items
                .iter()
                .filter(|comic| comic.is_object())
                .map(comic_record)
                .collect();
            listing.periods.insert(period.clone(), records);
        }
    }

    let rank = comic_list(first_of(raw, &["rank", "data.rank"]));
    let recent = comic_list(first_of(raw, &["recentRank", "data.recentRank"]));
    listing.add_cover_source(rank.iter().chain(recent.iter()));

    Some(listing)
}

/// Comics of the latest-chapter feed; unknown shapes yield nothing
pub fn latest_feed(raw: &Value) -> Vec<ComicRecord> {
    let Some(entries) = probe_array(raw, &["result", "chapters"]) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| first_of(entry, &["comic", "md_comics", "manga"]))
        .filter(|comic| comic.is_object())
        .map(comic_record)
        .collect()
}

/// Search hits; unknown shapes yield nothing
pub fn search_results(raw: &Value) -> Vec<ComicRecord> {
    probe_array(raw, &["result", "comics"])
        .map(|items| {
            items
                .iter()
                .filter(|item| item.is_object())
                .map(comic_record)
                .collect()
        })
        .unwrap_or_default()
}

/// Detail record; `None` unless both an identifier and a title are present
pub fn comic_detail(raw: &Value) -> Option<ComicRecord> {
    let comic = first_of(raw, &["comic", "manga"])
        .filter(|c| c.is_object())
        .or_else(|| raw.is_object().then_some(raw))?;

    let mut record = comic_record(comic);
    if let Some(authors) = people(raw.get("authors")) {
        record.authors = Some(authors);
    }
    if let Some(artists) = people(raw.get("artists")) {
        record.artists = Some(artists);
    }
    record.authors.get_or_insert_with(Vec::new);
    record.artists.get_or_insert_with(Vec::new);

    let has_title = record.title.as_deref().is_some_and(|t| !t.is_empty());
    (record.identifier().is_some() && has_title).then_some(record)
}

/// Internal key from a comic detail payload
pub fn internal_key(raw: &Value) -> Option<String> {
    first_of(raw, &["comic.hid", "hid", "manga.hid"]).and_then(id_from_value)
}

/// Chapter rows; unknown shapes yield nothing
pub fn chapter_list(raw: &Value) -> Vec<ChapterRecord> {
    let Some(rows) = probe_array(raw, &["chapters", "result"]) else {
        return Vec::new();
    };
    rows.iter()
        .filter(|row| row.is_object())
        .map(|row| ChapterRecord {
            hid: id_at(row, "hid"),
            id: id_at(row, "id"),
            chap: id_at(row, "chap"),
            title: string_at(row, "title"),
            lang: string_at(row, "lang"),
            published_at: string_at(row, "publish_at").or_else(|| string_at(row, "created_at")),
        })
        .collect()
}

/// Raw image entries in payload order, unusable ones included so that
/// positions stay aligned with the upstream list
pub fn image_entries(raw: &Value) -> Vec<ImageEntry> {
    let Some(items) = probe_array(raw, &["images", "result"]) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(url) => ImageEntry::Url(url.clone()),
            Value::Object(_) => ImageEntry::Stored {
                optimized: string_at(item, "optimized"),
                b2key: string_at(item, "b2key"),
                width: dimension_at(item, "w"),
                height: dimension_at(item, "h"),
            },
            _ => ImageEntry::Unusable,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_lookup_dotted_path() {
        let raw = json!({"data": {"trending": {"7": []}}, "empty": null});
        assert!(lookup(&raw, "data.trending").is_some());
        assert!(lookup(&raw, "data.missing").is_none());
        assert!(lookup(&raw, "empty").is_none());
    }

    #[test]
    fn test_probe_array_prefers_bare_array() {
        let bare = json!([1, 2]);
        assert_eq!(probe_array(&bare, &["result"]).map(Vec::len), Some(2));

        let wrapped = json!({"comics": [1], "result": "not-an-array"});
        assert_eq!(probe_array(&wrapped, &["result", "comics"]).map(Vec::len), Some(1));

        assert!(probe_array(&json!({"other": []}), &["result"]).is_none());
    }

    #[test]
    fn test_trending_under_data_wrapper() {
        let raw = json!({
            "data": {
                "trending": {
                    "30": [{"slug": "b", "title": "B"}],
                    "7": [{"slug": "a", "title": "A"}, "junk"]
                },
                "rank": [{"slug": "a", "md_covers": [{"b2key": "a-cover"}]}]
            }
        });
        let listing = trending_listing(&raw).unwrap();
        assert_eq!(listing.selected_period(), Some("7"));
        assert_eq!(listing.periods["7"].len(), 1);

        let picked = listing.select(10);
        assert_eq!(picked[0].cover_key.as_deref(), Some("a-cover"));
    }

    #[test]
    fn test_trending_missing_map() {
        assert!(trending_listing(&json!({"rank": []})).is_none());
        assert!(trending_listing(&json!({"trending": []})).is_none());
    }

    #[test]
    fn test_latest_feed_wrappers() {
        let raw = json!({"result": [
            {"md_comics": {"slug": "x", "title": "X"}},
            {"comic": {"hid": "h1"}},
            {"nothing": true}
        ]});
        let records = latest_feed(&raw);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].hid.as_deref(), Some("h1"));

        assert!(latest_feed(&json!({"unexpected": 1})).is_empty());
    }

    #[test]
    fn test_latest_feed_prefers_comic_over_md_comics() {
        let raw = json!([
            {
                "comic": {"slug": "from-comic", "title": "A"},
                "md_comics": {"slug": "from-md-comics", "title": "B"},
                "manga": {"slug": "from-manga", "title": "C"}
            },
            {
                "md_comics": {"slug": "md-only", "title": "D"},
                "manga": {"slug": "ignored", "title": "E"}
            }
        ]);
        let slugs: Vec<_> = latest_feed(&raw)
            .into_iter()
            .filter_map(|record| record.slug)
            .collect();
        assert_eq!(slugs, vec!["from-comic", "md-only"]);
    }

    #[test]
    fn test_comic_detail_requires_id_and_title() {
        let raw = json!({
            "comic": {"hid": "abcdefghij", "title": "T", "status": "Completed"},
            "authors": ["A", {"name": "B"}, {"name": 3}]
        });
        let record = comic_detail(&raw).unwrap();
        assert_eq!(record.authors, Some(vec!["A".to_string(), "B".to_string()]));
        assert_eq!(record.artists, Some(vec![]));
        assert_eq!(record.status, ItemStatus::Completed);

        assert!(comic_detail(&json!({"comic": {"hid": "abcdefghij"}})).is_none());
        assert!(comic_detail(&json!({"comic": {"title": "No id"}})).is_none());
        assert!(comic_detail(&json!("text")).is_none());
    }

    #[test]
    fn test_internal_key_locations() {
        assert_eq!(internal_key(&json!({"comic": {"hid": "k1"}})).as_deref(), Some("k1"));
        assert_eq!(internal_key(&json!({"hid": "k2"})).as_deref(), Some("k2"));
        assert_eq!(internal_key(&json!({"manga": {"hid": "k3"}})).as_deref(), Some("k3"));
        assert_eq!(internal_key(&json!({"comic": {}})), None);
    }

    #[test]
    fn test_image_entries_keep_positions() {
        let raw = json!({"images": ["https://x/1.jpg", 5, {"b2key": "k", "w": 10}]});
        let entries = image_entries(&raw);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1], ImageEntry::Unusable);
        assert_eq!(
            entries[2],
            ImageEntry::Stored {
                optimized: None,
                b2key: Some("k".to_string()),
                width: Some(10),
                height: None,
            }
        );
    }
}
