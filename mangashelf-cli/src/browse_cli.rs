//! Catalog browsing commands

use anyhow::Result;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use mangashelf_core::cache::{QueryError, QueryOutcome};
use mangashelf_core::domain::{CatalogItem, ChapterItem, PageItem};
use mangashelf_core::shelf::Shelf;

const MAX_CELL_CHARS: usize = 60;

/// Table row for catalog listings
#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Tags")]
    tags: String,
}

impl From<&CatalogItem> for ItemRow {
    fn from(item: &CatalogItem) -> Self {
        Self {
            id: item.id.clone(),
            title: truncate(&item.title),
            status: item.status.to_string(),
            tags: truncate(&item.tags.join(", ")),
        }
    }
}

/// Table row for chapter listings
#[derive(Tabled)]
struct ChapterRow {
    #[tabled(rename = "Chapter")]
    number: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Lang")]
    lang: String,
    #[tabled(rename = "Published")]
    published: String,
    #[tabled(rename = "ID")]
    id: String,
}

impl From<&ChapterItem> for ChapterRow {
    fn from(chapter: &ChapterItem) -> Self {
        Self {
            number: chapter
                .number
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            title: truncate(chapter.title.as_deref().unwrap_or("")),
            lang: chapter.lang.clone().unwrap_or_default(),
            published: chapter.published_at.clone().unwrap_or_default(),
            id: chapter.id.clone(),
        }
    }
}

/// Table row for chapter pages
#[derive(Tabled)]
struct PageRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "URL")]
    url: String,
}

impl From<&PageItem> for PageRow {
    fn from(page: &PageItem) -> Self {
        let size = match (page.width, page.height) {
            (Some(w), Some(h)) => format!("{w}x{h}"),
            _ => String::new(),
        };
        Self {
            index: page.index,
            size,
            url: page.image_url.clone(),
        }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_CHARS {
        return text.to_string();
    }
    let mut short: String = text.chars().take(MAX_CELL_CHARS - 1).collect();
    short.push('…');
    short
}

fn render<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Unwrap a query result, warning on stderr when stale data is served
fn settle<T>(result: Result<QueryOutcome<T>, QueryError>) -> Result<T> {
    let outcome = result?;
    if let Some(error) = &outcome.error {
        eprintln!("Warning: showing cached data, refresh failed: {error}");
    }
    Ok(outcome.into_data())
}

fn print_items(items: &[CatalogItem], json: bool, empty_message: &str) -> Result<()> {
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("{empty_message}");
        return Ok(());
    }
    let rows: Vec<ItemRow> = items.iter().map(ItemRow::from).collect();
    println!("{}", render(&rows));
    Ok(())
}

pub async fn trending(shelf: &Shelf, limit: usize, json: bool) -> Result<()> {
    let page = settle(shelf.trending(limit).await)?;
    print_items(&page.items, json, "Nothing is trending right now.")
}

pub async fn latest(shelf: &Shelf, limit: usize, json: bool) -> Result<()> {
    let page = settle(shelf.latest(limit).await)?;
    print_items(&page.items, json, "No recent chapters.")
}

pub async fn search(shelf: &Shelf, query: &str, limit: usize, json: bool) -> Result<()> {
    let page = settle(shelf.search(query, limit).await)?;
    print_items(
        &page.items,
        json,
        &format!("No titles found matching '{query}'."),
    )
}

pub async fn show(shelf: &Shelf, id: &str, json: bool) -> Result<()> {
    let item = settle(shelf.get_manga(id).await)?;
    if json {
        return print_json(&item);
    }

    println!("{}", item.title);
    println!("  ID:      {}", item.id);
    println!("  Status:  {}", item.status);
    if !item.alt_titles.is_empty() {
        println!("  Also:    {}", truncate(&item.alt_titles.join(" / ")));
    }
    if let Some(authors) = item.authors.as_ref().filter(|a| !a.is_empty()) {
        println!("  Authors: {}", authors.join(", "));
    }
    if let Some(artists) = item.artists.as_ref().filter(|a| !a.is_empty()) {
        println!("  Artists: {}", artists.join(", "));
    }
    if !item.tags.is_empty() {
        println!("  Tags:    {}", item.tags.join(", "));
    }
    if let Some(cover) = &item.cover_url {
        println!("  Cover:   {cover}");
    }
    if let Some(description) = &item.description {
        println!();
        println!("{}", description.trim());
    }
    Ok(())
}

pub async fn chapters(shelf: &Shelf, id: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let page = settle(shelf.get_chapters(id, limit).await)?;
    if json {
        return print_json(&page.items);
    }
    if page.items.is_empty() {
        println!("No chapters found for '{id}'.");
        return Ok(());
    }
    let rows: Vec<ChapterRow> = page.items.iter().map(ChapterRow::from).collect();
    println!("{}", render(&rows));
    Ok(())
}

pub async fn pages(shelf: &Shelf, chapter_id: &str, json: bool) -> Result<()> {
    let pages = settle(shelf.get_chapter_pages(chapter_id).await)?;
    if json {
        return print_json(&pages);
    }
    if pages.is_empty() {
        println!("No pages found for chapter '{chapter_id}'.");
        return Ok(());
    }
    let rows: Vec<PageRow> = pages.iter().map(PageRow::from).collect();
    println!("{}", render(&rows));
    Ok(())
}
