//! End-to-end reads through the shelf: adapter behind the query cache

mod common;

use common::{
    fixture, init_test_logging, provider, serve_truncated_json, MockTransport, Reply, IMAGE_BASE,
};
use mangashelf_core::cache::{keys, CachePolicy, EntryState, QueryCache};
use mangashelf_core::provider::comick::client::HttpClient;
use mangashelf_core::provider::comick::{ComickProvider, PROVIDER_ID};
use mangashelf_core::provider::ProviderRegistry;
use mangashelf_core::shelf::Shelf;
use mangashelf_core::CatalogError;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn no_retries() -> CachePolicy {
    CachePolicy {
        retries: 0,
        retry_delay: Duration::from_millis(1),
        ..CachePolicy::default()
    }
}

fn shelf(transport: Arc<MockTransport>) -> Shelf {
    let registry = ProviderRegistry::new(Arc::new(provider(transport)));
    Shelf::new(Arc::new(registry), QueryCache::new(no_retries()))
}

#[tokio::test]
async fn test_repeated_reads_hit_the_cache() {
    init_test_logging();
    let transport = Arc::new(MockTransport::new());
    transport.on_json("/top?type=trending", fixture("top_trending.json"));
    let shelf = shelf(transport.clone());

    let first = shelf.trending(3).await.unwrap();
    let second = shelf.trending(3).await.unwrap();

    assert_eq!(first.data, second.data);
    assert!(second.is_fresh());
    assert_eq!(transport.count("/top?type=trending"), 1);
    assert!(shelf
        .cache()
        .peek(&keys::trending(PROVIDER_ID, 3))
        .is_some());
}

#[tokio::test]
async fn test_parameters_are_part_of_the_key() {
    let transport = Arc::new(MockTransport::new());
    transport.on_json("/top?type=trending", fixture("top_trending.json"));
    let shelf = shelf(transport.clone());

    assert_eq!(shelf.trending(1).await.unwrap().data.len(), 1);
    assert_eq!(shelf.trending(2).await.unwrap().data.len(), 2);
    assert_eq!(transport.count("/top?type=trending"), 2);
}

#[tokio::test]
async fn test_manga_and_chapters_are_cached_separately() {
    let transport = Arc::new(MockTransport::new());
    transport.on_json("/v1.0/comic/solo-leveling/", fixture("comic_detail.json"));
    transport.on_json("/comic/solo-leveling/chapters", fixture("chapters.json"));
    let shelf = shelf(transport.clone());

    let manga = shelf.get_manga("solo-leveling").await.unwrap().into_data();
    let chapters = shelf
        .get_chapters("solo-leveling", None)
        .await
        .unwrap()
        .into_data();
    shelf.get_manga("solo-leveling").await.unwrap();
    shelf.get_chapters("solo-leveling", None).await.unwrap();

    assert_eq!(manga.title, "Solo Leveling");
    assert_eq!(chapters.len(), 6);
    assert_eq!(
        transport.requests(),
        vec!["/v1.0/comic/solo-leveling/", "/comic/solo-leveling/chapters"]
    );
}

#[tokio::test]
async fn test_padded_ids_share_the_cache_entry() {
    let transport = Arc::new(MockTransport::new());
    transport.on_json("/v1.0/comic/solo-leveling/", fixture("comic_detail.json"));
    transport.on_json("/comic/solo-leveling/chapters", fixture("chapters.json"));
    let shelf = shelf(transport.clone());

    shelf.get_manga(" solo-leveling ").await.unwrap();
    shelf.get_manga("solo-leveling").await.unwrap();
    shelf.get_chapters("solo-leveling\t", None).await.unwrap();
    shelf.get_chapters("solo-leveling", None).await.unwrap();

    assert_eq!(transport.count("/v1.0/comic/solo-leveling/"), 1);
    assert_eq!(transport.count("/comic/solo-leveling/chapters"), 1);
    assert!(shelf
        .cache()
        .peek(&keys::manga(PROVIDER_ID, "solo-leveling"))
        .is_some());
}

#[tokio::test]
async fn test_upstream_failure_reaches_caller() {
    let transport = Arc::new(MockTransport::new());
    transport.on("/chapter/c9/get_images", Reply::Status(500));
    let shelf = shelf(transport);

    let err = shelf.get_chapter_pages("c9").await.unwrap_err();
    assert_eq!(err.catalog_error().and_then(|e| e.status()), Some(500));
    assert_eq!(
        shelf.cache().failure_count(&keys::chapter_pages(PROVIDER_ID, "c9")),
        1
    );
}

#[tokio::test]
async fn test_invalidated_search_is_fetched_again() {
    let transport = Arc::new(MockTransport::new());
    transport.on_json(
        "/v1.0/search/?q=one&limit=5",
        fixture("search_wrapped.json"),
    );
    let shelf = shelf(transport.clone());

    shelf.search("one", 5).await.unwrap();
    // Surrounding whitespace does not make a new key
    shelf.search("  one ", 5).await.unwrap();
    assert_eq!(transport.count("/v1.0/search/?q=one&limit=5"), 1);

    shelf
        .cache()
        .invalidate(&keys::search(PROVIDER_ID, "one", 5));
    shelf.search("one", 5).await.unwrap();
    assert_eq!(transport.count("/v1.0/search/?q=one&limit=5"), 2);
}

#[tokio::test]
async fn test_transport_failure_stores_nothing() {
    let transport = Arc::new(MockTransport::new());
    transport.on("/chapter/?order=new&page=1", Reply::Network);
    let shelf = shelf(transport);

    let err = shelf.latest(5).await.unwrap_err();

    assert!(matches!(
        err.catalog_error(),
        Some(CatalogError::Transport { .. })
    ));
    let key = keys::latest(PROVIDER_ID, 5);
    assert!(shelf.cache().peek(&key).is_none());
    assert_eq!(shelf.cache().state(&key), EntryState::Absent);
    assert!(shelf.cache().is_empty());
}

#[tokio::test]
async fn test_truncated_response_is_not_cached_as_empty() {
    let client = HttpClient::new(Duration::from_secs(5), "mangashelf-test").unwrap();
    let base = serve_truncated_json();
    let comick = ComickProvider::new(Arc::new(client), &base, IMAGE_BASE).unwrap();
    let registry = ProviderRegistry::new(Arc::new(comick));
    let shelf = Shelf::new(Arc::new(registry), QueryCache::new(no_retries()));

    let err = shelf.search("one piece", 5).await.unwrap_err();

    assert!(matches!(
        err.catalog_error(),
        Some(CatalogError::Transport { .. })
    ));
    assert!(shelf
        .cache()
        .peek(&keys::search(PROVIDER_ID, "one piece", 5))
        .is_none());
    assert!(shelf.cache().is_empty());
}
