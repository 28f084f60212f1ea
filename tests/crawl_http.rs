//! Crawler integration tests against a local mock HTTP server.

use std::time::Duration;

use httpmock::prelude::*;
use tempfile::tempdir;
use url::Url;

use docsmith::crawler::{Crawler, CrawlerOptions};
use docsmith::store::SqlitePageStore;

fn quick_options() -> CrawlerOptions {
    CrawlerOptions {
        request_delay: Duration::ZERO,
        ..CrawlerOptions::default()
    }
}

/// A page comfortably above the 50-word content threshold.
fn wordy_page(title: &str, links: &[&str]) -> String {
    let words = (0..60)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ");
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{href}">link</a>"#))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body><main><p>{words}</p>{anchors}</main></body></html>"
    )
}

fn thin_page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{href}">link</a>"#))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body><p>too few words</p>{anchors}</body></html>"
    )
}

async fn scratch_store() -> (tempfile::TempDir, SqlitePageStore) {
    init_tracing();
    let dir = tempdir().unwrap();
    let store = SqlitePageStore::open(dir.path().join("pages.sqlite"))
        .await
        .unwrap();
    (dir, store)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[tokio::test]
async fn crawl_stays_inside_the_seed_domain() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(wordy_page(
                "Root",
                &["/a", "/b", "/c", "https://elsewhere.invalid/external"],
            ));
        })
        .await;
    for path in ["/a", "/b", "/c"] {
        server
            .mock_async(move |when, then| {
                when.method(GET).path(path);
                then.status(200).body(wordy_page(path, &[]));
            })
            .await;
    }

    let (_dir, store) = scratch_store().await;
    let crawler = Crawler::new(store.clone(), quick_options()).unwrap();
    let seed: Url = server.url("/").parse().unwrap();

    let report = crawler.crawl(&seed, 1, 10).await.unwrap();
    assert_eq!(report.pages_saved, 4);

    let urls = store.all_urls().await.unwrap();
    assert_eq!(urls.len(), 4);
    assert!(
        urls.iter().all(|url| !url.contains("elsewhere.invalid")),
        "external host must never be enqueued"
    );
}

#[tokio::test]
async fn crawl_respects_the_depth_bound() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(wordy_page("Root", &["/level1"]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/level1");
            then.status(200).body(wordy_page("Level 1", &["/level2"]));
        })
        .await;
    let too_deep = server
        .mock_async(|when, then| {
            when.method(GET).path("/level2");
            then.status(200).body(wordy_page("Level 2", &[]));
        })
        .await;

    let (_dir, store) = scratch_store().await;
    let crawler = Crawler::new(store, quick_options()).unwrap();
    let seed: Url = server.url("/").parse().unwrap();

    let report = crawler.crawl(&seed, 1, 10).await.unwrap();
    assert_eq!(report.pages_saved, 2);
    assert_eq!(too_deep.hits_async().await, 0, "no fetch beyond max_depth");
}

#[tokio::test]
async fn crawl_stops_at_the_page_budget() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body(wordy_page("Root", &["/p1", "/p2", "/p3", "/p4"]));
        })
        .await;
    for path in ["/p1", "/p2", "/p3", "/p4"] {
        server
            .mock_async(move |when, then| {
                when.method(GET).path(path);
                then.status(200).body(wordy_page(path, &[]));
            })
            .await;
    }

    let (_dir, store) = scratch_store().await;
    let crawler = Crawler::new(store.clone(), quick_options()).unwrap();
    let seed: Url = server.url("/").parse().unwrap();

    let report = crawler.crawl(&seed, 2, 2).await.unwrap();
    assert_eq!(report.pages_saved, 2);
    assert_eq!(store.all_urls().await.unwrap().len(), 2);
}

#[tokio::test]
async fn recrawl_is_idempotent() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(wordy_page("Root", &["/a"]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/a");
            then.status(200).body(wordy_page("A", &[]));
        })
        .await;

    let (_dir, store) = scratch_store().await;
    let crawler = Crawler::new(store.clone(), quick_options()).unwrap();
    let seed: Url = server.url("/").parse().unwrap();

    let first = crawler.crawl(&seed, 1, 10).await.unwrap();
    assert_eq!(first.pages_saved, 2);
    let count_after_first = store.all_urls().await.unwrap().len();

    // Everything is already visited, so the second run saves nothing and
    // creates no new entries.
    let second = crawler.crawl(&seed, 1, 10).await.unwrap();
    assert_eq!(second.pages_saved, 0);
    assert_eq!(store.all_urls().await.unwrap().len(), count_after_first);
}

#[tokio::test]
async fn thin_pages_are_skipped_but_their_links_are_followed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(thin_page("Thin Root", &["/fat"]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/fat");
            then.status(200).body(wordy_page("Fat", &[]));
        })
        .await;

    let (_dir, store) = scratch_store().await;
    let crawler = Crawler::new(store.clone(), quick_options()).unwrap();
    let seed: Url = server.url("/").parse().unwrap();

    let report = crawler.crawl(&seed, 1, 10).await.unwrap();
    assert_eq!(report.pages_saved, 1);
    assert!(report.pages_skipped >= 1);

    let urls = store.all_urls().await.unwrap();
    assert_eq!(urls.len(), 1);
    assert!(urls.iter().next().unwrap().ends_with("/fat"));
}

#[tokio::test]
async fn non_200_responses_are_skipped_without_aborting() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body(wordy_page("Root", &["/missing", "/present"]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/present");
            then.status(200).body(wordy_page("Present", &[]));
        })
        .await;

    let (_dir, store) = scratch_store().await;
    let crawler = Crawler::new(store, quick_options()).unwrap();
    let seed: Url = server.url("/").parse().unwrap();

    let report = crawler.crawl(&seed, 1, 10).await.unwrap();
    assert_eq!(report.pages_saved, 2);
    assert!(report.pages_skipped >= 1);
}

#[tokio::test]
async fn saved_pages_are_mirrored_as_raw_text_artifacts() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(wordy_page("Mirror Me", &[]));
        })
        .await;

    let (_dir, store) = scratch_store().await;
    let mirror_dir = tempdir().unwrap();
    let options = CrawlerOptions {
        request_delay: Duration::ZERO,
        mirror_dir: Some(mirror_dir.path().to_path_buf()),
        ..CrawlerOptions::default()
    };
    let crawler = Crawler::new(store, options).unwrap();
    let seed: Url = server.url("/").parse().unwrap();

    let report = crawler.crawl(&seed, 0, 10).await.unwrap();
    assert_eq!(report.pages_saved, 1);

    let host_dirs: Vec<_> = std::fs::read_dir(mirror_dir.path())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(host_dirs.len(), 1);
    let artifacts: Vec<_> = std::fs::read_dir(host_dirs[0].path())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(artifacts.len(), 1);
    let contents = std::fs::read_to_string(artifacts[0].path()).unwrap();
    assert!(contents.starts_with("URL: "));
    assert!(contents.contains("word0"));
}
