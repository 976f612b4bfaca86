//! End-to-end crawl runs

use crate::{hits, mount_get, recipe_page, test_config, urlset, SiteOptions};
use ladle::crawler::EndReason;
use ladle::sink::MemorySink;
use ladle::storage::{SqliteStorage, Storage};
use ladle::{CrawlTarget, Crawler, FailureKind, LadleError, TaskStatus};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

fn xml(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "application/xml")
}

#[tokio::test]
async fn test_single_recipe_end_to_end() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(&server, "/sitemap.xml", xml(urlset(&server, &["/recipes/test-stew"]))).await;
    mount_get(&server, "/recipes/test-stew", html(recipe_page("Test Stew"))).await;

    let sink = Arc::new(MemorySink::new());
    let crawler = Crawler::new(test_config(&server, &dir, SiteOptions::default()), sink.clone())
        .unwrap();
    let summary = crawler
        .run(CrawlTarget::All, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.end_reason, EndReason::Drained);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.abandoned, 0);
    assert_eq!(summary.pending_left, 0);

    let recipes = sink.recipes();
    assert_eq!(recipes.len(), 1);
    let recipe = &recipes[0];
    assert_eq!(recipe.title, "Test Stew");
    assert_eq!(recipe.source_url, format!("{}/recipes/test-stew", server.uri()));
    assert_eq!(recipe.servings, Some(4));
    assert_eq!(recipe.total_time_minutes, Some(30));
    assert_eq!(recipe.ingredients.len(), 2);
    assert_eq!(recipe.ingredients[0].amount, "2");
    assert_eq!(recipe.ingredients[0].unit, "cups");
    assert_eq!(recipe.ingredients[0].name, "broth");
    assert_eq!(recipe.steps.len(), 2);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(&server, "/sitemap.xml", xml(urlset(&server, &["/recipes/flaky"]))).await;
    Mock::given(method("GET"))
        .and(path("/recipes/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    mount_get(&server, "/recipes/flaky", html(recipe_page("Flaky Soup"))).await;

    let sink = Arc::new(MemorySink::new());
    let crawler = Crawler::new(test_config(&server, &dir, SiteOptions::default()), sink.clone())
        .unwrap();
    let summary = crawler
        .run(CrawlTarget::All, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.end_reason, EndReason::Drained);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.abandoned, 0);
    assert_eq!(hits(&server, "/recipes/flaky").await, 4);
    assert_eq!(sink.recipes()[0].title, "Flaky Soup");
}

#[tokio::test]
async fn test_retry_limit_exhausted() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(&server, "/sitemap.xml", xml(urlset(&server, &["/recipes/down"]))).await;
    mount_get(&server, "/recipes/down", ResponseTemplate::new(500)).await;

    let options = SiteOptions {
        retry_limit: 2,
        ..SiteOptions::default()
    };
    let sink = Arc::new(MemorySink::new());
    let crawler = Crawler::new(test_config(&server, &dir, options), sink.clone()).unwrap();
    let summary = crawler
        .run(CrawlTarget::All, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.done, 0);
    assert_eq!(summary.abandoned, 1);
    assert_eq!(hits(&server, "/recipes/down").await, 3);
    assert_eq!(summary.abandoned_urls[0].kind, FailureKind::Http5xx);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_not_found_is_abandoned_without_retry() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(
        &server,
        "/sitemap.xml",
        xml(urlset(&server, &["/recipes/gone", "/recipes/test-stew"])),
    )
    .await;
    mount_get(&server, "/recipes/gone", ResponseTemplate::new(404)).await;
    mount_get(&server, "/recipes/test-stew", html(recipe_page("Test Stew"))).await;

    let config = test_config(&server, &dir, SiteOptions::default());
    let db_path = config.output.database_path.clone();
    let sink = Arc::new(MemorySink::new());
    let summary = Crawler::new(config, sink.clone())
        .unwrap()
        .run(CrawlTarget::All, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.done, 1);
    assert_eq!(summary.abandoned, 1);
    assert_eq!(hits(&server, "/recipes/gone").await, 1);

    let abandoned = &summary.abandoned_urls[0];
    assert_eq!(abandoned.url, format!("{}/recipes/gone", server.uri()));
    assert_eq!(abandoned.kind, FailureKind::Http4xx);

    let storage = SqliteStorage::new(Path::new(&db_path)).unwrap();
    let log = storage.load_abandoned().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].kind, FailureKind::Http4xx);
    assert_eq!(storage.count_tasks_by_status(TaskStatus::Done).unwrap(), 1);
    let gone = storage.load_tasks(&[TaskStatus::Abandoned]).unwrap();
    assert_eq!(gone.len(), 1);
    assert_eq!(gone[0].attempt, 1);
}

#[tokio::test]
async fn test_page_without_recipe_data_is_abandoned() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(&server, "/sitemap.xml", xml(urlset(&server, &["/recipes/about"]))).await;
    mount_get(
        &server,
        "/recipes/about",
        html("<html><body><p>About us</p></body></html>".to_string()),
    )
    .await;

    let sink = Arc::new(MemorySink::new());
    let summary = Crawler::new(test_config(&server, &dir, SiteOptions::default()), sink)
        .unwrap()
        .run(CrawlTarget::All, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.abandoned, 1);
    assert_eq!(summary.abandoned_urls[0].kind, FailureKind::Parse);
    assert_eq!(hits(&server, "/recipes/about").await, 1);
}

#[tokio::test]
async fn test_nested_sitemaps_and_robots() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /recipes/private\n"),
    )
    .await;
    mount_get(
        &server,
        "/sitemap-index.xml",
        xml(format!(
            r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
<sitemap><loc>{0}/sitemap-a.xml</loc></sitemap>
<sitemap><loc>{0}/sitemap-b.xml</loc></sitemap>
</sitemapindex>"#,
            server.uri()
        )),
    )
    .await;
    mount_get(
        &server,
        "/sitemap-a.xml",
        xml(urlset(&server, &["/recipes/a", "/about", "/recipes/private-pie"])),
    )
    .await;
    // Same recipe listed twice, once with a tracking parameter
    mount_get(
        &server,
        "/sitemap-b.xml",
        xml(urlset(&server, &["/recipes/b", "/recipes/a?utm_source=feed"])),
    )
    .await;
    mount_get(&server, "/recipes/a", html(recipe_page("Recipe A"))).await;
    mount_get(&server, "/recipes/b", html(recipe_page("Recipe B"))).await;

    let options = SiteOptions {
        respect_robots: true,
        sitemap_path: "/sitemap-index.xml",
        ..SiteOptions::default()
    };
    let sink = Arc::new(MemorySink::new());
    let summary = Crawler::new(test_config(&server, &dir, options), sink.clone())
        .unwrap()
        .run(CrawlTarget::All, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.end_reason, EndReason::Drained);
    assert_eq!(summary.done, 2);
    assert!(summary.skipped_sites.is_empty());
    assert_eq!(hits(&server, "/recipes/private-pie").await, 0);
    assert_eq!(hits(&server, "/about").await, 0);
    assert_eq!(hits(&server, "/recipes/a").await, 1);

    let mut titles: Vec<_> = sink.recipes().into_iter().map(|r| r.title).collect();
    titles.sort();
    assert_eq!(titles, vec!["Recipe A", "Recipe B"]);
}

#[tokio::test]
async fn test_unavailable_sitemap_skips_site() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(&server, "/sitemap.xml", ResponseTemplate::new(500)).await;

    let sink = Arc::new(MemorySink::new());
    let summary = Crawler::new(test_config(&server, &dir, SiteOptions::default()), sink)
        .unwrap()
        .run(CrawlTarget::All, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.end_reason, EndReason::Drained);
    assert_eq!(summary.done, 0);
    assert_eq!(summary.skipped_sites.len(), 1);
    assert_eq!(summary.skipped_sites[0].domain, "127.0.0.1");
}

#[tokio::test]
async fn test_unknown_domain() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let sink = Arc::new(MemorySink::new());
    let result = Crawler::new(test_config(&server, &dir, SiteOptions::default()), sink)
        .unwrap()
        .run(
            CrawlTarget::Site("unknown.example".to_string()),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(LadleError::UnknownDomain(d)) if d == "unknown.example"));
}

#[tokio::test]
async fn test_second_run_does_not_refetch_done_urls() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(&server, "/sitemap.xml", xml(urlset(&server, &["/recipes/test-stew"]))).await;
    mount_get(&server, "/recipes/test-stew", html(recipe_page("Test Stew"))).await;

    let sink = Arc::new(MemorySink::new());
    for _ in 0..2 {
        Crawler::new(test_config(&server, &dir, SiteOptions::default()), sink.clone())
            .unwrap()
            .run(CrawlTarget::Site("127.0.0.1".to_string()), CancellationToken::new())
            .await
            .unwrap();
    }

    assert_eq!(hits(&server, "/recipes/test-stew").await, 1);
    assert_eq!(hits(&server, "/sitemap.xml").await, 2);
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn test_cancellation_leaves_work_pending() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(&server, "/sitemap.xml", xml(urlset(&server, &["/recipes/slow"]))).await;
    mount_get(
        &server,
        "/recipes/slow",
        html(recipe_page("Slow Roast")).set_delay(Duration::from_secs(5)),
    )
    .await;

    let options = SiteOptions {
        fetch_timeout_ms: 2000,
        ..SiteOptions::default()
    };
    let config = test_config(&server, &dir, options);
    let db_path = config.output.database_path.clone();
    let sink = Arc::new(MemorySink::new());
    let crawler = Crawler::new(config, sink.clone()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let summary = crawler.run(CrawlTarget::All, cancel).await.unwrap();

    assert_eq!(summary.end_reason, EndReason::Cancelled);
    assert_eq!(summary.done, 0);
    assert_eq!(summary.abandoned, 0);
    assert_eq!(summary.pending_left, 1);
    assert!(summary.duration_ms < 2000);
    assert!(sink.is_empty());

    // The interrupted task went back to Pending without using up an attempt
    let storage = SqliteStorage::new(Path::new(&db_path)).unwrap();
    let pending = storage.load_tasks(&[TaskStatus::Pending]).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempt, 1);
}

#[tokio::test]
async fn test_stall_leaves_work_pending() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_get(
        &server,
        "/sitemap.xml",
        xml(urlset(&server, &["/recipes/first", "/recipes/second"])),
    )
    .await;
    mount_get(&server, "/recipes/first", html(recipe_page("First Soup"))).await;
    mount_get(&server, "/recipes/second", html(recipe_page("Second Soup"))).await;

    // The delay gate holds the second page well past the 3s stall timeout
    let options = SiteOptions {
        request_delay_ms: 10_000,
        ..SiteOptions::default()
    };
    let config = test_config(&server, &dir, options);
    let db_path = config.output.database_path.clone();
    let sink = Arc::new(MemorySink::new());
    let crawler = Crawler::new(config, sink.clone()).unwrap();

    let summary = crawler
        .run(CrawlTarget::All, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.end_reason, EndReason::Stalled);
    assert_eq!(summary.done, 1);
    assert_eq!(summary.abandoned, 0);
    assert_eq!(summary.pending_left, 1);
    assert!(summary.duration_ms < 10_000);
    assert_eq!(sink.len(), 1);
    assert_eq!(hits(&server, "/recipes/first").await, 1);
    assert_eq!(hits(&server, "/recipes/second").await, 0);

    let storage = SqliteStorage::new(Path::new(&db_path)).unwrap();
    let pending = storage.load_tasks(&[TaskStatus::Pending]).unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].url.ends_with("/recipes/second"));
    assert_eq!(pending[0].attempt, 1);
}
