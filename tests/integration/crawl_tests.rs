//! Integration tests for the crawl engine
//!
//! These tests drive full sessions through `CrawlController`: against a
//! wiremock site with the real HTTP extractor, and against synthetic link
//! graphs with controllable delays and failures.

use async_trait::async_trait;
use pagewalk::config::Config;
use pagewalk::extractor::{ContentExtractor, ExtractError, ExtractedPage, HttpExtractor, PageRequest};
use pagewalk::lock::{ClaimError, FileLockBackend, LockRecoveryManager, StoreBackend};
use pagewalk::storage::{FrontierStore, StorageResult};
use pagewalk::{CrawlController, CrawlEvent, CrawlRequest, PagewalkError, ProgressPublisher, SessionState};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITE: &str = "https://site.test";

/// Creates a test configuration storing frontiers under `store_dir`
fn create_test_config(store_dir: &Path, max_pages: usize, max_concurrency: usize) -> Config {
    let mut config = Config::default();
    config.crawler.max_pages = max_pages;
    config.crawler.max_concurrency = max_concurrency;
    config.crawler.navigation_timeout_secs = 1;
    config.crawler.handler_timeout_secs = 1;
    config.lock.max_retries = 5;
    config.lock.retry_backoff_ms = 5;
    config.store.directory = store_dir.to_path_buf();
    config.user_agent.crawler_name = "TestBot".to_string();
    config
}

fn controller_with(
    config: Config,
    extractor: Arc<dyn ContentExtractor>,
    backend: Arc<dyn StoreBackend>,
) -> CrawlController {
    let locks = Arc::new(LockRecoveryManager::from_config(backend, &config.lock));
    CrawlController::new(config, extractor, locks)
}

fn file_backend(dir: &Path) -> Arc<dyn StoreBackend> {
    Arc::new(FileLockBackend::new(dir, Duration::from_secs(600)))
}

fn page_url(id: usize) -> String {
    format!("{}/p{}", SITE, id)
}

/// Extractor serving a synthetic link graph
#[derive(Default)]
struct SyntheticSite {
    links: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    fatal: HashSet<String>,
    slow: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<HashMap<String, usize>>,
}

impl SyntheticSite {
    fn from_edges(edges: &[Vec<usize>]) -> Self {
        let links = edges
            .iter()
            .enumerate()
            .map(|(from, targets)| (page_url(from), targets.iter().map(|&t| page_url(t)).collect()))
            .collect();
        Self {
            links,
            ..Self::default()
        }
    }

    /// Every page links to every other page
    fn complete(pages: usize) -> Self {
        let edges: Vec<Vec<usize>> = (0..pages)
            .map(|from| (0..pages).filter(|&to| to != from).collect())
            .collect();
        Self::from_edges(&edges)
    }

    fn calls(&self) -> HashMap<String, usize> {
        self.calls.lock().unwrap().clone()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ContentExtractor for SyntheticSite {
    async fn launch(&self) -> Result<(), ExtractError> {
        Ok(())
    }

    async fn extract(&self, request: PageRequest) -> Result<ExtractedPage, ExtractError> {
        let url = request.url.to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_insert(0) += 1;

        if let Some(delay) = self.delays.get(&url) {
            tokio::time::sleep(*delay).await;
        }
        if self.slow.contains(&url) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.fatal.contains(&url) {
            return Err(ExtractError::Unavailable("browser crashed".to_string()));
        }
        if self.failing.contains(&url) {
            return Err(ExtractError::Navigation("connection reset".to_string()));
        }

        match self.links.get(&url) {
            Some(links) => Ok(ExtractedPage {
                links: links.clone(),
                ..ExtractedPage::default()
            }),
            None => Err(ExtractError::HttpStatus(404)),
        }
    }
}

/// Backend that reports the partition locked for every claim
struct NeverReleased {
    inner: FileLockBackend,
    claims: AtomicU32,
}

impl StoreBackend for NeverReleased {
    fn lock_path(&self, partition: &str) -> PathBuf {
        self.inner.lock_path(partition)
    }

    fn try_claim(&self, partition: &str) -> Result<Box<dyn FrontierStore>, ClaimError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Err(ClaimError::Locked {
            path: self.lock_path(partition),
        })
    }

    fn sweep_stale_locks(&self) -> StorageResult<usize> {
        self.inner.sweep_stale_locks()
    }

    fn force_unlock(&self, lock_path: &Path) -> StorageResult<bool> {
        self.inner.force_unlock(lock_path)
    }

    fn release(&self, lock_path: &Path) -> StorageResult<()> {
        self.inner.release(lock_path)
    }
}

/// Backend where a crashed process left the partition's lock behind
struct CrashedPredecessor {
    inner: FileLockBackend,
    planted: Mutex<bool>,
    claims: AtomicU32,
}

impl StoreBackend for CrashedPredecessor {
    fn lock_path(&self, partition: &str) -> PathBuf {
        self.inner.lock_path(partition)
    }

    fn try_claim(&self, partition: &str) -> Result<Box<dyn FrontierStore>, ClaimError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        let mut planted = self.planted.lock().unwrap();
        if !*planted {
            *planted = true;
            std::fs::create_dir_all(self.inner.directory()).unwrap();
            std::fs::write(
                self.lock_path(partition),
                format!(
                    "pid={}\nacquired_at={}\n",
                    std::process::id().wrapping_add(1),
                    chrono::Utc::now().to_rfc3339()
                ),
            )
            .unwrap();
        }
        self.inner.try_claim(partition)
    }

    fn sweep_stale_locks(&self) -> StorageResult<usize> {
        self.inner.sweep_stale_locks()
    }

    fn force_unlock(&self, lock_path: &Path) -> StorageResult<bool> {
        self.inner.force_unlock(lock_path)
    }

    fn release(&self, lock_path: &Path) -> StorageResult<()> {
        self.inner.release(lock_path)
    }
}

async fn run_collecting(
    controller: &CrawlController,
    url: &str,
) -> (Result<pagewalk::CrawlOutcome, PagewalkError>, Vec<CrawlEvent>) {
    let (publisher, mut receiver) = ProgressPublisher::channel();
    let result = controller.run(CrawlRequest::new(url), publisher).await;

    let mut events = Vec::new();
    while let Some(event) = receiver.recv().await {
        events.push(event);
    }
    (result, events)
}

/// URLs with a per-page terminal event, with their counts
fn terminal_counts(events: &[CrawlEvent]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for event in events {
        match event {
            CrawlEvent::PageDone { url, .. } | CrawlEvent::PageFailed { url, .. } => {
                *counts.entry(url.clone()).or_insert(0) += 1;
            }
            _ => {}
        }
    }
    counts
}

fn assert_one_terminal_per_visit(visited: &[String], events: &[CrawlEvent]) {
    let counts = terminal_counts(events);
    assert_eq!(counts.len(), visited.len());
    for url in visited {
        assert_eq!(counts.get(url), Some(&1), "terminal events for {}", url);
    }
}

fn reachable(edges: &[Vec<usize>]) -> BTreeSet<String> {
    let mut seen = HashSet::from([0usize]);
    let mut queue = VecDeque::from([0usize]);
    while let Some(node) = queue.pop_front() {
        for &next in &edges[node] {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen.into_iter().map(page_url).collect()
}

fn store_dir_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html")
}

#[tokio::test]
async fn test_full_crawl_over_http() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<html><head><title>Home</title></head><body>
            <h1>Welcome</h1><p>Start here.</p>
            <a href="/guide">Guide</a>
            <a href="{}/missing">Missing</a>
            <a href="https://elsewhere.example/x">Elsewhere</a>
            <a href="mailto:team@example.com">Mail</a>
            </body></html>"#,
            base_url
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/guide"))
        .respond_with(html(
            r#"<html><body>
            <h2>Install</h2><pre>cargo install pagewalk</pre>
            <a href="/">Home</a><a href="/guide#usage">Usage</a>
            </body></html>"#
                .to_string(),
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), 50, 4);
    let extractor = Arc::new(HttpExtractor::new(config.user_agent.clone()));
    let controller = controller_with(config, extractor, file_backend(dir.path()));

    let (result, events) = run_collecting(&controller, &format!("{}/", base_url)).await;
    let outcome = result.unwrap();

    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(outcome.visited.len(), 3);
    assert_eq!(outcome.pages.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].url, format!("{}/missing", base_url));

    let guide = outcome
        .pages
        .iter()
        .find(|p| p.url.ends_with("/guide"))
        .unwrap();
    assert_eq!(guide.sections[0].title, "Install");
    assert_eq!(guide.sections[0].content[0].text, "cargo install pagewalk");

    assert_one_terminal_per_visit(&outcome.visited, &events);
    match events.last() {
        Some(CrawlEvent::SessionDone {
            state,
            pages,
            failures,
        }) => {
            assert_eq!(*state, SessionState::Completed);
            assert_eq!(pages, &outcome.pages);
            assert_eq!(failures, &outcome.failures);
        }
        other => panic!("unexpected final event: {:?}", other),
    }

    // Lock released and the finished partition's store retired
    assert!(store_dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_redirect_off_origin_is_not_extracted() {
    let site = MockServer::start().await;
    let elsewhere = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><body><h1>Home</h1><a href="/moved">Moved</a></body></html>"#.to_string(),
        ))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/secret", elsewhere.uri()).as_str()),
        )
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .respond_with(html(
            r#"<html><body><h1>Offsite</h1><p>foreign content</p></body></html>"#.to_string(),
        ))
        .expect(0)
        .mount(&elsewhere)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), 10, 2);
    let extractor = Arc::new(HttpExtractor::new(config.user_agent.clone()));
    let controller = controller_with(config, extractor, file_backend(dir.path()));

    let (result, events) = run_collecting(&controller, &format!("{}/", site.uri())).await;
    let outcome = result.unwrap();

    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(outcome.pages[0].sections[0].title, "Home");
    assert!(outcome
        .pages
        .iter()
        .flat_map(|p| &p.sections)
        .all(|section| section.title != "Offsite"));

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].url, format!("{}/moved", site.uri()));
    assert!(outcome.failures[0].reason.contains("out of scope"));
    assert_one_terminal_per_visit(&outcome.visited, &events);
    elsewhere.verify().await;
}

#[tokio::test]
async fn test_same_origin_redirect_visits_target_once() {
    let site = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><body><a href="/old">Old</a><a href="/new">New</a></body></html>"#
                .to_string(),
        ))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html(r#"<html><body><h1>New</h1></body></html>"#.to_string()))
        .mount(&site)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), 10, 1);
    let extractor = Arc::new(HttpExtractor::new(config.user_agent.clone()));
    let controller = controller_with(config, extractor, file_backend(dir.path()));

    let (result, events) = run_collecting(&controller, &format!("{}/", site.uri())).await;
    let outcome = result.unwrap();

    let new_pages = outcome
        .pages
        .iter()
        .flat_map(|p| &p.sections)
        .filter(|section| section.title == "New")
        .count();
    assert_eq!(new_pages, 1);
    assert_eq!(outcome.pages.len() + outcome.failures.len(), outcome.visited.len());
    assert_one_terminal_per_visit(&outcome.visited, &events);
}

#[tokio::test]
async fn test_markers_from_crashed_runs_are_swept() {
    let dir = tempfile::tempdir().unwrap();
    let abandoned = dir.path().join("session-crashed.lock");
    std::fs::write(
        &abandoned,
        format!(
            "pid={}\nacquired_at={}\n",
            std::process::id().wrapping_add(1),
            (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339()
        ),
    )
    .unwrap();

    let mut config = create_test_config(dir.path(), 10, 2);
    config.lock.stale_after_secs = 60;
    let backend = Arc::new(FileLockBackend::new(dir.path(), config.lock.stale_after()));
    let controller = controller_with(config, Arc::new(SyntheticSite::complete(2)), backend);

    let (result, _) = run_collecting(&controller, &page_url(0)).await;
    assert_eq!(result.unwrap().state, SessionState::Completed);
    assert!(!abandoned.exists());
    assert!(store_dir_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn test_page_limit_stops_ten_page_site() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(SyntheticSite::complete(10));
    let controller = controller_with(
        create_test_config(dir.path(), 3, 4),
        site.clone(),
        file_backend(dir.path()),
    );

    let (result, events) = run_collecting(&controller, &page_url(0)).await;
    let outcome = result.unwrap();

    assert_eq!(outcome.state, SessionState::PageLimitReached);
    assert_eq!(outcome.visited.len(), 3);
    assert_eq!(site.total_calls(), 3);
    assert_one_terminal_per_visit(&outcome.visited, &events);
    match events.last() {
        Some(CrawlEvent::SessionDone { state, pages, .. }) => {
            assert_eq!(*state, SessionState::PageLimitReached);
            assert_eq!(pages.len(), 3);
            assert_eq!(pages, &outcome.pages);
        }
        other => panic!("unexpected final event: {:?}", other),
    }
}

#[tokio::test]
async fn test_limit_equal_to_site_size_completes() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(SyntheticSite::complete(3));
    let controller = controller_with(
        create_test_config(dir.path(), 3, 2),
        site,
        file_backend(dir.path()),
    );

    let (result, _) = run_collecting(&controller, &page_url(0)).await;
    assert_eq!(result.unwrap().state, SessionState::Completed);
}

#[tokio::test]
async fn test_rerun_yields_same_visited_set() {
    let dir = tempfile::tempdir().unwrap();
    let edges = vec![vec![1, 2], vec![3], vec![3, 4], vec![0], vec![5, 9], vec![]];
    let site = Arc::new(SyntheticSite::from_edges(&edges));
    let controller = controller_with(
        create_test_config(dir.path(), 100, 3),
        site,
        file_backend(dir.path()),
    );

    let (first, _) = run_collecting(&controller, &page_url(0)).await;
    let (second, _) = run_collecting(&controller, &page_url(0)).await;
    let first = first.unwrap();
    let second = second.unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(first.visited, second.visited);
    // Page 9 is linked but missing
    assert_eq!(first.visited.len(), 7);
    assert_eq!(first.failures.len(), 1);
}

#[tokio::test]
async fn test_per_page_failures_do_not_abort_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut site = SyntheticSite::complete(6);
    site.failing.insert(page_url(1));
    site.slow.insert(page_url(2));
    site.links.remove(&page_url(3));
    let site = Arc::new(site);

    let controller = controller_with(
        create_test_config(dir.path(), 100, 6),
        site,
        file_backend(dir.path()),
    );

    let (result, events) = run_collecting(&controller, &page_url(0)).await;
    let outcome = result.unwrap();

    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(outcome.visited.len(), 6);
    assert_eq!(outcome.pages.len(), 3);
    assert_eq!(outcome.failures.len(), 3);

    let reasons: HashMap<_, _> = outcome
        .failures
        .iter()
        .map(|f| (f.url.clone(), f.reason.clone()))
        .collect();
    assert!(reasons[&page_url(1)].contains("connection reset"));
    assert!(reasons[&page_url(2)].contains("timed out"));
    assert_eq!(reasons[&page_url(3)], "HTTP status 404");

    assert_one_terminal_per_visit(&outcome.visited, &events);
}

#[tokio::test]
async fn test_blocked_seed_rejected_before_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let site = Arc::new(SyntheticSite::complete(2));
    let controller = controller_with(
        create_test_config(dir.path(), 10, 2),
        site.clone(),
        file_backend(dir.path()),
    );

    let (result, events) = run_collecting(&controller, "https://github.com/foo").await;
    let err = result.unwrap_err();

    assert_eq!(err.http_status(), 400);
    assert!(err.to_string().contains("github.com"));
    assert!(events.is_empty());
    assert_eq!(site.total_calls(), 0);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_stale_lock_recovered_within_budget() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(CrashedPredecessor {
        inner: FileLockBackend::new(dir.path(), Duration::from_secs(600)),
        planted: Mutex::new(false),
        claims: AtomicU32::new(0),
    });
    let controller = controller_with(
        create_test_config(dir.path(), 10, 2),
        Arc::new(SyntheticSite::complete(2)),
        backend.clone(),
    );

    let (result, _) = run_collecting(&controller, &page_url(0)).await;
    assert_eq!(result.unwrap().state, SessionState::Completed);
    assert_eq!(backend.claims.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_lock_never_released_fails_session() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(NeverReleased {
        inner: FileLockBackend::new(dir.path(), Duration::from_secs(600)),
        claims: AtomicU32::new(0),
    });
    let site = Arc::new(SyntheticSite::complete(2));
    let controller = controller_with(
        create_test_config(dir.path(), 10, 2),
        site.clone(),
        backend.clone(),
    );

    let (result, events) = run_collecting(&controller, &page_url(0)).await;
    let err = result.unwrap_err();

    assert!(matches!(err, PagewalkError::SessionFailed { .. }));
    assert_eq!(err.http_status(), 500);
    assert_eq!(backend.claims.load(Ordering::SeqCst), 5);
    assert_eq!(site.total_calls(), 0);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], CrawlEvent::SessionFailed { .. }));
}

#[tokio::test]
async fn test_extractor_crash_fails_session_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut site = SyntheticSite::from_edges(&[vec![1], vec![2], vec![]]);
    site.fatal.insert(page_url(1));
    let controller = controller_with(
        create_test_config(dir.path(), 10, 1),
        Arc::new(site),
        file_backend(dir.path()),
    );

    let (result, events) = run_collecting(&controller, &page_url(0)).await;
    let err = result.unwrap_err();
    assert_eq!(err.http_status(), 500);
    assert!(err.to_string().contains("browser crashed"));

    let counts = terminal_counts(&events);
    assert_eq!(counts.len(), 2);
    assert!(counts.values().all(|&c| c == 1));

    let failures = events
        .iter()
        .filter(|e| matches!(e, CrawlEvent::SessionFailed { .. }))
        .count();
    assert_eq!(failures, 1);
    assert!(matches!(events.last(), Some(CrawlEvent::SessionFailed { .. })));
}

#[tokio::test]
async fn test_concurrent_sessions_use_separate_stores() {
    let dir = tempfile::tempdir().unwrap();
    let controller = Arc::new(controller_with(
        create_test_config(dir.path(), 100, 3),
        Arc::new(SyntheticSite::complete(5)),
        file_backend(dir.path()),
    ));

    let a = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .run(CrawlRequest::new(page_url(0)), ProgressPublisher::disabled())
                .await
        })
    };
    let b = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .run(CrawlRequest::new(page_url(0)), ProgressPublisher::disabled())
                .await
        })
    };

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert_eq!(a.visited.len(), 5);
    assert_eq!(b.visited.len(), 5);
    assert_ne!(a.session_id, b.session_id);
}

fn graph_strategy() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<u64>)> {
    (1usize..16).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(0..n, 0..5), n),
            prop::collection::vec(0u64..4, n),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_no_page_processed_twice((edges, delays) in graph_strategy(), workers in 1usize..8) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let mut site = SyntheticSite::from_edges(&edges);
        site.delays = delays
            .iter()
            .enumerate()
            .map(|(id, &ms)| (page_url(id), Duration::from_millis(ms)))
            .collect();
        let site = Arc::new(site);

        let controller = controller_with(
            create_test_config(dir.path(), 1000, workers),
            site.clone(),
            file_backend(dir.path()),
        );

        let (result, events) = runtime.block_on(run_collecting(&controller, &page_url(0)));
        let outcome = result.unwrap();

        prop_assert_eq!(outcome.state, SessionState::Completed);
        prop_assert!(site.calls().values().all(|&c| c == 1));

        let visited: BTreeSet<String> = outcome.visited.iter().cloned().collect();
        prop_assert_eq!(visited.len(), outcome.visited.len());
        prop_assert_eq!(visited, reachable(&edges));

        let counts = terminal_counts(&events);
        prop_assert_eq!(counts.len(), outcome.visited.len());
        prop_assert!(counts.values().all(|&c| c == 1));
    }
}
