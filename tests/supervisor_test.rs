//! Startup and teardown of the whole server process.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::oneshot;

use astrocoffee::Supervisor;
use coffee_core::config::AppConfig;
use coffee_core::result::AppResult;
use coffee_entity::listing::{ArticleKind, NewListing};
use coffee_worker::source::ListingSource;

/// Pool grace used by every test; teardown must finish shortly after it.
const POOL_GRACE: Duration = Duration::from_secs(1);
const TEARDOWN_BOUND: Duration = Duration::from_secs(4);

#[derive(Debug)]
struct SlowSource {
    delay: Duration,
}

#[async_trait]
impl ListingSource for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    async fn fetch_since(&self, _watermark: Option<NaiveDate>) -> AppResult<Vec<NewListing>> {
        tokio::time::sleep(self.delay).await;
        let date = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
        Ok(vec![NewListing {
            utctime: Utc.with_ymd_and_hms(2024, 6, 5, 1, 0, 0).unwrap(),
            utcdate: date,
            day_serial: 1,
            title: "Paper".to_string(),
            kind: ArticleKind::Astronomy,
            arxiv_id: "2406.00001".to_string(),
            authors: vec!["A. Author".to_string()],
            comments: None,
            abstract_text: None,
            link: None,
            pdf: None,
            local_authors: false,
        }])
    }
}

fn config(dir: &tempfile::TempDir, max_workers: usize) -> AppConfig {
    AppConfig::from_toml_str(&format!(
        r#"
        [server]
        port = 0
        port_attempts = 1
        base_path = ""
        shutdown_grace_seconds = 0

        [database]
        url = "sqlite://{}"

        [worker]
        max_workers = {max_workers}
        shutdown_grace_seconds = {}
        "#,
        dir.path().join("coffee.sqlite").display(),
        POOL_GRACE.as_secs()
    ))
    .unwrap()
}

fn trigger() -> (oneshot::Sender<()>, impl Future<Output = ()> + Send + 'static) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, async move {
        let _ = rx.await;
    })
}

async fn wait_until(condition: impl Fn() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "condition not reached in time");
}

#[tokio::test]
async fn test_shutdown_during_startup_ingest_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let source: Arc<dyn ListingSource> = Arc::new(SlowSource {
        delay: Duration::from_secs(30),
    });
    let supervisor = Supervisor::start(config(&dir, 2), Some(source)).await.unwrap();

    let (stop, shutdown) = trigger();
    let running = tokio::spawn(supervisor.run(shutdown));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let requested = Instant::now();
    stop.send(()).unwrap();

    running.await.unwrap().unwrap();
    let elapsed = requested.elapsed();
    assert!(elapsed < TEARDOWN_BOUND, "teardown took {elapsed:?}");
}

#[tokio::test]
async fn test_request_waiting_on_pool_does_not_hold_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Supervisor::start(config(&dir, 1), None).await.unwrap();
    let url = format!("http://{}/papers", supervisor.local_addr());
    let pool = supervisor.pool().clone();

    // Occupy the only worker so the request below has to queue.
    let long = pool
        .submit_fn("long", |_ctx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
        })
        .unwrap();
    wait_until(|| pool.stats().busy == 1).await;

    let (stop, shutdown) = trigger();
    let running = tokio::spawn(supervisor.run(shutdown));
    let request = tokio::spawn(async move { reqwest::get(url).await.map(|r| r.status()) });
    wait_until(|| pool.stats().queued == 1).await;

    let requested = Instant::now();
    stop.send(()).unwrap();
    running.await.unwrap().unwrap();
    let elapsed = requested.elapsed();
    assert!(elapsed < TEARDOWN_BOUND, "teardown took {elapsed:?}");

    // The in-flight task was aborted and the queued request refused.
    assert!(long.await.is_err());
    // A dropped connection is also acceptable; a success is not.
    if let Ok(status) = request.await.unwrap() {
        assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);
    }
}

#[tokio::test]
async fn test_startup_ingest_runs_before_serving() {
    let dir = tempfile::tempdir().unwrap();
    let source: Arc<dyn ListingSource> = Arc::new(SlowSource {
        delay: Duration::from_millis(50),
    });
    let supervisor = Supervisor::start(config(&dir, 2), Some(source)).await.unwrap();
    let url = format!("http://{}/papers/today", supervisor.local_addr());

    let (stop, shutdown) = trigger();
    let running = tokio::spawn(supervisor.run(shutdown));

    // Connections queue in the backlog until the listener is served.
    let text = reqwest::get(url).await.unwrap().text().await.unwrap();
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["data"]["date"], "2024-06-05");
    assert_eq!(body["data"]["other"][0]["arxiv_id"], "2406.00001");

    stop.send(()).unwrap();
    running.await.unwrap().unwrap();
}
