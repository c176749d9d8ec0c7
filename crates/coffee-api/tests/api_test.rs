//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

use coffee_api::{AppState, build_router};
use coffee_core::config::AppConfig;
use coffee_database::migration::run_migrations;
use coffee_database::{dispose_connection, get_connection};
use coffee_entity::listing::{ArticleKind, NewListing};
use coffee_worker::{DatabaseLifecycle, PoolOptions, WorkerPool};

struct TestApp {
    _dir: tempfile::TempDir,
    pool: WorkerPool,
    router: Router,
}

async fn test_app(base_path: &str) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let toml = format!(
        r#"
        [server]
        base_path = "{base_path}"

        [database]
        url = "sqlite://{}"

        [worker]
        max_workers = 2
        "#,
        dir.path().join("coffee.sqlite").display()
    );
    let config = AppConfig::from_toml_str(&toml).unwrap();

    let (engine, mut conn, metadata) = get_connection(&config.database).await.unwrap();
    run_migrations(&mut conn).await.unwrap();
    dispose_connection(engine, conn, metadata).await.unwrap();

    let pool = WorkerPool::start(
        PoolOptions {
            shutdown_grace: Duration::from_secs(2),
            ..PoolOptions::from(&config.worker)
        },
        Arc::new(DatabaseLifecycle::new(config.database.clone())),
    )
    .await
    .unwrap();

    let router = build_router(AppState::new(Arc::new(config), pool.clone()));
    TestApp {
        _dir: dir,
        pool,
        router,
    }
}

fn listing(date: NaiveDate, serial: i64, id: &str) -> NewListing {
    NewListing {
        utctime: Utc.with_ymd_and_hms(2024, 6, 5, 1, 0, 0).unwrap(),
        utcdate: date,
        day_serial: serial,
        title: format!("Paper {id}"),
        kind: ArticleKind::Astronomy,
        arxiv_id: id.to_string(),
        authors: vec!["A. Author".to_string()],
        comments: None,
        abstract_text: Some("Abstract.".to_string()),
        link: None,
        pdf: None,
        local_authors: false,
    }
}

async fn seed(pool: &WorkerPool) {
    let monday = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let tuesday = NaiveDate::from_ymd_opt(2024, 6, 4).unwrap();
    let listings = vec![
        listing(monday, 1, "2406.00001"),
        listing(tuesday, 1, "2406.00002"),
        listing(tuesday, 2, "2406.00003"),
    ];
    pool.submit_fn("seed", move |ctx| {
        Box::pin(async move {
            ctx.listings()?.insert_new(&listings).await?;
            ctx.authors()?
                .add("Waqas Bhatti", Some("wb@example.edu"), Some("Astrophysics"))
                .await?;
            Ok(())
        })
    })
    .unwrap()
    .await
    .unwrap();
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_reports_pool() {
    let app = test_app("/astro-coffee").await;

    let (status, body) = get(&app.router, "/astro-coffee/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["pool"]["max_workers"], 2);
    assert_eq!(body["data"]["pool"]["alive"], 2);

    let (status, _) = get(&app.router, "/api/health").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.pool.shutdown().await;
}

#[tokio::test]
async fn test_papers_routes() {
    let app = test_app("/astro-coffee").await;
    seed(&app.pool).await;

    let (status, body) = get(&app.router, "/astro-coffee/papers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["date"], "2024-06-04");
    assert_eq!(body["data"][0]["papers"], 2);
    assert_eq!(body["data"][1]["date"], "2024-06-03");

    let (status, body) = get(&app.router, "/astro-coffee/papers/today").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["date"], "2024-06-04");
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["other"][0]["arxiv_id"], "2406.00002");
    assert_eq!(body["data"]["other"][0]["abstract"], "Abstract.");
    assert_eq!(body["data"]["local"], serde_json::json!([]));

    let (status, body) = get(&app.router, "/astro-coffee/papers/2024-06-03").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 1);

    let (status, body) = get(&app.router, "/astro-coffee/papers/2001-01-01").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 0);

    let (status, body) = get(&app.router, "/astro-coffee/papers/June-3rd").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    app.pool.shutdown().await;
}

#[tokio::test]
async fn test_vote_and_reserve_routes() {
    let app = test_app("").await;
    seed(&app.pool).await;

    let vote = |user: &str, vote: &str| {
        serde_json::json!({ "arxiv_id": "2406.00003", "user": user, "vote": vote })
    };
    let (status, body) = post(&app.router, "/api/vote", vote("alice", "up")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["nvotes"], 1);
    let (_, body) = post(&app.router, "/api/vote", vote("alice", "up")).await;
    assert_eq!(body["data"]["nvotes"], 1);
    let (_, body) = post(&app.router, "/api/vote", vote("bob", "up")).await;
    assert_eq!(body["data"]["nvotes"], 2);

    let (status, body) = get(&app.router, "/papers/today").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["voted"][0]["arxiv_id"], "2406.00003");
    assert_eq!(body["data"]["voted"][0]["voters"], "alice,bob");
    assert_eq!(body["data"]["other"][0]["arxiv_id"], "2406.00002");
    assert_eq!(body["data"]["count"], 2);

    let (status, body) = get(&app.router, "/papers/2024-06-04/votes?user=alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!(["2406.00003"]));

    let reserve = serde_json::json!({ "arxiv_id": "2406.00002", "user": "carol", "action": "add" });
    let (status, body) = post(&app.router, "/api/reserve", reserve).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["roster"], "reservers");
    assert_eq!(body["data"]["names"], serde_json::json!(["carol"]));

    let present = serde_json::json!({ "arxiv_id": "2406.00002", "user": "dave", "action": "add" });
    let (_, body) = post(&app.router, "/api/present", present).await;
    assert_eq!(body["data"]["names"], serde_json::json!(["dave"]));

    let (status, body) = post(&app.router, "/api/vote", serde_json::json!({
        "arxiv_id": "2406.99999", "user": "alice", "vote": "up"
    }))
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let (status, body) = post(&app.router, "/api/vote", vote("a,b", "up")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    app.pool.shutdown().await;
}

#[tokio::test]
async fn test_crosslists_are_opt_in() {
    let app = test_app("").await;
    let day = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
    let listings = vec![
        listing(day, 1, "2406.00010"),
        NewListing {
            kind: ArticleKind::Crosslist,
            ..listing(day, 2, "2406.00011")
        },
    ];
    app.pool
        .submit_fn("seed-crosslists", move |ctx| {
            Box::pin(async move { ctx.listings()?.insert_new(&listings).await.map(|_| ()) })
        })
        .unwrap()
        .await
        .unwrap();

    let (_, body) = get(&app.router, "/papers").await;
    assert_eq!(body["data"][0]["papers"], 1);

    let (_, body) = get(&app.router, "/papers/2024-06-05").await;
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = get(&app.router, "/papers/2024-06-05?crosslists=true").await;
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["other"][1]["article_type"], "crosslist");

    app.pool.shutdown().await;
}

#[tokio::test]
async fn test_local_authors_hide_email() {
    let app = test_app("").await;
    seed(&app.pool).await;

    let (status, body) = get(&app.router, "/local-authors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["author"], "Waqas Bhatti");
    assert_eq!(body["data"][0]["affiliation"], "Astrophysics");
    assert!(body["data"][0].get("email").is_none());

    app.pool.shutdown().await;
}

#[tokio::test]
async fn test_today_before_first_ingest() {
    let app = test_app("").await;

    let (status, body) = get(&app.router, "/papers/today").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["date"].is_null());
    assert_eq!(body["data"]["count"], 0);

    app.pool.shutdown().await;
}

#[tokio::test]
async fn test_closed_pool_maps_to_service_unavailable() {
    let app = test_app("").await;
    app.pool.shutdown().await;

    let (status, body) = get(&app.router, "/papers").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "SERVICE_UNAVAILABLE");

    let (_, body) = get(&app.router, "/api/health").await;
    assert_eq!(body["data"]["status"], "degraded");
}
