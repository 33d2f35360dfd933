mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{app_state, FakeFactory, FakeLlm, FakeStt, FakeTts};
use diwan_server::app;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt; // for oneshot

fn router(dir: &std::path::Path) -> axum::Router {
    app(app_state(
        Arc::new(FakeFactory::default()),
        FakeStt::saying(""),
        FakeLlm::replying(""),
        FakeTts::new(),
        dir,
    ))
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_reports_service_name() {
    let dir = tempfile::tempdir().unwrap();
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let resp = router(dir.path()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "diwan");
}

#[tokio::test]
async fn ui_without_page_is_a_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let req = Request::builder().uri("/ui").body(Body::empty()).unwrap();

    let resp = router(dir.path()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(resp).await.contains("index.html not found"));
}

#[tokio::test]
async fn ui_and_static_assets_are_served() {
    let dir = tempfile::tempdir().unwrap();
    let static_dir = dir.path().join("static");
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(static_dir.join("index.html"), "<h1>ديوان</h1>").unwrap();
    std::fs::write(static_dir.join("app.js"), "console.log('hi');").unwrap();
    let app = router(dir.path());

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/ui").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "<h1>ديوان</h1>");

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/static/app.js")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "console.log('hi');");
}

#[tokio::test]
async fn ws_route_requires_an_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();

    let resp = router(dir.path()).oneshot(req).await.unwrap();
    assert!(resp.status().is_client_error());
}
