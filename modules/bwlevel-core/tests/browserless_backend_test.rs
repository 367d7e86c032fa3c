//! Resolver on the Browserless backend, with Browserless played by a local
//! mock server.

use std::path::Path;
use std::sync::Arc;

use bwlevel_core::render::BrowserlessEngine;
use bwlevel_core::{load_config, FileConfig, Resolution, Resolver};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> FileConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/bwlevel.toml");
    let mut config = load_config(&path).expect("shipped config should load");
    config.resolver.max_attempts = 2;
    config.resolver.retry_delay_ms = 10;
    config
}

async fn mount_version(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/json/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Browser": "HeadlessChrome/121.0.6167.85"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn resolves_level_from_rendered_content() {
    let server = MockServer::start().await;
    mount_version(&server).await;

    Mock::given(method("POST"))
        .and(path("/content"))
        .and(body_partial_json(serde_json::json!({
            "url": "https://25karma.xyz/player/Alice",
            "gotoOptions": { "waitUntil": "domcontentloaded" }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/profile_level.html")),
        )
        .mount(&server)
        .await;

    let engine = Arc::new(BrowserlessEngine::new(&server.uri(), None));
    let resolver = Resolver::from_config(engine, &config());

    assert_eq!(resolver.resolve("Alice").await, Resolution::Numeric(37));
    resolver.shutdown().await;
}

#[tokio::test]
async fn selector_wait_is_pushed_to_browserless() {
    let server = MockServer::start().await;
    mount_version(&server).await;

    // Re-render with waitForSelector: the profile has hydrated by then.
    Mock::given(method("POST"))
        .and(path("/content"))
        .and(body_partial_json(serde_json::json!({ "bestAttempt": true })))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/profile_nicked.html")),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Plain navigation only gets the unhydrated shell.
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/profile_shell.html")),
        )
        .mount(&server)
        .await;

    let engine = Arc::new(BrowserlessEngine::new(&server.uri(), None));
    let resolver = Resolver::from_config(engine, &config());

    assert_eq!(resolver.resolve("Mystery").await, Resolution::Concealed);
}

#[tokio::test]
async fn unreachable_browserless_resolves_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/version"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = Arc::new(BrowserlessEngine::new(&server.uri(), None));
    let resolver = Resolver::from_config(engine, &config());

    assert_eq!(resolver.resolve("Alice").await, Resolution::Unknown);
    assert!(!resolver.sessions().is_launched().await);
    assert!(resolver.cache().is_empty());
}

#[tokio::test]
async fn content_errors_exhaust_retries_to_unknown() {
    let server = MockServer::start().await;
    mount_version(&server).await;

    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(500).set_body_string("browser crashed"))
        .expect(2)
        .mount(&server)
        .await;

    let engine = Arc::new(BrowserlessEngine::new(&server.uri(), None));
    let resolver = Resolver::from_config(engine, &config());

    assert_eq!(resolver.resolve("Alice").await, Resolution::Unknown);
}
