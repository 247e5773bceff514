//! Mock backend built on wiremock

use publista_client::Config;
use publista_client::client::CSRF_PATH;
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Start a server that hands out CSRF tokens and presigned URLs and accepts storage PUTs
pub async fn start_backend() -> MockServer {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path(CSRF_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"csrfToken": "csrf-1"}})),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/upload/presigned-url"))
        .respond_with(move |req: &Request| {
            let body: Value = req.body_json().unwrap_or(Value::Null);
            let name = body["fileName"].as_str().unwrap_or("unnamed").to_string();
            ResponseTemplate::new(200).set_body_json(json!({"data": {
                "presignedUrl": format!("{uri}/storage/{name}"),
                "fileKey": format!("uploads/{name}"),
            }}))
        })
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/storage/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    server
}

/// Config pointing at `server` with fast polling and no external tools
pub fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.polling.interval = Duration::from_millis(50);
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.jitter = false;
    config.tools.search_path = false;
    config
}

/// Wire form of one publish job
pub fn job_json(id: &str, platform: &str, status: &str) -> Value {
    json!({
        "id": id,
        "platform": platform,
        "status": status,
        "publishedUrl": (status == "published").then(|| format!("https://{platform}.example/p/{id}")),
        "errorMessage": (status == "failed").then_some("Token expired"),
        "attemptCount": 1,
        "publishedAt": null,
        "createdAt": "2026-10-01T12:00:00Z"
    })
}
