//! End-to-end tests for the reqwest transport against a mock HTTP server.

#![cfg(all(feature = "integration-tests", feature = "reqwest-transport"))]

use std::time::Duration;

use conduit_net::transport::{ReqwestTransport, ReqwestTransportConfig};
use conduit_net::{
    Api, EndpointOperatable, FailureFamily, HttpErrorReason, JsonStrategy, NetworkError,
    NoopLogger, Response,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer) -> Api {
    Api::builder(server.uri())
        .logger(NoopLogger)
        .build()
        .expect("Failed to build api")
}

fn channel() -> (
    impl Fn(Response) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Response>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |response| {
            let _ = tx.send(response);
        },
        rx,
    )
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Response>) -> Response {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("response in time")
        .expect("channel open")
}

#[tokio::test]
async fn test_get_json() {
    #[derive(Debug, Deserialize)]
    struct Repo {
        name: String,
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!([{"name": "conduit"}])),
        )
        .mount(&server)
        .await;

    let api = api_for(&server);
    let (sink, mut rx) = channel();
    api.get("/repos")
        .query("page", 2)
        .on_response(sink)
        .build()
        .send();

    let response = next(&mut rx).await;
    assert!(response.is_success(), "{:?}", response.error);
    assert_eq!(response.status_code, Some(200));
    let repos: Vec<Repo> = response.decode(&JsonStrategy::new()).expect("valid JSON");
    assert_eq!(repos[0].name, "conduit");
    assert_eq!(api.registry().task_count(), 0);
}

#[tokio::test]
async fn test_post_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(body_json(serde_json::json!({"name": "Ada"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server);
    let (sink, mut rx) = channel();
    api.post("/users")
        .json(&serde_json::json!({"name": "Ada"}))
        .expect("serializable body")
        .on_response(sink)
        .build()
        .send();

    assert_eq!(next(&mut rx).await.status_code, Some(201));
}

#[tokio::test]
async fn test_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let (sink, mut rx) = channel();
    api.get("/users/42").on_response(sink).build().send();

    let response = next(&mut rx).await;
    let error = response.error.expect("classified error");
    assert_eq!(error.http_reason(), Some(HttpErrorReason::NotFound));
    assert_eq!(error.response_data().map(|d| d.as_ref()), Some(&b"missing"[..]));
}

#[tokio::test]
async fn test_default_headers_reach_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("x-client", "conduit-tests"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let api = Api::builder(server.uri())
        .default_header("X-Client", "conduit-tests")
        .logger(NoopLogger)
        .build()
        .expect("Failed to build api");
    let (sink, mut rx) = channel();
    api.get("/me").on_response(sink).build().send();

    assert!(next(&mut rx).await.is_success());
}

#[tokio::test]
async fn test_content_type_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html></html>"),
        )
        .mount(&server)
        .await;

    let api = Api::builder(server.uri())
        .default_header("Accept", "application/json")
        .logger(NoopLogger)
        .build()
        .expect("Failed to build api");

    let (sink, mut rx) = channel();
    api.get("/page").on_response(sink).build().send();
    assert!(matches!(
        next(&mut rx).await.error,
        Some(NetworkError::Unexpected { .. })
    ));

    let (sink, mut rx) = channel();
    api.get("/page").validate(false).on_response(sink).build().send();
    assert!(next(&mut rx).await.is_success());
}

#[tokio::test]
async fn test_timeout_is_unavailable_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let (sink, mut rx) = channel();
    api.get("/slow")
        .timeout(Duration::from_millis(100))
        .on_response(sink)
        .build()
        .send();

    let error = next(&mut rx).await.error.expect("timed out");
    assert_eq!(error.family(), Some(FailureFamily::UnavailableNetwork));
}

#[tokio::test]
async fn test_cancel_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let api = api_for(&server);
    let (sink, mut rx) = channel();
    let endpoint = api
        .get("/repos")
        .ignore_result_on_cancel(false)
        .on_response(sink)
        .build();
    endpoint.send();
    assert!(api.registry().contains_path("/repos"));

    assert_eq!(api.cancel_endpoints_with_path("/repos"), 1);
    let response = next(&mut rx).await;
    assert!(response.error.as_ref().is_some_and(NetworkError::is_cancelled));
    assert!(!endpoint.is_in_flight());
}

#[tokio::test]
async fn test_download_to_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/report.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a,b\n1,2\n"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir");
    let destination = dir.path().join("report.csv");

    let api = api_for(&server);
    let (sink, mut rx) = channel();
    api.get("/files/report.csv")
        .download(&destination)
        .on_response(sink)
        .build()
        .send();

    assert!(next(&mut rx).await.is_success());
    let written = tokio::fs::read_to_string(&destination)
        .await
        .expect("download written");
    assert_eq!(written, "a,b\n1,2\n");
}

#[tokio::test]
async fn test_unreachable_host() {
    let transport = ReqwestTransport::builder()
        .config(ReqwestTransportConfig {
            connect_timeout: Some(Duration::from_millis(500)),
            ..ReqwestTransportConfig::default()
        })
        .build()
        .expect("Failed to build transport");
    let api = Api::builder("http://127.0.0.1:9")
        .transport(transport)
        .logger(NoopLogger)
        .build()
        .expect("Failed to build api");

    let (sink, mut rx) = channel();
    api.get("/").on_response(sink).build().send();

    let error = next(&mut rx).await.error.expect("connection refused");
    assert_eq!(error.family(), Some(FailureFamily::UnavailableNetwork));
}
