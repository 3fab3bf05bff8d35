//! End-to-end tests for the recording middleware and report endpoints.
//!
//! Uses `tower::ServiceExt::oneshot` to drive the router without binding a
//! real TCP port; every test gets a fresh profiler.

use std::time::Duration;

use accessprof::{instrument, report_router, AccessProf, AggregationPatterns, ProfilerConfig};
use axum::body::{to_bytes, Body, Bytes};
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::routing::{any, get};
use axum::Router;
use tokio_stream::StreamExt;
use tower::ServiceExt; // .oneshot()

// ── Helpers ───────────────────────────────────────────────────

async fn echo(req: Request) -> String {
    let path = req.uri().path().to_owned();
    let body = to_bytes(req.into_body(), 1024 * 1024).await.unwrap();
    format!("Path: {path}\n{}", String::from_utf8_lossy(&body))
}

fn app(prof: &AccessProf) -> Router {
    let routes = Router::new()
        .route("/", any(echo))
        .route("/test", any(echo))
        .route("/:kind/:id", any(echo))
        .route(
            "/streamed",
            get(|| async {
                let chunks: Vec<Result<Bytes, std::io::Error>> =
                    vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"defg"))];
                Body::from_stream(tokio_stream::iter(chunks))
            }),
        );
    instrument(routes, prof.clone()).nest("/accessprof", report_router(prof.clone()))
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_req(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap()
}

async fn send(prof: &AccessProf, req: Request<Body>) -> (StatusCode, Bytes) {
    let resp = app(prof).oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    (status, body)
}

async fn report_json(prof: &AccessProf, uri: &str) -> serde_json::Value {
    let (status, body) = send(prof, get_req(uri)).await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
    serde_json::from_slice(&body).unwrap()
}

// ── Recording ─────────────────────────────────────────────────

#[tokio::test]
async fn records_every_request() {
    let prof = AccessProf::memory_only();
    send(&prof, get_req("/get/1")).await;
    send(&prof, get_req("/get/2")).await;
    send(&prof, post_req("/post/1", r#"{"test": "post"}"#)).await;

    assert_eq!(prof.count(), 3);
}

#[tokio::test]
async fn captures_status_sizes_and_timing() {
    let prof = AccessProf::memory_only();
    let (status, body) = send(&prof, post_req("/post/1", r#"{"key": "value"}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let report = prof.report(&AggregationPatterns::default()).unwrap();
    let seg = &report.segments()[0];
    let obs = &seg.observations()[0];
    assert_eq!(obs.method, "POST");
    assert_eq!(obs.path, "/post/1");
    assert_eq!(obs.status, 200);
    assert_eq!(obs.request_body_size, 16);
    assert_eq!(obs.response_body_size, body.len() as u64);
    assert!(report.since().is_some());
}

#[tokio::test]
async fn unknown_request_size_and_error_status() {
    let prof = AccessProf::memory_only();
    let missing = Router::new().route("/gone", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
    let resp = instrument(missing, prof.clone()).oneshot(get_req("/gone")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let report = prof.report(&AggregationPatterns::default()).unwrap();
    let obs = &report.segments()[0].observations()[0];
    assert_eq!(obs.status, 404);
    assert_eq!(obs.request_body_size, -1);
    assert_eq!(obs.response_body_size, 4);
}

#[tokio::test]
async fn streamed_bodies_are_counted_and_passed_through() {
    let prof = AccessProf::memory_only();
    let (status, body) = send(&prof, get_req("/streamed")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"abcdefg");

    let report = prof.report(&AggregationPatterns::default()).unwrap();
    assert_eq!(report.segments()[0].observations()[0].response_body_size, 7);
}

#[tokio::test]
async fn endless_bodies_stream_and_record_when_dropped() {
    let prof = AccessProf::memory_only();
    let events = Router::new().route(
        "/events",
        get(|| async {
            let ticks = std::iter::repeat_with(|| Ok::<_, std::io::Error>(Bytes::from_static(b"tick\n")));
            Body::from_stream(tokio_stream::iter(ticks))
        }),
    );

    let resp = tokio::time::timeout(
        Duration::from_secs(2),
        instrument(events, prof.clone()).oneshot(get_req("/events")),
    )
    .await
    .expect("headers arrive while the body is still streaming")
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(prof.count(), 0);

    let mut data = resp.into_body().into_data_stream();
    for _ in 0..3 {
        assert_eq!(&data.next().await.unwrap().unwrap()[..], b"tick\n");
    }
    drop(data);

    assert_eq!(prof.count(), 1);
    let report = prof.report(&AggregationPatterns::default()).unwrap();
    let obs = &report.segments()[0].observations()[0];
    assert_eq!(obs.path, "/events");
    assert_eq!(obs.response_body_size, 15);
}

#[tokio::test]
async fn body_errors_reach_the_client() {
    let prof = AccessProf::memory_only();
    let broken = Router::new().route(
        "/broken",
        get(|| async {
            let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                Ok(Bytes::from_static(b"abc")),
                Err(std::io::Error::new(std::io::ErrorKind::Other, "upstream went away")),
            ];
            Body::from_stream(tokio_stream::iter(chunks))
        }),
    );

    let resp = instrument(broken, prof.clone()).oneshot(get_req("/broken")).await.unwrap();
    assert!(to_bytes(resp.into_body(), usize::MAX).await.is_err());

    let report = prof.report(&AggregationPatterns::default()).unwrap();
    let obs = &report.segments()[0].observations()[0];
    assert_eq!(obs.status, 200);
    assert_eq!(obs.response_body_size, 3);
}

// ── Report endpoints ──────────────────────────────────────────

#[tokio::test]
async fn report_requests_are_not_recorded() {
    let prof = AccessProf::memory_only();
    send(&prof, get_req("/")).await;
    send(&prof, get_req("/test")).await;

    let json = report_json(&prof, "/accessprof").await;
    assert_eq!(json["total_requests"], 2);
    assert_eq!(prof.count(), 2);
}

#[tokio::test]
async fn report_aggregates_by_method_and_path() {
    let prof = AccessProf::memory_only();
    send(&prof, get_req("/")).await;
    send(&prof, post_req("/", "{}")).await;
    send(&prof, post_req("/", r#"{"key": "value"}"#)).await;
    send(&prof, get_req("/test")).await;

    let json = report_json(&prof, "/accessprof").await;
    let segments = json["segments"].as_array().unwrap();
    let keys: Vec<_> = segments
        .iter()
        .map(|s| (s["method"].as_str().unwrap(), s["path"].as_str().unwrap(), s["count"].as_u64().unwrap()))
        .collect();
    assert_eq!(keys, [("GET", "/", 1), ("POST", "/", 2), ("GET", "/test", 1)]);
}

#[tokio::test]
async fn report_aggregates_by_pattern_query() {
    let prof = AccessProf::memory_only();
    send(&prof, get_req("/")).await;
    send(&prof, get_req("/test/123")).await;
    send(&prof, get_req("/test/456")).await;
    send(&prof, post_req("/test/789", r#"{"key": "value"}"#)).await;

    // agg=/test/\d+
    let json = report_json(&prof, "/accessprof?agg=/test/%5Cd%2B").await;
    assert_eq!(json["patterns"], serde_json::json!([r"/test/\d+"]));
    let paths: Vec<_> = json["segments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| format!("{} {} {}", s["method"].as_str().unwrap(), s["path"].as_str().unwrap(), s["count"]))
        .collect();
    assert_eq!(paths, ["GET / 1", r"GET /test/\d+ 2", r"POST /test/\d+ 1"]);
}

#[tokio::test]
async fn invalid_pattern_is_a_bad_request() {
    let prof = AccessProf::memory_only();
    let (status, body) = send(&prof, get_req("/accessprof?agg=/ok,/bad(")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], 400);
    assert!(json["error"].as_str().unwrap().contains("/bad("));
}

#[tokio::test]
async fn table_endpoint_renders_text() {
    let prof = AccessProf::memory_only();
    send(&prof, get_req("/users/1")).await;

    let (status, body) = send(&prof, get_req("/accessprof/table")).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("1 requests (since "), "{text}");
    assert!(text.contains("MIN(BODY)"));
    assert!(text.contains("/users/1"));
}

#[tokio::test]
async fn delete_resets_logs() {
    let prof = AccessProf::memory_only();
    send(&prof, get_req("/")).await;
    send(&prof, get_req("/test")).await;
    assert_eq!(prof.count(), 2);

    let req = Request::builder()
        .method(Method::DELETE)
        .uri("/accessprof")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&prof, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prof.count(), 0);

    let json = report_json(&prof, "/accessprof").await;
    assert_eq!(json["segments"], serde_json::json!([]));
    assert_eq!(json["since"], serde_json::Value::Null);
}

#[tokio::test]
async fn html_page_shows_table_and_controls() {
    let prof = AccessProf::memory_only();
    send(&prof, get_req("/users/1")).await;
    send(&prof, get_req("/users/2")).await;

    let (status, body) = send(&prof, get_req("/accessprof/html?agg=/users/%5Cd%2B")).await;
    assert_eq!(status, StatusCode::OK);
    let page = String::from_utf8(body.to_vec()).unwrap();
    assert!(page.contains("<p>2 requests (since "), "{page}");
    assert!(page.contains(r"<td>/users/\d+</td>"));
    assert!(page.contains(r#"value="/users/\d+""#));
    assert!(page.contains("id=\"reset\""));

    let req = Request::builder()
        .method(Method::DELETE)
        .uri("/accessprof/html")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&prof, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prof.count(), 0);
}

#[tokio::test]
async fn html_page_rejects_bad_patterns() {
    let prof = AccessProf::memory_only();
    let (status, _) = send(&prof, get_req("/accessprof/html?agg=/bad(")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stream_pushes_reports_from_the_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let prof = AccessProf::new(ProfilerConfig::with_log_file(dir.path().join("access.ltsv")));
    send(&prof, get_req("/")).await;
    send(&prof, get_req("/test")).await;

    let resp = app(&prof).oneshot(get_req("/accessprof/stream")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let mut events = resp.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("first report event")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(first.to_vec()).unwrap();
    assert!(text.starts_with("event: report\n"), "{text}");
    assert!(text.contains(r#""total_requests":2"#), "{text}");

    // The report flushed the buffer into the file
    assert_eq!(prof.count(), 0);
    assert_eq!(prof.load_all().unwrap().len(), 2);
}
