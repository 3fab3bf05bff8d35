use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;
use tracing::{info, warn};

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that drive requests through `app`
/// in-process until the deadline or the `running` flag is set to false.
pub async fn run(app: Router, running: Arc<AtomicBool>, concurrency: u32, duration_secs: u64) {
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    info!(workers = concurrency, secs = duration_secs, "starting synthetic load");

    let mut handles = Vec::with_capacity(concurrency as usize);

    for worker_id in 0..concurrency {
        let running = running.clone();
        let app = app.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, app, running, deadline).await
        }));
    }

    let mut total = 0u64;
    for h in handles {
        match h.await {
            Ok(sent) => total += sent,
            Err(err) => warn!(error = %err, "load worker panicked"),
        }
    }

    running.store(false, Ordering::SeqCst);
    info!(requests = total, "synthetic load finished");
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(id: u32, app: Router, running: Arc<AtomicBool>, deadline: Instant) -> u64 {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);
    let mut sent = 0;

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let response = match app.clone().oneshot(random_request(&mut rng)).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        // Drain the body like a real client would
        let _ = axum::body::to_bytes(response.into_body(), usize::MAX).await;
        sent += 1;
        tokio::task::yield_now().await;
    }

    sent
}

// 50 % user lookups, 30 % product lookups, 20 % user creation
fn random_request(rng: &mut StdRng) -> Request<Body> {
    let roll = rng.gen_range(0u8..100);
    let builder = Request::builder();

    let request = if roll < 50 {
        let id = rng.gen_range(1..=1_000u32);
        builder.uri(format!("/users/{id}")).body(Body::empty())
    } else if roll < 80 {
        let id = rng.gen_range(1..=500u32);
        builder.uri(format!("/products/{id}")).body(Body::empty())
    } else {
        let body = serde_json::json!({ "name": format!("bench {}", rng.gen::<u16>()) }).to_string();
        builder
            .method(Method::POST)
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
    };

    // Every URI above is a valid static-shaped path
    request.unwrap_or_default()
}
