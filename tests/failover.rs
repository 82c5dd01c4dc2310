//! End-to-end routing, failover and health tests against mock origins.

use std::time::Duration;

use axum::http::StatusCode;
use failover_proxy::load_balancer::HealthyRotation;

mod common;

use common::{client, start_proxy, test_config, wait_for, MockBackend};

async fn get(url: String) -> (StatusCode, Option<String>, String) {
    let res = client().get(url).send().await.unwrap();
    let status = StatusCode::from_u16(res.status().as_u16()).unwrap();
    let backend = res
        .headers()
        .get("x-backend")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    (status, backend, res.text().await.unwrap())
}

#[tokio::test]
async fn round_robin_visits_backends_in_id_order() {
    let b0 = MockBackend::start("b0").await;
    let b1 = MockBackend::start("b1").await;
    let b2 = MockBackend::start("b2").await;
    let proxy = start_proxy(test_config(&[&b0, &b1, &b2])).await;
    assert_eq!(proxy.rotation_ids(), vec![0, 1, 2]);

    let mut bodies = Vec::new();
    for _ in 0..6 {
        let (status, _, body) = get(proxy.url("/")).await;
        assert_eq!(status, StatusCode::OK);
        bodies.push(body);
    }

    assert_eq!(bodies, ["b0", "b1", "b2", "b0", "b1", "b2"]);
}

#[tokio::test]
async fn failover_walks_to_next_healthy_backend() {
    let b0 = MockBackend::start("b0").await;
    let b1 = MockBackend::start("b1").await;
    let b2 = MockBackend::start("b2").await;
    let b3 = MockBackend::start("b3").await;
    b2.set_healthy(false);
    b1.set_status(500);

    let proxy = start_proxy(test_config(&[&b0, &b1, &b2, &b3])).await;
    assert_eq!(proxy.rotation_ids(), vec![0, 1, 3]);

    let mut seen = Vec::new();
    for _ in 0..4 {
        let (status, backend, body) = get(proxy.url("/items")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(backend.as_deref(), Some(body.as_str()));
        seen.push(body);
    }

    // The second request starts at b1, fails there and lands on b3.
    assert_eq!(seen, ["b0", "b3", "b3", "b0"]);
    assert_eq!(b1.hits(), 1);
    assert_eq!(b2.hits(), 0);
}

#[tokio::test]
async fn exhausted_walk_relays_last_failure() {
    let b0 = MockBackend::start("b0").await;
    let b1 = MockBackend::start("b1").await;
    let b2 = MockBackend::start("b2").await;
    for b in [&b0, &b1, &b2] {
        b.set_status(503);
    }

    let proxy = start_proxy(test_config(&[&b0, &b1, &b2])).await;
    let (status, backend, body) = get(proxy.url("/")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(backend.as_deref(), Some("b2"));
    assert_eq!(body, "b2");
    assert_eq!((b0.hits(), b1.hits(), b2.hits()), (1, 1, 1));
}

#[tokio::test]
async fn non_200_success_codes_are_failover_triggers() {
    let b0 = MockBackend::start("b0").await;
    let b1 = MockBackend::start("b1").await;
    b0.set_status(204);

    let proxy = start_proxy(test_config(&[&b0, &b1])).await;
    let (status, backend, body) = get(proxy.url("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(backend.as_deref(), Some("b1"));
    assert_eq!(body, "b1");
    assert_eq!(b0.hits(), 1);
}

#[tokio::test]
async fn request_body_is_replayed_on_retry() {
    let b0 = MockBackend::start("b0").await;
    let b1 = MockBackend::start("b1").await;
    b0.set_status(502);

    let proxy = start_proxy(test_config(&[&b0, &b1])).await;
    let res = client()
        .post(proxy.url("/submit?x=1"))
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.text().await.unwrap(), "b1:payload");
    assert_eq!(b0.hits(), 1);
}

#[tokio::test]
async fn unreachable_backend_fails_over() {
    let b1 = MockBackend::start("b1").await;
    let mut config = test_config(&[&b1]);
    config.backends.insert(0, "http://127.0.0.1:1".to_string());
    let proxy = start_proxy(config).await;
    assert_eq!(proxy.rotation_ids(), vec![1]);

    // Put the dead origin back in rotation, as if it died after its last probe.
    let members = proxy.registry.all().to_vec();
    proxy
        .selector
        .install(HealthyRotation::new(members).unwrap());

    let (status, _, body) = get(proxy.url("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "b1");
}

#[tokio::test]
async fn request_id_is_echoed_and_forwarded() {
    let b0 = MockBackend::start("b0").await;
    let proxy = start_proxy(test_config(&[&b0])).await;

    let res = client()
        .get(proxy.url("/trace"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers().get("x-request-id").unwrap().to_str().unwrap(),
        "req-42"
    );
    assert_eq!(b0.last_header("x-request-id").as_deref(), Some("req-42"));
    assert_eq!(b0.last_header("x-forwarded-for").as_deref(), Some("127.0.0.1"));
    assert_eq!(b0.last_header("x-forwarded-proto").as_deref(), Some("http"));

    let res = client().get(proxy.url("/trace")).send().await.unwrap();
    let generated = res.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(generated.len(), 36);
}

#[tokio::test]
async fn stale_rotation_is_kept_when_every_probe_fails() {
    let b0 = MockBackend::start("b0").await;
    let b1 = MockBackend::start("b1").await;
    let mut config = test_config(&[&b0, &b1]);
    config.health_check.interval_secs = 1;
    let proxy = start_proxy(config).await;
    assert_eq!(proxy.rotation_ids(), vec![0, 1]);

    b0.set_healthy(false);
    b1.set_healthy(false);
    let registry = proxy.registry.clone();
    assert!(
        wait_for(Duration::from_secs(5), || {
            registry.all().iter().all(|b| !b.is_healthy())
        })
        .await
    );

    // Flags are down but the last good rotation still routes.
    assert_eq!(proxy.rotation_ids(), vec![0, 1]);
    let (status, _, _) = get(proxy.url("/")).await;
    assert_eq!(status, StatusCode::OK);

    b1.set_healthy(true);
    let selector = proxy.selector.clone();
    assert!(
        wait_for(Duration::from_secs(5), || {
            selector.current().map(|r| r.ids()) == Some(vec![1])
        })
        .await
    );
    let (_, _, body) = get(proxy.url("/")).await;
    assert_eq!(body, "b1");
}

#[tokio::test]
async fn admin_api_reports_registry_and_rotation() {
    let b0 = MockBackend::start("b0").await;
    let b1 = MockBackend::start("b1").await;
    b1.set_healthy(false);
    let proxy = start_proxy(test_config(&[&b0, &b1])).await;

    let unauthorized = client()
        .get(proxy.admin_url("/admin/backends"))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status().as_u16(), 401);

    let backends: serde_json::Value = client()
        .get(proxy.admin_url("/admin/backends"))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(backends[0]["state"], "healthy");
    assert_eq!(backends[0]["in_rotation"], true);
    assert_eq!(backends[1]["state"], "unhealthy");
    assert_eq!(backends[1]["in_rotation"], false);

    let rotation: serde_json::Value = client()
        .get(proxy.admin_url("/admin/rotation"))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rotation.as_array().unwrap().len(), 1);
    assert_eq!(rotation[0]["id"], 0);
}

#[tokio::test]
async fn large_responses_are_relayed_without_failover() {
    let b0 = MockBackend::start("b0").await;
    let b1 = MockBackend::start("b1").await;
    let mut config = test_config(&[&b0, &b1]);
    // Every mock body is longer than this, so each one is passed through.
    config.limits.max_response_bytes = 1;
    let proxy = start_proxy(config).await;

    let (status, backend, body) = get(proxy.url("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(backend.as_deref(), Some("b0"));
    assert_eq!(body, "b0");
    assert_eq!(b1.hits(), 0);

    // A failing attempt past the threshold still fails over.
    b1.set_status(500);
    b0.set_status(500);
    let (status, backend, body) = get(proxy.url("/")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(backend.as_deref(), Some("b0"));
    assert_eq!(body, "b0");
    assert_eq!((b0.hits(), b1.hits()), (2, 1));
}

#[tokio::test]
async fn slow_walk_answers_gateway_timeout() {
    let b0 = MockBackend::start("b0").await;
    b0.set_delay(Duration::from_secs(3));
    let mut config = test_config(&[&b0]);
    config.timeouts.request_secs = 1;
    let proxy = start_proxy(config).await;

    let started = std::time::Instant::now();
    let (status, _, _) = get(proxy.url("/")).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(3));
}
