//! End-to-end flows through the HTTP router with a stubbed registry and Pub/Sub.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use base_image_watcher::engine::{Engine, EngineOptions};
use base_image_watcher::metrics::Metrics;
use base_image_watcher::publisher::pubsub::PubsubPublisher;
use base_image_watcher::registry::{ANNOTATION_BASE_DIGEST, ANNOTATION_BASE_NAME, RegistryClient};
use base_image_watcher::server;
use base_image_watcher::storage::Database;

struct Harness {
    router: Router,
    registry: MockServer,
    pubsub: MockServer,
    engine: Arc<Engine>,
}

impl Harness {
    async fn start() -> Self {
        let registry = MockServer::start().await;
        let pubsub = MockServer::start().await;

        let engine = Arc::new(Engine::new(
            Database::in_memory().await.unwrap(),
            Arc::new(RegistryClient::new(Duration::from_secs(5), true).unwrap()),
            Arc::new(
                PubsubPublisher::new(pubsub.uri(), "proj".to_string(), Duration::from_secs(5))
                    .unwrap(),
            ),
            Arc::new(Metrics::unregistered()),
            EngineOptions::default(),
        ));
        let router = server::router(engine.clone(), &[]);

        Self {
            router,
            registry,
            pubsub,
            engine,
        }
    }

    /// Reference on the stub registry, e.g. `127.0.0.1:1234/repo/app:latest`.
    fn reference(&self, name: &str) -> String {
        format!("{}/{}", self.registry.address(), name)
    }

    async fn post(&self, uri: &str, body: Value) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap().status()
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Push envelope as delivered by a Pub/Sub push subscription.
    fn envelope(action: &str, tag: &str, digest: &str) -> Value {
        let data = json!({"action": action, "tag": tag, "digest": digest}).to_string();
        json!({
            "message": {
                "data": STANDARD.encode(data),
                "messageId": "1",
                "publishTime": "2024-01-01T00:00:00Z"
            },
            "subscription": "projects/proj/subscriptions/gcr"
        })
    }

    async fn mount_manifest(&self, repository: &str, digest: &str, annotations: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/v2/{}/manifests/{}", repository, digest)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schemaVersion": 2,
                "annotations": annotations
            })))
            .mount(&self.registry)
            .await;
    }

    async fn mount_publish(&self, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/projects/proj/topics/image-rebuild:publish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messageIds": ["1"]})))
            .expect(expected)
            .mount(&self.pubsub)
            .await;
    }

    /// Decoded payloads of every message published so far.
    async fn published(&self) -> Vec<Value> {
        let requests = self.pubsub.received_requests().await.unwrap_or_default();
        requests
            .iter()
            .map(|request| {
                let body: Value = serde_json::from_slice(&request.body).unwrap();
                let data = body["messages"][0]["data"].as_str().unwrap();
                serde_json::from_slice(&STANDARD.decode(data).unwrap()).unwrap()
            })
            .collect()
    }
}

#[tokio::test]
async fn test_base_update_triggers_rebuild_of_owned_image() {
    let h = Harness::start().await;
    let app_tag = h.reference("repo/app:latest");
    let base_tag = h.reference("repo/base:latest");

    h.mount_manifest(
        "repo/app",
        "sha256:app",
        json!({
            ANNOTATION_BASE_DIGEST: "sha256:d0",
            ANNOTATION_BASE_NAME: base_tag,
        }),
    )
    .await;
    h.mount_manifest("repo/base", "sha256:d1", json!({})).await;
    h.mount_publish(1).await;

    assert_eq!(h.post("/watch", json!({"tag": app_tag})).await, StatusCode::CREATED);

    let app_digest = h.reference("repo/app@sha256:app");
    let status = h
        .post("/notification", Harness::envelope("INSERT", &app_tag, &app_digest))
        .await;
    assert_eq!(status, StatusCode::OK);

    let dep = h
        .engine
        .database()
        .get_dependency("sha256:app")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dep.base_ref, base_tag);
    assert_eq!(dep.base_digest, "sha256:d0");

    let base_digest = h.reference("repo/base@sha256:d1");
    let status = h
        .post("/notification", Harness::envelope("INSERT", &base_tag, &base_digest))
        .await;
    assert_eq!(status, StatusCode::OK);

    let published = h.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["tag"], app_tag.as_str());
    assert_eq!(published[0]["sourceDigest"], "sha256:app");
    assert_eq!(published[0]["baseDigest"], "sha256:d0");
    assert_eq!(published[0]["currentBaseDigest"], "sha256:d1");
}

#[tokio::test]
async fn test_base_republished_with_same_digest_triggers_nothing() {
    let h = Harness::start().await;
    let app_tag = h.reference("repo/app:latest");
    let base_tag = h.reference("repo/base:latest");

    h.mount_manifest("repo/base", "sha256:d0", json!({})).await;
    h.mount_publish(0).await;

    assert_eq!(h.post("/watch", json!({"tag": app_tag})).await, StatusCode::CREATED);
    let edge = json!({"sourceDigest": "sha256:app", "baseDigest": "sha256:d0", "baseRef": base_tag});
    assert_eq!(h.post("/watch", edge.clone()).await, StatusCode::CREATED);
    assert_eq!(h.post("/watch", edge).await, StatusCode::OK);

    let body = json!({"action": "INSERT", "tag": base_tag, "digest": h.reference("repo/base@sha256:d0")});
    assert_eq!(h.post("/notification", body).await, StatusCode::OK);
    assert!(h.published().await.is_empty());
}

#[tokio::test]
async fn test_watch_accepts_digest_references() {
    let h = Harness::start().await;
    let app_tag = h.reference("repo/app:latest");
    let base_tag = h.reference("repo/base:latest");

    h.mount_manifest("repo/app", "sha256:app", json!({})).await;
    h.mount_manifest("repo/base", "sha256:d1", json!({})).await;
    h.mount_publish(1).await;

    assert_eq!(h.post("/watch", json!({"tag": app_tag})).await, StatusCode::CREATED);
    let app_digest = h.reference("repo/app@sha256:app");
    let insert = json!({"action": "INSERT", "tag": app_tag, "digest": app_digest});
    assert_eq!(h.post("/notification", insert).await, StatusCode::OK);

    let edge = json!({
        "sourceDigest": app_digest,
        "baseDigest": h.reference("repo/base@sha256:d0"),
        "baseRef": base_tag,
    });
    assert_eq!(h.post("/watch", edge).await, StatusCode::CREATED);

    let base_insert = json!({"action": "INSERT", "tag": base_tag, "digest": h.reference("repo/base@sha256:d1")});
    assert_eq!(h.post("/notification", base_insert).await, StatusCode::OK);

    let published = h.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["tag"], app_tag.as_str());
    assert_eq!(published[0]["baseDigest"], "sha256:d0");
}

#[tokio::test]
async fn test_registry_outage_is_server_error_but_image_is_kept() {
    let h = Harness::start().await;
    let app_tag = h.reference("repo/app:latest");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.registry)
        .await;

    let body = json!({"action": "INSERT", "tag": app_tag, "digest": h.reference("repo/app@sha256:app")});
    assert_eq!(
        h.post("/notification", body).await,
        StatusCode::INTERNAL_SERVER_ERROR
    );

    let image = h
        .engine
        .database()
        .get_image_by_tag(&app_tag)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(image.digest, "sha256:app");
    assert!(h.engine.database().list_dependencies().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_and_malformed_events() {
    let h = Harness::start().await;
    let app_tag = h.reference("repo/app:latest");
    h.mount_manifest("repo/app", "sha256:app", json!({})).await;

    let insert = json!({"action": "INSERT", "tag": app_tag, "digest": h.reference("repo/app@sha256:app")});
    assert_eq!(h.post("/notification", insert).await, StatusCode::OK);

    let (status, images) = h.get("/api/v1/images").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(images["total"], 1);

    let delete = json!({"action": "DELETE", "tag": app_tag});
    assert_eq!(h.post("/notification", delete).await, StatusCode::OK);
    let (_, images) = h.get("/api/v1/images").await;
    assert_eq!(images["total"], 0);

    // Accepted without side effects
    let no_digest = json!({"action": "INSERT", "tag": app_tag, "digest": ""});
    assert_eq!(h.post("/notification", no_digest).await, StatusCode::OK);
    let (_, images) = h.get("/api/v1/images").await;
    assert_eq!(images["total"], 0);

    assert_eq!(
        h.post("/notification", json!({"tag": app_tag})).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        h.post("/notification", json!({"message": {"messageId": "1"}})).await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_stale_endpoint_resolves_current_digest() {
    let h = Harness::start().await;
    let base_tag = h.reference("repo/base:latest");

    Mock::given(method("HEAD"))
        .and(path("/v2/repo/base/manifests/latest"))
        .respond_with(ResponseTemplate::new(200).insert_header("Docker-Content-Digest", "sha256:d1"))
        .mount(&h.registry)
        .await;

    let edge = json!({"source_digest": "sha256:app", "base_digest": "sha256:d0", "base_ref": base_tag});
    assert_eq!(h.post("/watch", edge).await, StatusCode::CREATED);

    let (status, body) = h.get(&format!("/api/v1/stale?tag={}", base_tag)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentDigest"], "sha256:d1");
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["source_digest"], "sha256:app");

    let (status, body) = h
        .get(&format!("/api/v1/stale?tag={}&digest=sha256:d0", base_tag))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);

    let (status, _) = h.get("/api/v1/stale").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_info_endpoints() {
    let h = Harness::start().await;

    let (status, _) = h.get("/ping").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.get("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, body) = h.get("/api/v1/version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["publisher"], "pubsub");

    assert_eq!(h.post("/watch", json!({"tag": ""})).await, StatusCode::BAD_REQUEST);
    let (status, body) = h.get("/api/v1/services").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}
