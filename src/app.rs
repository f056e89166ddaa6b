use std::net::SocketAddr;

use axum::{extract::State, middleware, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::HttpConfig;
use crate::middleware::{rate_limit, track_metrics};
use crate::state::AppState;
use crate::{accounts, objects};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

async fn prometheus(State(state): State<AppState>) -> String {
    state.metrics.render()
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(accounts::router())
        .merge(objects::router())
        .route("/health", get(health))
        .route("/prometheus", get(prometheus))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn(track_metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, cfg: &HttpConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::accounts::memory::MemoryStore;
    use crate::storage::fakes::{RecordingBlobStore, UnreachableBlobStore};
    use crate::storage::BlobStore;

    fn app_with(store: &MemoryStore, blobs: Arc<dyn BlobStore>) -> Router {
        build_app(AppState::fake(store.clone(), blobs))
    }

    fn app() -> Router {
        app_with(&MemoryStore::new(), Arc::new(RecordingBlobStore::default()))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_of(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_up() {
        let (status, body) = call(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"status": "UP"}));
    }

    #[tokio::test]
    async fn account_lifecycle_over_http() {
        let app = app();

        let (status, body) = call(&app, Method::GET, "/api/users", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "empty list is reported as not found");
        assert!(!body.is_empty());

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({"username": "alice", "password": "longenough1", "email": "alice@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created = json_of(&body);
        let id = created["id"].as_i64().unwrap();
        assert!(id > 0);
        assert_eq!(created["username"], "alice");
        assert!(created.get("password").is_none());
        assert!(created.get("password_hash").is_none());

        let (status, body) = call(&app, Method::GET, &format!("/api/users/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["email"], "alice@example.com");

        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/api/users/{id}"),
            Some(json!({"username": "alice2", "password": "longenough2", "email": "a@b.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({"id": id, "username": "alice2", "email": "a@b.com"}));

        let (status, body) = call(&app, Method::GET, "/api/users", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body).as_array().unwrap().len(), 1);

        let (status, _) = call(&app, Method::DELETE, &format!("/api/users/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, Method::GET, &format!("/api/users/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn core_errors_map_to_status_codes() {
        let app = app();
        let body = json!({"username": "bob", "password": "longenough1", "email": "bob@example.com"});
        let (status, _) = call(&app, Method::POST, "/api/users", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, msg) = call(&app, Method::POST, "/api/users", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(String::from_utf8(msg).unwrap().contains("already taken"));

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({"username": "carl", "password": "short", "email": "carl@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({"username": "carl", "password": "longenough1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/users/404",
            Some(json!({"username": "x", "password": "longenough1", "email": "x@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::GET, "/api/users/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn account_writes_succeed_with_blob_store_down() {
        let store = MemoryStore::new();
        let app = app_with(&store, Arc::new(UnreachableBlobStore));
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/users",
            Some(json!({"username": "dana", "password": "longenough1", "email": "d@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(store.row_count(), 1);

        let (status, _) = call(
            &app,
            Method::POST,
            "/storage/objects",
            Some(json!({"object_name": "a.txt", "content": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn storage_upload_and_presign() {
        let blobs = Arc::new(RecordingBlobStore::default());
        let app = app_with(&MemoryStore::new(), blobs.clone());

        let (status, body) = call(
            &app,
            Method::POST,
            "/storage/objects",
            Some(json!({"bucket": "docs", "object_name": "hello.txt", "content": "hello", "content_type": "text/plain"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let uploaded = json_of(&body);
        assert_eq!(uploaded["bucket"], "docs");
        assert_eq!(uploaded["object_name"], "hello.txt");
        assert_eq!(uploaded["size"], 5);
        let (stored, ct) = blobs.object("docs", "hello.txt").unwrap();
        assert_eq!(&stored[..], b"hello");
        assert_eq!(ct, "text/plain");

        let (status, body) = call(
            &app,
            Method::POST,
            "/storage/presign",
            Some(json!({"object_name": "hello.txt", "expiry_seconds": 120})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let presigned = json_of(&body);
        assert_eq!(presigned["expiry_seconds"], 120);
        assert!(presigned["url"].as_str().unwrap().contains("users/hello.txt"));

        let (status, _) = call(&app, Method::POST, "/storage/presign", Some(json!({"object_name": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rate_limited_requests_are_counted() {
        use metrics_exporter_prometheus::PrometheusBuilder;

        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _local = metrics::set_default_local_recorder(&recorder);

        let config = crate::config::AppConfig::from_lookup(|key| match key {
            "RATE_LIMIT_RPS" | "RATE_LIMIT_BURST" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();
        let state = AppState::from_parts(
            Arc::new(config),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingBlobStore::default()),
            handle.clone(),
        );
        let app = build_app(state);

        let (status, _) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        let rendered = handle.render();
        let throttled = rendered
            .lines()
            .find(|l| l.starts_with("http_requests_total") && l.contains(r#"status="429""#))
            .unwrap_or_else(|| panic!("no 429 sample in:\n{rendered}"));
        assert!(throttled.contains(r#"endpoint="/health""#), "{throttled}");
        assert!(throttled.ends_with(" 1"), "{throttled}");
    }

    #[tokio::test]
    async fn prometheus_endpoint_renders() {
        let (status, _) = call(&app(), Method::GET, "/prometheus", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
