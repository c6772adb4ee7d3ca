use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use stockroom_api::{
    api_v1_routes,
    config::AppConfig,
    db::{self, DbConfig},
    handlers, AppState,
};

/// In-process application wired against a private in-memory database.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub async fn spawn() -> Self {
        // A single connection keeps the in-memory database alive and shared
        // across all requests of the test.
        let db_config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&db_config)
            .await
            .expect("failed to open in-memory database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let config = AppConfig::new(
            db_config.url.clone(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        let state = AppState::new(Arc::new(pool), config, None);

        let router = Router::new()
            .nest("/health", handlers::health::router())
            .nest("/api/v1", api_v1_routes())
            .with_state(state);

        Self { router }
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method("GET")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, path: &str) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method("DELETE")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body was not valid JSON")
        };
        (status, json)
    }

    /// Creates an item and returns its id.
    pub async fn create_item(&self, name: &str, price: i32) -> i64 {
        let (status, body) = self
            .post_json(
                "/api/v1/items",
                &serde_json::json!({ "name": name, "price": price }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create_item failed: {body}");
        body["data"]["id"].as_i64().unwrap()
    }

    /// Records a movement and returns its id.
    pub async fn record_movement(&self, item_id: i64, kind: &str, quantity: i32) -> i64 {
        let (status, body) = self
            .post_json(
                "/api/v1/inventory",
                &serde_json::json!({ "item_id": item_id, "kind": kind, "quantity": quantity }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "record_movement failed: {body}");
        body["data"]["id"].as_i64().unwrap()
    }
}
