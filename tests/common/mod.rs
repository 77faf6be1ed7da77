#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, Response, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth::{AuthConfig, AuthService},
    config::{AppConfig, PaymentConfig},
    db,
    entities::{category, order, product, user},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::{PaymentLink, PaymentProvider},
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Payment provider stub that hands out deterministic redirect links.
#[derive(Default)]
pub struct StubPaymentProvider {
    calls: AtomicUsize,
}

impl StubPaymentProvider {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for StubPaymentProvider {
    async fn create_payment_link(
        &self,
        order: &order::Model,
    ) -> Result<PaymentLink, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentLink {
            confirmation_url: format!("https://pay.test/redirect/{call}"),
            payment_id: format!("session-{}", order.id),
        })
    }
}

/// Payment provider stub that always fails, as an unreachable provider would.
pub struct FailingPaymentProvider;

#[async_trait]
impl PaymentProvider for FailingPaymentProvider {
    async fn create_payment_link(
        &self,
        _order: &order::Model,
    ) -> Result<PaymentLink, ServiceError> {
        Err(ServiceError::PaymentGateway(
            "provider unreachable".to_string(),
        ))
    }
}

/// Test harness: application state backed by an in-memory SQLite database,
/// with one regular user and one admin seeded and logged in.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub user: user::Model,
    pub admin: user::Model,
    user_token: String,
    admin_token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(Arc::new(StubPaymentProvider::default()), None).await
    }

    pub async fn with_provider(provider: Arc<dyn PaymentProvider>) -> Self {
        Self::build(provider, None).await
    }

    pub async fn with_webhook_secret(secret: &str) -> Self {
        Self::build(
            Arc::new(StubPaymentProvider::default()),
            Some(secret.to_string()),
        )
        .await
    }

    async fn build(provider: Arc<dyn PaymentProvider>, webhook_secret: Option<String>) -> Self {
        let cfg = test_config(webhook_secret);

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        tokio::spawn(events::process_events(event_rx));

        let auth = Arc::new(AuthService::new(AuthConfig::new(
            cfg.jwt_secret.clone(),
            Duration::from_secs(cfg.jwt_expiration_secs),
            Duration::from_secs(cfg.refresh_token_expiration_secs),
        )));

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), auth.clone(), provider);

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
            auth: auth.clone(),
        };

        let router = storefront_api::app(state.clone());

        let user = seed_user(&state, &auth, "casey", "casey@example.com", false).await;
        let admin = seed_user(&state, &auth, "admin", "admin@example.com", true).await;

        let user_token = auth
            .generate_token_pair(&user)
            .expect("token issuance failed")
            .access_token;
        let admin_token = auth
            .generate_token_pair(&admin)
            .expect("token issuance failed")
            .access_token;

        Self {
            router,
            state,
            user,
            admin,
            user_token,
            admin_token,
        }
    }

    /// Fire a request without authentication.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.dispatch(method, path, body, None).await
    }

    /// Fire a request with the regular user's bearer token.
    pub async fn request_authenticated(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.dispatch(method, path, body, Some(&self.user_token)).await
    }

    /// Fire a request with the admin's bearer token.
    pub async fn request_as_admin(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.dispatch(method, path, body, Some(&self.admin_token)).await
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed")
    }

    /// Fire a request with a raw body and extra headers (webhook signing).
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        body: String,
        headers: &[(&str, String)],
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }

        let request = builder.body(Body::from(body)).expect("failed to build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed")
    }

    /// Seed a category directly through the service layer.
    pub async fn seed_category(&self, title: &str) -> category::Model {
        self.state
            .services
            .categories
            .create(storefront_api::services::categories::CreateCategoryInput {
                title: title.to_string(),
                slug: None,
            })
            .await
            .expect("failed to seed category")
    }

    /// Seed a product in the given category.
    pub async fn seed_product(
        &self,
        category_id: Uuid,
        title: &str,
        price: Decimal,
    ) -> product::Model {
        self.state
            .services
            .products
            .create(storefront_api::services::products::CreateProductInput {
                title: title.to_string(),
                description: None,
                price,
                category_id,
                image: None,
            })
            .await
            .expect("failed to seed product")
    }
}

fn test_config(webhook_secret: Option<String>) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        auto_migrate: true,
        jwt_secret: "test_secret_key_for_testing_purposes_only_32chars".to_string(),
        jwt_expiration_secs: 3600,
        refresh_token_expiration_secs: 86_400,
        cors_allowed_origins: None,
        // a single connection keeps the in-memory database alive and shared
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        event_channel_capacity: 64,
        payment: PaymentConfig {
            api_base: "https://api.yookassa.test/v3".to_string(),
            shop_id: "shop-1".to_string(),
            secret_key: "sk-test".to_string(),
            currency: "RUB".to_string(),
            return_url: "https://shop.test/return".to_string(),
            request_timeout_secs: 5,
            webhook_secret,
            webhook_tolerance_secs: 300,
        },
    }
}

async fn seed_user(
    state: &AppState,
    auth: &AuthService,
    username: &str,
    email: &str,
    is_admin: bool,
) -> user::Model {
    let password_hash = auth
        .hash_password("correct horse battery staple")
        .expect("failed to hash password");

    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(password_hash),
        is_admin: Set(is_admin),
        first_name: Set(None),
        last_name: Set(None),
        image: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(&*state.db)
    .await
    .expect("failed to seed user")
}

/// Read and parse a JSON response body.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is not valid json")
}

/// Parse a JSON value that carries a monetary amount. Decimals serialize as
/// strings, but this stays robust if a number sneaks through.
pub fn as_decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("invalid decimal string"),
        Value::Number(n) => n.to_string().parse().expect("invalid decimal number"),
        other => panic!("expected decimal, got {other:?}"),
    }
}

/// Shorthand for asserting a status and returning the parsed body.
pub async fn assert_status(response: Response<Body>, expected: StatusCode) -> Value {
    let status = response.status();
    let body = body_json(response).await;
    assert_eq!(status, expected, "unexpected status, body: {body}");
    body
}
