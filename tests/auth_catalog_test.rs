mod common;

use axum::http::{Method, StatusCode};
use common::{as_decimal, assert_status, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn register_login_me_round_trip() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            Some(json!({
                "username": "dana",
                "email": "dana@example.com",
                "password": "a long password",
                "first_name": "Dana",
            })),
        )
        .await;
    let profile = assert_status(response, StatusCode::CREATED).await;
    assert_eq!(profile["username"], "dana");
    assert_eq!(profile["is_admin"], false);
    assert!(profile.get("password_hash").is_none());

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({"username": "dana", "password": "a long password"})),
        )
        .await;
    let tokens = assert_status(response, StatusCode::OK).await;
    assert_eq!(tokens["token_type"], "Bearer");
    let access = tokens["access_token"].as_str().unwrap().to_string();

    let response = app
        .request_raw(
            Method::GET,
            "/api/v1/auth/me",
            String::new(),
            &[("Authorization", format!("Bearer {access}"))],
        )
        .await;
    let me = assert_status(response, StatusCode::OK).await;
    assert_eq!(me["username"], "dana");
    assert_eq!(me["email"], "dana@example.com");
}

#[tokio::test]
async fn refresh_token_round_trip() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({"username": "casey", "password": "correct horse battery staple"})),
        )
        .await;
    let tokens = assert_status(response, StatusCode::OK).await;
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/refresh",
            Some(json!({"refresh_token": refresh})),
        )
        .await;
    let renewed = assert_status(response, StatusCode::OK).await;
    let access = renewed["access_token"].as_str().unwrap().to_string();

    let response = app
        .request_raw(
            Method::GET,
            "/api/v1/auth/me",
            String::new(),
            &[("Authorization", format!("Bearer {access}"))],
        )
        .await;
    assert_status(response, StatusCode::OK).await;

    // a refresh token is not accepted as an access token
    let response = app
        .request_raw(
            Method::GET,
            "/api/v1/auth/me",
            String::new(),
            &[("Authorization", format!("Bearer {refresh}"))],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = TestApp::new().await;

    let payload = json!({
        "username": "casey",
        "email": "other@example.com",
        "password": "a long password",
    });
    let response = app
        .request(Method::POST, "/api/v1/auth/register", Some(payload))
        .await;
    let body = assert_status(response, StatusCode::CONFLICT).await;
    assert!(body["message"].as_str().unwrap().contains("username"));
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({"username": "casey", "password": "wrong"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_admin_cannot_mutate_catalog() {
    let app = TestApp::new().await;
    let category = app.seed_category("Lighting").await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "title": "Desk lamp",
                "price": 10.00,
                "category_id": category.id,
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_creates_catalog_and_reads_are_public() {
    let app = TestApp::new().await;

    let response = app
        .request_as_admin(
            Method::POST,
            "/api/v1/categories",
            Some(json!({"title": "Office Chairs"})),
        )
        .await;
    let category = assert_status(response, StatusCode::CREATED).await;
    assert_eq!(category["slug"], "office-chairs");
    let category_id = category["id"].as_str().unwrap().to_string();

    let response = app
        .request_as_admin(
            Method::POST,
            "/api/v1/products",
            Some(json!({
                "title": "Aeron chair",
                "price": 1249.99,
                "category_id": category_id,
            })),
        )
        .await;
    let product = assert_status(response, StatusCode::CREATED).await;
    assert_eq!(as_decimal(&product["price"]), dec!(1249.99));

    // catalog reads need no token
    let response = app.request(Method::GET, "/api/v1/products", None).await;
    let products = assert_status(response, StatusCode::OK).await;
    assert_eq!(products.as_array().unwrap().len(), 1);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/category/{category_id}"),
            None,
        )
        .await;
    let products = assert_status(response, StatusCode::OK).await;
    assert_eq!(products[0]["title"], "Aeron chair");

    let response = app
        .request(Method::GET, "/api/v1/categories/slug/office-chairs", None)
        .await;
    let by_slug = assert_status(response, StatusCode::OK).await;
    assert_eq!(by_slug["title"], "Office Chairs");
}

#[tokio::test]
async fn duplicate_category_slug_conflicts() {
    let app = TestApp::new().await;
    app.seed_category("Lighting").await;

    let response = app
        .request_as_admin(
            Method::POST,
            "/api/v1/categories",
            Some(json!({"title": "Other", "slug": "lighting"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn products_by_unknown_category_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/category/{}", Uuid::new_v4()),
            None,
        )
        .await;
    let body = assert_status(response, StatusCode::NOT_FOUND).await;
    assert!(body["message"].as_str().unwrap().contains("Category"));
}
