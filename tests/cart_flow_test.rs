mod common;

use axum::http::{Method, StatusCode};
use common::{as_decimal, assert_status, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn cart_is_created_lazily_and_starts_empty() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart", None)
        .await;
    let body = assert_status(response, StatusCode::OK).await;

    assert_eq!(body["user_id"], app.user.id.to_string());
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["total_quantity"], 0);
    assert_eq!(as_decimal(&body["total_price"]), dec!(0));
}

#[tokio::test]
async fn cart_requires_authentication() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/cart", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn adding_same_product_twice_merges_lines() {
    let app = TestApp::new().await;
    let category = app.seed_category("Lighting").await;
    let product = app
        .seed_product(category.id, "Desk lamp", dec!(10.00))
        .await;

    let payload = json!({"product_id": product.id, "quantity": 1});
    let response = app
        .request_authenticated(Method::POST, "/api/v1/cart/items", Some(payload.clone()))
        .await;
    assert_status(response, StatusCode::OK).await;

    let response = app
        .request_authenticated(Method::POST, "/api/v1/cart/items", Some(payload))
        .await;
    let body = assert_status(response, StatusCode::OK).await;

    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1, "merged into a single line");
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(body["total_quantity"], 2);
    assert_eq!(as_decimal(&body["total_price"]), dec!(20.00));
}

#[tokio::test]
async fn adding_unknown_product_fails() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"product_id": Uuid::new_v4(), "quantity": 1})),
        )
        .await;
    let body = assert_status(response, StatusCode::NOT_FOUND).await;
    assert!(body["message"].as_str().unwrap().contains("Product"));
}

#[tokio::test]
async fn update_quantity_and_remove_line() {
    let app = TestApp::new().await;
    let category = app.seed_category("Office").await;
    let product = app.seed_product(category.id, "Chair", dec!(75.00)).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"product_id": product.id, "quantity": 2})),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{item_id}"),
            Some(json!({"quantity": 5})),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["items"][0]["quantity"], 5);
    assert_eq!(as_decimal(&body["total_price"]), dec!(375.00));

    let response = app
        .request_authenticated(
            Method::DELETE,
            &format!("/api/v1/cart/items/{item_id}"),
            None,
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
    assert_eq!(body["total_quantity"], 0);
}

#[tokio::test]
async fn updating_unknown_item_leaves_cart_unchanged() {
    let app = TestApp::new().await;
    let category = app.seed_category("Office").await;
    let product = app.seed_product(category.id, "Desk", dec!(200.00)).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"product_id": product.id, "quantity": 3})),
        )
        .await;
    assert_status(response, StatusCode::OK).await;

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{}", Uuid::new_v4()),
            Some(json!({"quantity": 1})),
        )
        .await;
    let body = assert_status(response, StatusCode::NOT_FOUND).await;
    assert!(body["message"].as_str().unwrap().contains("Item"));

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart", None)
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["items"][0]["quantity"], 3, "cart must be unchanged");
}

#[tokio::test]
async fn zero_quantity_update_is_rejected() {
    let app = TestApp::new().await;
    let category = app.seed_category("Office").await;
    let product = app.seed_product(category.id, "Desk", dec!(200.00)).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"product_id": product.id, "quantity": 1})),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    let item_id = body["items"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/items/{item_id}"),
            Some(json!({"quantity": 0})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn clear_cart_is_idempotent() {
    let app = TestApp::new().await;
    let category = app.seed_category("Office").await;
    let product = app.seed_product(category.id, "Desk", dec!(200.00)).await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"product_id": product.id, "quantity": 2})),
        )
        .await;
    assert_status(response, StatusCode::OK).await;

    let response = app
        .request_authenticated(Method::DELETE, "/api/v1/cart/clear", None)
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 0);

    // clearing an already-empty cart succeeds as a no-op
    let response = app
        .request_authenticated(Method::DELETE, "/api/v1/cart/clear", None)
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["total_quantity"], 0);
}

#[tokio::test]
async fn cart_view_tracks_live_catalog_changes() {
    let app = TestApp::new().await;
    let category = app.seed_category("Lighting").await;
    let product = app
        .seed_product(category.id, "Floor lamp", dec!(100.00))
        .await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"product_id": product.id, "quantity": 1})),
        )
        .await;
    assert_status(response, StatusCode::OK).await;

    // reprice and rename through the admin surface
    let response = app
        .request_as_admin(
            Method::PUT,
            &format!("/api/v1/products/{}", product.id),
            Some(json!({"price": 125.50, "title": "Arc floor lamp"})),
        )
        .await;
    assert_status(response, StatusCode::OK).await;

    let response = app
        .request_authenticated(Method::GET, "/api/v1/cart", None)
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["items"][0]["product_title"], "Arc floor lamp");
    assert_eq!(as_decimal(&body["items"][0]["price"]), dec!(125.50));
    assert_eq!(as_decimal(&body["total_price"]), dec!(125.50));
}
