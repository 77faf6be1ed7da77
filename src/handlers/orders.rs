use crate::handlers::common::success_response;
use crate::{auth::AuthUser, errors::ServiceError, AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Creates the router for order endpoints.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_order))
        .route("/", get(list_orders))
        .route("/{order_id}", get(get_order))
}

/// Checkout: convert the user's cart into an order and return the payment
/// redirect
async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.orders.create_order(user.id).await?;
    Ok(success_response(response))
}

/// Order history of the authenticated user (items omitted)
async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_orders(user.id).await?;
    Ok(success_response(orders))
}

/// Full order view with items
async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;

    // a user only sees their own orders; admins see everything
    if !user.is_admin && order.user_id.is_some() && order.user_id != Some(user.id) {
        return Err(ServiceError::NotFound("Order".to_string()));
    }

    Ok(success_response(order))
}
