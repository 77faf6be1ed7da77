use crate::handlers::common::{created_response, no_content_response, success_response};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::categories::{CreateCategoryInput, UpdateCategoryInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use uuid::Uuid;

/// Creates the router for category endpoints. Reads are public; mutations
/// require an administrator.
pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/", post(create_category))
        .route("/{id}", get(get_category))
        .route("/{id}", put(update_category))
        .route("/{id}", delete(delete_category))
        .route("/slug/{slug}", get(get_category_by_slug))
}

async fn list_categories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let categories = state.services.categories.get_all().await?;
    Ok(success_response(categories))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let category = state.services.categories.get_by_id(id).await?;
    Ok(success_response(category))
}

async fn get_category_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let category = state.services.categories.get_by_slug(&slug).await?;
    Ok(success_response(category))
}

async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCategoryInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let category = state.services.categories.create(payload).await?;
    Ok(created_response(category))
}

async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryInput>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    let category = state.services.categories.update(id, payload).await?;
    Ok(success_response(category))
}

async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_admin()?;
    state.services.categories.delete(id).await?;
    Ok(no_content_response())
}
