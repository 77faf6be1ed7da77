use crate::{errors::ServiceError, AppState};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{error, info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Creates the router for inbound payment-provider webhooks.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/yookassa", post(yookassa_webhook))
}

/// Inbound payment notification.
///
/// Delivery is at-least-once, so the whole handler is replay-safe. Internal
/// failures are reported in a 200 body rather than a 5xx: the provider must
/// not endlessly retry a non-retriable error. Only a bad signature is
/// answered with 401.
async fn yookassa_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = state.config.payment.webhook_secret.as_deref() {
        if !verify_signature(
            &headers,
            &body,
            secret,
            state.config.payment.webhook_tolerance_secs,
        ) {
            warn!("payment webhook signature verification failed");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"status": "error", "message": "invalid webhook signature"})),
            )
                .into_response();
        }
    }

    match process_notification(&state, &body).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))).into_response(),
        Err(err) => {
            error!(error = %err, "payment webhook processing failed");
            (
                StatusCode::OK,
                Json(json!({"status": "error", "message": err.response_message()})),
            )
                .into_response()
        }
    }
}

async fn process_notification(state: &AppState, body: &[u8]) -> Result<(), ServiceError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {e}")))?;

    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default();

    match event {
        "payment.succeeded" => {
            let object = payload
                .get("object")
                .cloned()
                .ok_or_else(|| {
                    ServiceError::ValidationError("webhook payload missing object".into())
                })?;

            let payment_id = object
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| ServiceError::ValidationError("webhook object missing id".into()))?
                .to_string();

            let Some(order_id) = extract_order_id(&object)? else {
                warn!(%payment_id, "payment notification without order metadata");
                return Ok(());
            };

            state
                .services
                .orders
                .apply_payment_update(order_id, payment_id, object)
                .await?;

            info!(%order_id, "order marked as paid");
        }
        "payment.canceled" => {
            let Some(order_id) = payload
                .get("object")
                .map(|object| extract_order_id(object))
                .transpose()?
                .flatten()
            else {
                warn!("cancellation notification without order metadata");
                return Ok(());
            };

            state.services.orders.mark_cancelled(order_id).await?;
            info!(%order_id, "order marked as cancelled");
        }
        _ => {
            info!(event, "ignoring payment webhook event");
        }
    }

    Ok(())
}

fn extract_order_id(object: &Value) -> Result<Option<Uuid>, ServiceError> {
    let Some(raw) = object.pointer("/metadata/order_id").and_then(Value::as_str) else {
        return Ok(None);
    };

    Uuid::parse_str(raw)
        .map(Some)
        .map_err(|_| {
            ServiceError::ValidationError(format!("metadata order_id is not a valid id: {raw}"))
        })
}

/// HMAC-SHA256 over `"{timestamp}.{body}"` with `x-timestamp` and
/// `x-signature` headers. The timestamp must fall within the tolerance
/// window.
fn verify_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let (Some(ts), Some(sig)) = (
        headers.get("x-timestamp").and_then(|h| h.to_str().ok()),
        headers.get("x-signature").and_then(|h| h.to_str().ok()),
    ) else {
        return false;
    };

    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return false;
    }

    let signed = format!("{ts}.{}", std::str::from_utf8(payload).unwrap_or(""));
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(signed.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
