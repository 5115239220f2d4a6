use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::http_error::AppError;

pub const OPERATOR_TOKEN_HEADER: &str = "x-operator-token";

/// Gate for operator-only endpoints. With no token configured the endpoint
/// is closed to everyone.
pub async fn require_operator(
    State(expected): State<Option<Arc<str>>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = expected else {
        return Err(AppError::new(StatusCode::FORBIDDEN, "operatorEndpointDisabled").with_code("forbidden"));
    };
    let presented = req
        .headers()
        .get(OPERATOR_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("missing operator token").with_code("missing_token"))?;
    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        tracing::warn!("rejected operator request with bad token");
        return Err(AppError::new(StatusCode::FORBIDDEN, "invalidOperatorToken").with_code("forbidden"));
    }
    Ok(next.run(req).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
