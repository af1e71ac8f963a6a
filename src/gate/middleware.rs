use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use super::{extract_api_key, AuthContext, Gate};
use crate::validation::{Outcome, ValidationEngine, ValidationRequest};

#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<Gate>,
    pub engine: Arc<ValidationEngine>,
    pub body_limit: usize,
}

/// Resolves the caller's key and attaches an [`AuthContext`]. Must run before
/// [`validation_middleware`].
pub async fn auth_middleware(
    State(state): State<GateState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let key = extract_api_key(req.headers(), req.uri().query());
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    let context = state
        .gate
        .authenticate(key.as_deref())
        .await
        .map_err(|e| {
            log::error!("Failed to resolve API key for {} {}: {}", method, path, e);
            StatusCode::from(e)
        })?;

    let Some(context) = context else {
        log::warn!(
            "AUDIT DENIED method={} path={} reason={}",
            method,
            path,
            if key.is_some() { "unknown_key" } else { "missing_key" }
        );
        return Err(StatusCode::UNAUTHORIZED);
    };

    let owner = context
        .app_id
        .map_or_else(|| "local".to_string(), |id| id.to_string());
    req.extensions_mut().insert(context);

    let response = next.run(req).await;

    log::info!(
        "AUDIT app={} method={} path={} status={}",
        owner,
        method,
        path,
        response.status().as_u16()
    );

    Ok(response)
}

/// Validates the request against its route schema, checks the decoded app id
/// against the caller's scopes, and hands the decoded values to the handler
/// as a [`crate::validation::ValidatedValues`] extension.
pub async fn validation_middleware(
    State(state): State<GateState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();

    let bytes = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Rejected body for {} {}: {}", parts.method, parts.uri.path(), e);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    // Non-JSON bodies are validated as if no body was sent.
    let body_value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    let mut request = ValidationRequest::new(parts.method.clone(), parts.uri.path())
        .with_body(body_value)
        .with_query_string(parts.uri.query().unwrap_or(""));

    match state.engine.validate(&mut request).await {
        Outcome::Unvalidated => {}
        Outcome::Rejected { status, message } => {
            return (status, message).into_response();
        }
        Outcome::Validated(values) => {
            let context = parts.extensions.get::<AuthContext>();
            if let Err(e) = state.gate.authorize(context, &values) {
                log::warn!(
                    "AUDIT DENIED app={:?} method={} path={} reason=out_of_scope",
                    context.and_then(|c| c.app_id),
                    parts.method,
                    parts.uri.path()
                );
                return (StatusCode::from(e), "Unauthorized").into_response();
            }
            parts.extensions.insert(values);
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
