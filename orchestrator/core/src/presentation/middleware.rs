// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Axum bindings for the admission pipeline.
//!
//! Global layers (outermost first): [`circuit_breaker`], panic catcher,
//! request tracing, [`rate_limit`], [`authenticate`]. Route groups then add
//! [`require_role`], [`bulkhead`] and [`idempotency`] in that order via
//! `route_layer`, so unmatched paths never consume a bulkhead slot.

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::presentation::api::AppState;
use crate::presentation::auth::{Caller, JwtIdentity, Role};
use crate::presentation::error::{AdmissionRejected, ApiError};
use crate::resilience::{BreakerState, CachedResponse, CallOutcome, WorkloadClass, IDEMPOTENCY_HEADER};

/// Paths served without a bearer token.
const PUBLIC_PATHS: &[&str] = &["/health", "/auth/token"];

/// Breaker key for a request: `"{METHOD} {route template}"`.
pub fn route_key(method: &Method, matched: &str) -> String {
    format!("{method} {matched}")
}

pub async fn circuit_breaker(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let Some(matched) = req.extensions().get::<MatchedPath>() else {
        return next.run(req).await;
    };
    let route = route_key(req.method(), matched.as_str());
    let breaker = state.resilience.breakers.get(&route);

    let Some(ticket) = breaker.try_acquire() else {
        warn!(route = %route, "Circuit open, rejecting request");
        return ApiError::circuit_open().into_response();
    };
    if ticket.is_probe() {
        info!(route = %route, "Circuit half-open, admitting probe");
    }

    let response = next.run(req).await;

    let outcome = if response.extensions().get::<AdmissionRejected>().is_some() {
        CallOutcome::Ignored
    } else {
        CallOutcome::from_status(response.status().as_u16())
    };
    let before = breaker.state();
    let after = breaker.record(ticket, outcome);
    if before != after {
        match after {
            BreakerState::Open => warn!(route = %route, "Circuit opened"),
            BreakerState::Closed => info!(route = %route, "Circuit closed"),
            BreakerState::HalfOpen => {}
        }
    }
    response
}

/// Client identity for rate limiting: first `X-Forwarded-For` hop, else the
/// peer address.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(req.headers(), peer);

    if !state.resilience.rate_limiter.allow(&identity).await {
        return ApiError::rate_limited().into_response();
    }
    next.run(req).await
}

pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(JwtIdentity::extract_from_header)
        .ok_or_else(|| ApiError::unauthorized("missing or malformed authorization header"))?;

    let caller = state.identity.verify(token).map_err(|e| {
        warn!(uri = %req.uri(), error = %e, "Authentication failed");
        ApiError::from(e)
    })?;

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

pub async fn require_role(State(role): State<Role>, req: Request, next: Next) -> Result<Response, ApiError> {
    let caller = req
        .extensions()
        .get::<Caller>()
        .ok_or_else(|| ApiError::unauthorized("authentication required"))?;

    if caller.role != role {
        warn!(
            subject = %caller.subject,
            role = %caller.role,
            required = %role,
            "Permission denied"
        );
        return Err(ApiError::forbidden());
    }
    Ok(next.run(req).await)
}

pub async fn bulkhead(
    State((state, class)): State<(Arc<AppState>, WorkloadClass)>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(_permit) = state.resilience.bulkheads.try_acquire(class) else {
        warn!(class = %class, "Bulkhead full, rejecting request");
        return Err(ApiError::capacity_exceeded(class));
    };
    Ok(next.run(req).await)
}

/// Replays the stored response for a repeated `Idempotency-Key` from the same
/// caller. Safe methods pass straight through.
pub async fn idempotency(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    if matches!(*req.method(), Method::GET | Method::HEAD) {
        return next.run(req).await;
    }
    let Some(client_key) = req
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
    else {
        return next.run(req).await;
    };
    let Some(subject) = req.extensions().get::<Caller>().map(|c| c.subject.clone()) else {
        return next.run(req).await;
    };

    let cache = &state.resilience.idempotency;
    let Some(_claim) = cache.claim(&subject, &client_key) else {
        warn!(subject = %subject, key = %client_key, "Duplicate request while first is in flight");
        return ApiError::idempotency_in_progress().into_response();
    };
    if let Some(cached) = cache.lookup(&subject, &client_key).await {
        info!(subject = %subject, key = %client_key, "Replaying idempotent response");
        return replay(cached);
    }

    let response = next.run(req).await;
    if !response.status().is_success() {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to buffer response for idempotency");
            return ApiError::internal().into_response();
        }
    };

    let captured = CachedResponse {
        status: parts.status.as_u16(),
        content_type: parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: bytes.to_vec(),
    };
    cache.remember(&subject, &client_key, &captured).await;

    Response::from_parts(parts, Body::from(bytes))
}

fn replay(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = (status, Bytes::from(cached.body)).into_response();
    let headers = response.headers_mut();
    headers.remove(header::CONTENT_TYPE);
    if let Some(value) = cached
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }
    response
}
