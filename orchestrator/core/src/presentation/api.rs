// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP routes and handlers.
//!
//! Handlers only translate between JSON and application services; every
//! decision lives in `crate::application`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::application::{
    AdminService, CancelOutcome, DeliveryOrchestrator, DroneService, JobService, OrderService,
    OrderUpdate,
};
use crate::domain::cache::DroneLocationCache;
use crate::domain::drone::{DroneId, DroneStatus};
use crate::domain::job::JobId;
use crate::domain::location::Location;
use crate::domain::node_config::NodeConfig;
use crate::domain::order::{OrderId, OrderStatus};
use crate::domain::repository::{
    DeliveryStore, DroneRepository, JobRepository, OrderRepository, PageRequest,
};
use crate::domain::routing::RouteDistanceProvider;
use crate::infrastructure::memory_cache::{
    InMemoryDroneLocationCache, InMemoryIdempotencyStore, InMemoryRateLimitBackend,
};
use crate::infrastructure::repositories::InMemoryDeliveryStore;
use crate::presentation::auth::{Caller, JwtIdentity, Role};
use crate::presentation::error::ApiError;
use crate::presentation::middleware;
use crate::resilience::{IdempotencyStore, RateLimitBackend, ResiliencePipeline, WorkloadClass};

/// Storage and cache adapters the HTTP surface runs on.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn DeliveryStore>,
    pub orders: Arc<dyn OrderRepository>,
    pub drones: Arc<dyn DroneRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub location_cache: Arc<dyn DroneLocationCache>,
    pub rate_limit: Arc<dyn RateLimitBackend>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub routes: Option<Arc<dyn RouteDistanceProvider>>,
}

impl Backends {
    /// Process-local backends; state is lost on restart.
    pub fn in_memory() -> Self {
        Self::with_store(InMemoryDeliveryStore::new())
    }

    pub fn with_store(store: InMemoryDeliveryStore) -> Self {
        let store = Arc::new(store);
        Self {
            store: store.clone(),
            orders: store.clone(),
            drones: store.clone(),
            jobs: store,
            location_cache: Arc::new(InMemoryDroneLocationCache::new()),
            rate_limit: Arc::new(InMemoryRateLimitBackend::new()),
            idempotency: Arc::new(InMemoryIdempotencyStore::new()),
            routes: None,
        }
    }
}

pub struct AppState {
    pub orchestrator: Arc<DeliveryOrchestrator>,
    pub orders: Arc<OrderService>,
    pub drones: Arc<DroneService>,
    pub jobs: Arc<JobService>,
    pub admin: Arc<AdminService>,
    pub identity: Arc<JwtIdentity>,
    pub resilience: Arc<ResiliencePipeline>,
    store: Arc<dyn DeliveryStore>,
    location_cache: Arc<dyn DroneLocationCache>,
}

impl AppState {
    pub fn from_config(config: &NodeConfig, backends: Backends) -> Self {
        let zone = config.zone.delivery_zone();
        let orchestrator = Arc::new(DeliveryOrchestrator::new(backends.store.clone()));
        let drones = Arc::new(DroneService::new(
            backends.store.clone(),
            backends.drones.clone(),
            backends.orders.clone(),
            backends.location_cache.clone(),
            zone,
            Duration::from_secs(config.drone.location_cache_ttl_secs),
        ));

        let mut orders = OrderService::new(
            orchestrator.clone(),
            backends.store.clone(),
            backends.orders.clone(),
            drones.clone(),
            zone,
            config.drone.speed_kmh,
        );
        if let Some(routes) = backends.routes.clone() {
            orders = orders.with_routes(routes);
        }

        let resilience = ResiliencePipeline::from_config(
            &config.resilience,
            backends.rate_limit.clone(),
            backends.idempotency.clone(),
        );

        Self {
            orders: Arc::new(orders),
            drones,
            jobs: Arc::new(JobService::new(backends.jobs.clone())),
            admin: Arc::new(AdminService::new(orchestrator.clone())),
            orchestrator,
            identity: Arc::new(JwtIdentity::new(
                &config.auth.jwt_secret,
                config.auth.token_expiry_hours,
            )),
            resilience: Arc::new(resilience),
            store: backends.store,
            location_cache: backends.location_cache,
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/auth/token", post(issue_token));

    let enduser = Router::new()
        .route("/orders", post(place_order).get(list_my_orders))
        .route("/orders/{id}", get(order_details).delete(withdraw_order))
        .route_layer(from_fn_with_state(state.clone(), middleware::idempotency))
        .route_layer(from_fn_with_state(
            (state.clone(), WorkloadClass::Mutation),
            middleware::bulkhead,
        ))
        .route_layer(from_fn_with_state(Role::Enduser, middleware::require_role));

    let drone_heartbeat = Router::new()
        .route("/drone/me/heartbeat", post(heartbeat))
        .route_layer(from_fn_with_state(
            (state.clone(), WorkloadClass::Heartbeat),
            middleware::bulkhead,
        ))
        .route_layer(from_fn_with_state(Role::Drone, middleware::require_role));

    let drone_reads = Router::new()
        .route("/drone/jobs", get(list_open_jobs))
        .route("/drone/me/order", get(current_order))
        .route_layer(from_fn_with_state(Role::Drone, middleware::require_role));

    let drone_mutations = Router::new()
        .route("/drone/jobs/reserve", post(reserve_job))
        .route("/drone/orders/{id}/grab", post(grab_order))
        .route("/drone/orders/{id}/complete", patch(complete_delivery))
        .route("/drone/me/broken", post(report_broken))
        .route_layer(from_fn_with_state(state.clone(), middleware::idempotency))
        .route_layer(from_fn_with_state(
            (state.clone(), WorkloadClass::Mutation),
            middleware::bulkhead,
        ))
        .route_layer(from_fn_with_state(Role::Drone, middleware::require_role));

    let admin = Router::new()
        .route("/admin/orders", get(admin_list_orders))
        .route("/admin/orders/{id}", patch(admin_update_order))
        .route("/admin/drones", get(admin_list_drones))
        .route("/admin/drones/{id}/status", patch(admin_update_drone_status))
        .route_layer(from_fn_with_state(
            (state.clone(), WorkloadClass::Admin),
            middleware::bulkhead,
        ))
        .route_layer(from_fn_with_state(Role::Admin, middleware::require_role));

    Router::new()
        .merge(public)
        .merge(enduser)
        .merge(drone_heartbeat)
        .merge(drone_reads)
        .merge(drone_mutations)
        .merge(admin)
        .layer(from_fn_with_state(state.clone(), middleware::authenticate))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(state.clone(), middleware::circuit_breaker))
        .with_state(state)
}

fn panic_response(_: Box<dyn std::any::Any + Send + 'static>) -> Response {
    tracing::error!("Handler panicked");
    ApiError::internal().into_response()
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    OrderId::from_string(raw).map_err(|_| ApiError::validation("invalid order id"))
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store.ping().await;
    let cache = state.location_cache.ping().await;
    let healthy = database.is_ok() && cache.is_ok();

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let circuits: serde_json::Map<String, serde_json::Value> = state
        .resilience
        .breakers
        .snapshot()
        .into_iter()
        .map(|(route, breaker)| (route, json!(breaker)))
        .collect();
    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "checks": {
            "database": database.map_or_else(|e| e.to_string(), |_| "ok".to_string()),
            "cache": cache.map_or_else(|e| e.to_string(), |_| "ok".to_string()),
        },
        "circuits": circuits,
    });
    (status, Json(body)).into_response()
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub name: String,
    pub role: String,
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let req = json_body(payload)?;
    let role: Role = req.role.parse()?;
    let token = state.identity.issue(&req.name, role)?;
    Ok(Json(json!({ "token": token })))
}

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub origin: Location,
    pub destination: Location,
}

async fn place_order(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(payload)?;
    let (order, _job) = state
        .orders
        .place_order(&caller.subject, req.origin, req.destination)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "order": order }))).into_response())
}

async fn withdraw_order(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let body = match state.orders.withdraw_order(order_id, &caller.subject).await? {
        CancelOutcome::Withdrawn { jobs_cancelled } => json!({
            "message": "order withdrawn",
            "jobs_cancelled": jobs_cancelled,
        }),
        CancelOutcome::NothingToCancel => json!({
            "message": "order already finished, nothing to cancel",
            "jobs_cancelled": 0,
        }),
    };
    Ok(Json(body))
}

async fn order_details(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let order_id = parse_order_id(&id)?;
    let details = state.orders.order_details(order_id, &caller.subject).await?;
    Ok(Json(details).into_response())
}

async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let orders = state.orders.list_mine(&caller.subject).await?;
    Ok(Json(json!({ "orders": orders })))
}

#[derive(Deserialize)]
pub struct HeartbeatRequest {
    pub latitude: f64,
    pub longitude: f64,
}

async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let req = json_body(payload)?;
    let drone_id = DroneId::new(caller.subject);
    let drone = state
        .drones
        .heartbeat(&drone_id, Location::new(req.latitude, req.longitude))
        .await?;

    let mut body = json!({ "drone_status": drone.status() });
    if let Some(order_id) = drone.current_order() {
        body["current_order_id"] = json!(order_id);
    }
    Ok(Json(body))
}

async fn list_open_jobs(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let jobs = state.jobs.list_open().await?;
    Ok(Json(json!({ "jobs": jobs })))
}

async fn current_order(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order = state.drones.current_order(&DroneId::new(caller.subject)).await?;
    Ok(Json(json!({ "order": order })))
}

#[derive(Deserialize)]
pub struct ReserveJobRequest {
    pub job_id: String,
}

async fn reserve_job(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<ReserveJobRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let req = json_body(payload)?;
    let job_id = JobId::from_string(&req.job_id).map_err(|_| ApiError::validation("invalid job id"))?;
    let job = state
        .orchestrator
        .reserve_job_and_assign(job_id, &DroneId::new(caller.subject))
        .await?;
    Ok(Json(json!({ "job": job, "message": "job reserved" })))
}

async fn grab_order(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .orchestrator
        .grab_order(order_id, &DroneId::new(caller.subject))
        .await?;
    Ok(Json(json!({ "message": "order picked up", "order": order })))
}

#[derive(Deserialize)]
pub struct CompleteDeliveryRequest {
    pub status: String,
}

async fn complete_delivery(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    payload: Result<Json<CompleteDeliveryRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let req = json_body(payload)?;
    let delivered = match req.status.as_str() {
        "delivered" => true,
        "failed" => false,
        _ => return Err(ApiError::validation("status must be 'delivered' or 'failed'")),
    };
    let order = state
        .orchestrator
        .complete_delivery(order_id, &DroneId::new(caller.subject), delivered)
        .await?;
    Ok(Json(json!({
        "message": "delivery completed",
        "status": req.status,
        "order": order,
    })))
}

async fn report_broken(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let drone_id = DroneId::new(caller.subject);
    let outcome = state.orchestrator.handle_drone_broken(&drone_id).await?;
    Ok(Json(json!({
        "message": "broken report received",
        "drone_id": drone_id,
        "handoff_job": outcome.handoff_job,
    })))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

fn list_query(query: Result<Query<ListQuery>, QueryRejection>) -> Result<ListQuery, ApiError> {
    query
        .map(|Query(q)| q)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

async fn admin_list_orders(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let q = list_query(query)?;
    let status = q
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.to_uppercase().parse::<OrderStatus>())
        .transpose()?;
    let page = state.orders.list_all(status, PageRequest::new(q.page, q.limit)).await?;
    Ok(Json(json!({
        "orders": page.items,
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
    })))
}

#[derive(Deserialize)]
pub struct AdminUpdateOrderRequest {
    pub origin: Option<Location>,
    pub destination: Option<Location>,
}

async fn admin_update_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AdminUpdateOrderRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let req = json_body(payload)?;
    let order = state
        .orders
        .admin_update(
            order_id,
            OrderUpdate {
                origin: req.origin,
                destination: req.destination,
            },
        )
        .await?;
    Ok(Json(json!({ "order": order })))
}

async fn admin_list_drones(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let q = list_query(query)?;
    let status = q
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.to_uppercase().parse::<DroneStatus>())
        .transpose()?;
    let page = state.drones.list(status, PageRequest::new(q.page, q.limit)).await?;
    Ok(Json(json!({
        "drones": page.items,
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
    })))
}

#[derive(Deserialize)]
pub struct DroneStatusRequest {
    pub status: String,
}

async fn admin_update_drone_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<DroneStatusRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let req = json_body(payload)?;
    let outcome = state
        .admin
        .update_drone_status(&DroneId::new(id), &req.status)
        .await?;
    Ok(Json(json!({
        "message": "drone status updated",
        "status": req.status,
        "handoff_job": outcome.and_then(|o| o.handoff_job),
    })))
}
