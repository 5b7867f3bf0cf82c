//! HTTP surface the browser talks to.
//!
//! A thin proxy over the backend REST API: each handler validates identity
//! and role, then forwards. Bodies pass through untouched except catalog
//! reads (display-price enrichment), order history (status normalization),
//! and the cart routes, which are served from the session layer instead of
//! being proxied.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

use crate::backend::{payload, BackendApi, HttpBackend};
use crate::domain::discount::{self, Discount};
use crate::gateway::auth::AuthUser;
use crate::session::registry::SessionRegistry;
use crate::session::CartStore;
use crate::StorefrontError;

pub mod auth;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<HttpBackend>,
    pub sessions: Arc<SessionRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/products", get(list_products))
        .route("/api/products/:id", get(get_product))
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/user/:id", get(list_user_orders))
        .route("/api/productreviews", post(create_review))
        .route("/api/productreviews/:product_id", get(list_reviews))
        .route("/api/coupon/code/:code", get(get_coupon))
        .route("/api/promocode/code/:code", get(get_promocode))
        .route(
            "/api/favorite/:id",
            get(get_favorite).post(add_favorite).delete(remove_favorite),
        )
        .route("/api/user/upload-image", post(upload_image))
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route("/api/cart/items", post(add_cart_item))
        .route(
            "/api/cart/items/:id",
            put(update_cart_item).delete(remove_cart_item),
        )
        .route("/api/cart/reload", post(reload_cart))
        .route("/api/session", delete(end_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "storefront-session" }))
}

// =============================================================================
// Forwarding helpers
// =============================================================================

fn with_query(path: &str, query: &Option<String>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_string(),
    }
}

fn bad_gateway(err: StorefrontError, path: &str) -> Response {
    warn!(%err, path, "backend forward failed");
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": "Backend unavailable" })),
    )
        .into_response()
}

fn validation_error(errors: validator::ValidationErrors) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Invalid request", "details": errors })),
    )
        .into_response()
}

async fn relay(
    state: &AppState,
    method: Method,
    path: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> Response {
    let request_id = Uuid::new_v4();
    debug!(%request_id, %method, path, "forwarding to backend");
    match state.backend.forward(method, path, bearer, body).await {
        Ok((status, body)) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(body)).into_response()
        }
        Err(err) => bad_gateway(err, path),
    }
}

// =============================================================================
// Catalog
// =============================================================================

async fn load_discounts(state: &AppState) -> Vec<Discount> {
    match state.backend.fetch_discounts().await {
        Ok(raw) => payload::normalize_discounts(&raw),
        Err(err) => {
            warn!(%err, "discount fetch failed, showing original prices");
            Vec::new()
        }
    }
}

/// Attaches `discountedPrice` to every product an active campaign covers.
/// Handles bare arrays, wrapped collections, and single product objects.
fn enrich_products(body: &mut Value, discounts: &[Discount]) {
    if let Value::Array(items) = body {
        for item in items.iter_mut() {
            enrich_product(item, discounts);
        }
        return;
    }
    for key in ["items", "Items", "data", "products", "Products"] {
        if let Some(Value::Array(items)) = body.get_mut(key) {
            for item in items.iter_mut() {
                enrich_product(item, discounts);
            }
            return;
        }
    }
    enrich_product(body, discounts);
}

fn enrich_product(raw: &mut Value, discounts: &[Discount]) {
    let Ok(product) = payload::normalize_product(raw) else {
        return;
    };
    let Some(campaign) = discount::resolve(discounts, product.id) else {
        return;
    };
    if let Value::Object(map) = raw {
        map.insert(
            "discountedPrice".to_string(),
            json!(discount::discounted_price(product.price, campaign.percentage)),
        );
    }
}

async fn list_products(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let path = with_query("/api/product", &query);
    let (status, mut body) = match state.backend.forward(Method::GET, &path, None, None).await {
        Ok(result) => result,
        Err(err) => return bad_gateway(err, &path),
    };
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    if status.is_success() {
        let discounts = load_discounts(&state).await;
        enrich_products(&mut body, &discounts);
    }
    (status, Json(body)).into_response()
}

async fn get_product(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let path = format!("/api/product/{id}");
    let (status, mut body) = match state.backend.forward(Method::GET, &path, None, None).await {
        Ok(result) => result,
        Err(err) => return bad_gateway(err, &path),
    };
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    if status.is_success() {
        let discounts = load_discounts(&state).await;
        enrich_product(&mut body, &discounts);
    }
    (status, Json(body)).into_response()
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<i64>,
}

async fn list_categories(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    relay(&state, Method::GET, &with_query("/api/category", &query), None, None).await
}

async fn get_category(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    relay(&state, Method::GET, &format!("/api/category/{id}"), None, None).await
}

async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CategoryRequest>,
) -> Response {
    if !user.is_admin() {
        return auth::forbidden();
    }
    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }
    relay(&state, Method::POST, "/api/category", Some(user.token.as_str()), Some(json!(req))).await
}

async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<CategoryRequest>,
) -> Response {
    if !user.is_admin() {
        return auth::forbidden();
    }
    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }
    relay(
        &state,
        Method::PUT,
        &format!("/api/category/{id}"),
        Some(user.token.as_str()),
        Some(json!(req)),
    )
    .await
}

async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Response {
    if !user.is_admin() {
        return auth::forbidden();
    }
    relay(&state, Method::DELETE, &format!("/api/category/{id}"), Some(user.token.as_str()), None).await
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    items: Vec<OrderItemRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shipping_address: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderItemRequest {
    product_id: i64,
    quantity: u32,
}

async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    RawQuery(query): RawQuery,
) -> Response {
    if !user.is_admin() {
        return auth::forbidden();
    }
    relay(&state, Method::GET, &with_query("/api/order", &query), Some(user.token.as_str()), None).await
}

async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Response {
    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }
    relay(&state, Method::POST, "/api/order", Some(user.token.as_str()), Some(json!(req))).await
}

async fn get_order(State(state): State<AppState>, user: AuthUser, Path(id): Path<i64>) -> Response {
    relay(&state, Method::GET, &format!("/api/order/{id}"), Some(user.token.as_str()), None).await
}

async fn list_user_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Response {
    if user.id != id && !user.is_admin() {
        return auth::forbidden();
    }
    let path = format!("/api/order/user/{id}");
    let (status, body) = match state
        .backend
        .forward(Method::GET, &path, Some(user.token.as_str()), None)
        .await
    {
        Ok(result) => result,
        Err(err) => return bad_gateway(err, &path),
    };
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    if !status.is_success() {
        return (status, Json(body)).into_response();
    }
    (status, Json(payload::normalize_order_summaries(&body))).into_response()
}

// =============================================================================
// Reviews, coupons, favorites, uploads
// =============================================================================

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateReviewRequest {
    product_id: i64,
    #[validate(range(min = 1, max = 5))]
    rating: u8,
    #[validate(length(min = 1, max = 2000))]
    review_text: String,
}

async fn list_reviews(State(state): State<AppState>, Path(product_id): Path<i64>) -> Response {
    relay(
        &state,
        Method::GET,
        &format!("/api/productreviews/{product_id}"),
        None,
        None,
    )
    .await
}

async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateReviewRequest>,
) -> Response {
    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }
    relay(&state, Method::POST, "/api/productreviews", Some(user.token.as_str()), Some(json!(req))).await
}

async fn get_coupon(State(state): State<AppState>, user: AuthUser, Path(code): Path<String>) -> Response {
    relay(&state, Method::GET, &format!("/api/coupon/code/{code}"), Some(user.token.as_str()), None).await
}

async fn get_promocode(
    State(state): State<AppState>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Response {
    relay(&state, Method::GET, &format!("/api/promocode/code/{code}"), Some(user.token.as_str()), None).await
}

async fn get_favorite(State(state): State<AppState>, user: AuthUser, Path(id): Path<i64>) -> Response {
    relay(&state, Method::GET, &format!("/api/favorite/{id}"), Some(user.token.as_str()), None).await
}

async fn add_favorite(State(state): State<AppState>, user: AuthUser, Path(id): Path<i64>) -> Response {
    relay(&state, Method::POST, &format!("/api/favorite/{id}"), Some(user.token.as_str()), None).await
}

async fn remove_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Response {
    relay(&state, Method::DELETE, &format!("/api/favorite/{id}"), Some(user.token.as_str()), None).await
}

async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    match state
        .backend
        .forward_bytes(
            Method::POST,
            "/api/user/upload-image",
            Some(user.token.as_str()),
            content_type,
            body.to_vec(),
        )
        .await
    {
        Ok((status, body)) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(body)).into_response()
        }
        Err(err) => bad_gateway(err, "/api/user/upload-image"),
    }
}

// =============================================================================
// Cart session routes
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct AddCartItemRequest {
    product_id: i64,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct UpdateCartItemRequest {
    quantity: u32,
}

fn respond_with_cart(store: &CartStore<HttpBackend>) -> Response {
    match store.cart() {
        Some(cart) => Json(cart).into_response(),
        None => Json(Value::Null).into_response(),
    }
}

fn cart_load_failed(store: &CartStore<HttpBackend>) -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": store.last_error().unwrap_or("Could not load your cart.") })),
    )
        .into_response()
}

fn cart_mutation_failed(store: &CartStore<HttpBackend>) -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": store.last_error().unwrap_or("The cart could not be updated.") })),
    )
        .into_response()
}

async fn get_cart(State(state): State<AppState>, user: AuthUser) -> Response {
    let store = state.sessions.store_for(user.id, &user.token).await;
    let mut store = store.lock().await;
    let loaded = store.load_cart().await.is_some();
    if loaded {
        respond_with_cart(&store)
    } else {
        cart_load_failed(&store)
    }
}

async fn add_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AddCartItemRequest>,
) -> Response {
    if let Err(errors) = req.validate() {
        return validation_error(errors);
    }
    let store = state.sessions.store_for(user.id, &user.token).await;
    let mut store = store.lock().await;
    if store.add_product_to_cart(req.product_id, req.quantity).await {
        respond_with_cart(&store)
    } else {
        cart_mutation_failed(&store)
    }
}

async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCartItemRequest>,
) -> Response {
    let store = state.sessions.store_for(user.id, &user.token).await;
    let mut store = store.lock().await;
    if store.update_cart_item_quantity(id, req.quantity).await {
        respond_with_cart(&store)
    } else {
        cart_mutation_failed(&store)
    }
}

async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Response {
    let store = state.sessions.store_for(user.id, &user.token).await;
    let mut store = store.lock().await;
    if store.remove_cart_item(id).await {
        respond_with_cart(&store)
    } else {
        cart_mutation_failed(&store)
    }
}

async fn clear_cart(State(state): State<AppState>, user: AuthUser) -> Response {
    let store = state.sessions.store_for(user.id, &user.token).await;
    let mut store = store.lock().await;
    if store.clear_cart().await {
        respond_with_cart(&store)
    } else {
        cart_mutation_failed(&store)
    }
}

async fn reload_cart(State(state): State<AppState>, user: AuthUser) -> Response {
    let store = state.sessions.store_for(user.id, &user.token).await;
    let mut store = store.lock().await;
    if store.force_reload_cart().await {
        respond_with_cart(&store)
    } else {
        cart_load_failed(&store)
    }
}

async fn end_session(State(state): State<AppState>, user: AuthUser) -> Response {
    state.sessions.end_session(user.id).await;
    StatusCode::NO_CONTENT.into_response()
}
