use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        AdminResponse, AuthResponse, LoginRequest, MessageResponse, PrivateResponse, PublicUser,
        RegisterRequest, UpdateMeRequest, UpdatedUser,
    },
    extractors::CurrentUser,
    middleware::{require_admin, require_auth},
    repo::UserProfile,
    services,
};
use crate::{error::AppError, state::AppState};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/public", get(public))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn me_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/private", get(private))
        .route("/me", axum::routing::patch(update_me))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

pub fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin", get(admin))
        .route("/users", get(list_users))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(p)| p)
        .map_err(|e| AppError::invalid_input(e.body_text()))
}

async fn public() -> Json<MessageResponse> {
    Json(services::public_info())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = services::register(&state, body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(services::login(&state, body(payload)?).await?))
}

#[instrument(skip_all, fields(user_id = claims.sub))]
pub async fn private(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<PrivateResponse>, AppError> {
    let user = services::get_self(&state, &claims).await?;
    Ok(Json(PrivateResponse {
        message: "private route for authenticated users",
        user,
    }))
}

#[instrument(skip_all, fields(user_id = claims.sub))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    payload: Result<Json<UpdateMeRequest>, JsonRejection>,
) -> Result<Json<UpdatedUser>, AppError> {
    Ok(Json(services::update_self(&state, &claims, body(payload)?).await?))
}

#[instrument(skip_all, fields(user_id = claims.sub))]
pub async fn admin(CurrentUser(claims): CurrentUser) -> Json<AdminResponse> {
    Json(services::admin_info(&claims))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserProfile>>, AppError> {
    Ok(Json(services::list_users(&state).await?))
}
