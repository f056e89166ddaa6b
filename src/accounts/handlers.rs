use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{instrument, warn};

use super::dto::{AccountRequest, AccountView};
use crate::state::AppState;

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<AccountView>>, (StatusCode, String)> {
    let accounts = state.accounts.find_all_users().await?;
    Ok(Json(accounts.into_iter().map(AccountView::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AccountView>, (StatusCode, String)> {
    let account = state.accounts.find_user_by_id(id).await?;
    Ok(Json(account.into()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<AccountRequest>,
) -> Result<(StatusCode, [(header::HeaderName, String); 1], Json<AccountView>), (StatusCode, String)> {
    let account = state
        .accounts
        .add_user(&payload.username, &payload.password, &payload.email)
        .await
        .map_err(|e| {
            warn!(error = %e, kind = e.kind(), username = %payload.username, "create user rejected");
            e
        })?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/users/{}", account.id))],
        Json(account.into()),
    ))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AccountRequest>,
) -> Result<Json<AccountView>, (StatusCode, String)> {
    let account = state
        .accounts
        .update_user(id, &payload.username, &payload.password, &payload.email)
        .await
        .map_err(|e| {
            warn!(error = %e, kind = e.kind(), "update user rejected");
            e
        })?;
    Ok(Json(account.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.accounts.delete_user_by_id(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
