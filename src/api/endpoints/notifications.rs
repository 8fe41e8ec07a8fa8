//! In-app notification feed for the authenticated user.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde_json::json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::auth::token::AuthClaims;
use crate::db::repository as repo;
use crate::models::notification::Notification;

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let conn = ctx.conn();
    Ok(Json(repo::notifications_for_user(&conn, &claims.sub, 50)?))
}

pub async fn mark_read(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = ctx.conn();
    if !repo::mark_notification_read(&conn, &id, &claims.sub)? {
        return Err(ApiError::NotFound("notification".into()));
    }
    Ok(Json(json!({ "message": "notification marked read" })))
}

pub async fn mark_all_read(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = ctx.conn();
    let updated = repo::mark_all_notifications_read(&conn, &claims.sub)?;
    Ok(Json(json!({ "updated": updated })))
}
