//! Pharmacist directory and the pharmacist's own profile.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{require_role, ApiContext};
use crate::auth::token::AuthClaims;
use crate::db::repository as repo;
use crate::models::enums::Role;
use crate::models::user::{ProviderListing, User};

pub async fn list(
    State(ctx): State<ApiContext>,
) -> Result<Json<Vec<ProviderListing>>, ApiError> {
    let conn = ctx.conn();
    Ok(Json(repo::list_pharmacists(&conn)?))
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProviderListing>, ApiError> {
    let conn = ctx.conn();
    Ok(Json(repo::get_pharmacist_listing(&conn, &id)?))
}

pub async fn get_profile(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&claims, &[Role::Pharmacist])?;
    let conn = ctx.conn();
    let user = repo::get_user(&conn, &claims.sub)?;
    let pharmacist = repo::pharmacist_by_user(&conn, &claims.sub)?
        .ok_or_else(|| ApiError::Forbidden("caller has no pharmacist profile".into()))?;
    Ok(Json(json!({
        "user": user,
        "license_number": pharmacist.license_number,
        "pharmacy_name": pharmacist.pharmacy_name,
        "pharmacy_address": pharmacist.pharmacy_address,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PharmacistProfileRequest {
    #[serde(flatten)]
    pub user: repo::UserProfileUpdate,
    #[serde(flatten)]
    pub pharmacist: repo::PharmacistProfileUpdate,
}

pub async fn update_profile(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<PharmacistProfileRequest>,
) -> Result<Json<User>, ApiError> {
    require_role(&claims, &[Role::Pharmacist])?;
    let conn = ctx.conn();
    repo::update_user_profile(&conn, &claims.sub, &body.user)?;
    repo::update_pharmacist_profile(&conn, &claims.sub, &body.pharmacist)?;
    Ok(Json(repo::get_user(&conn, &claims.sub)?))
}
