//! Doctor directory and the doctor's own profile and patient roster.

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
use crate::models::user::{PatientListing, ProviderListing, User};

use super::require_doctor_profile;

pub async fn list(
    State(ctx): State<ApiContext>,
) -> Result<Json<Vec<ProviderListing>>, ApiError> {
    let conn = ctx.conn();
    Ok(Json(repo::list_doctors(&conn)?))
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProviderListing>, ApiError> {
    let conn = ctx.conn();
    Ok(Json(repo::get_doctor_listing(&conn, &id)?))
}

pub async fn get_profile(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&claims, &[Role::Doctor])?;
    let conn = ctx.conn();
    let user = repo::get_user(&conn, &claims.sub)?;
    let doctor = require_doctor_profile(&conn, &claims)?;
    Ok(Json(json!({
        "user": user,
        "specialty": doctor.specialty,
        "license_number": doctor.license_number,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DoctorProfileRequest {
    #[serde(flatten)]
    pub user: repo::UserProfileUpdate,
    #[serde(flatten)]
    pub doctor: repo::DoctorProfileUpdate,
}

pub async fn update_profile(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<DoctorProfileRequest>,
) -> Result<Json<User>, ApiError> {
    require_role(&claims, &[Role::Doctor])?;
    let conn = ctx.conn();
    require_doctor_profile(&conn, &claims)?;
    repo::update_user_profile(&conn, &claims.sub, &body.user)?;
    repo::update_doctor_profile(&conn, &claims.sub, &body.doctor)?;
    Ok(Json(repo::get_user(&conn, &claims.sub)?))
}

/// Roster of patients related to this doctor through the care team.
pub async fn list_patients(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<Vec<PatientListing>>, ApiError> {
    require_role(&claims, &[Role::Doctor])?;
    let conn = ctx.conn();
    let doctor = require_doctor_profile(&conn, &claims)?;
    Ok(Json(repo::patients_for_doctor(&conn, &doctor.id)?))
}
