//! Role dashboards. Each widget degrades independently; the payload is
//! always served and stamped with an `X-Data-Source` header.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::{require_role, ApiContext};
use crate::auth::token::AuthClaims;
use crate::dashboard;
use crate::models::enums::Role;

use super::{require_doctor_profile, require_patient_profile, today};

const DATA_SOURCE: (&str, &str) = ("x-data-source", "sqlite");

pub async fn patient(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, &[Role::Patient])?;
    let conn = ctx.conn();
    let patient = require_patient_profile(&conn, &claims)?;
    let body = dashboard::patient_dashboard(&conn, &patient.id, today());
    Ok(([DATA_SOURCE], Json(body)))
}

pub async fn doctor(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, &[Role::Doctor])?;
    let conn = ctx.conn();
    let doctor = require_doctor_profile(&conn, &claims)?;
    let body = dashboard::doctor_dashboard(&conn, &doctor.id, &claims.sub, today());
    Ok(([DATA_SOURCE], Json(body)))
}

pub async fn admin(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, &[Role::Admin])?;
    let conn = ctx.conn();
    let body = dashboard::admin_dashboard(&conn);
    Ok(([DATA_SOURCE], Json(body)))
}
