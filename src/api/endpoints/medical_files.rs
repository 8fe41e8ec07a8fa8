//! Medical file access by id: the patient who owns it, doctors on the
//! patient's care team, and admins. Every read and write is recorded in
//! the access log.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::auth::token::AuthClaims;
use crate::db::repository as repo;
use crate::models::enums::Role;
use crate::models::medical_file::{EmergencyContact, Insurance, MedicalFile, VitalsEntry};

use super::{require_doctor_profile, require_patient_profile};

fn authorize_file_access(
    conn: &Connection,
    claims: &AuthClaims,
    file: &MedicalFile,
) -> Result<(), ApiError> {
    match claims.role {
        Role::Admin => Ok(()),
        Role::Patient => {
            let patient = require_patient_profile(conn, claims)?;
            if file.patient_id == patient.id {
                Ok(())
            } else {
                Err(ApiError::Forbidden("not your medical file".into()))
            }
        }
        Role::Doctor => {
            let doctor = require_doctor_profile(conn, claims)?;
            if repo::care_team_exists(conn, &file.patient_id, &doctor.id)? {
                Ok(())
            } else {
                Err(ApiError::Forbidden(
                    "patient is not under your care".into(),
                ))
            }
        }
        _ => Err(ApiError::Forbidden(
            "role may not access medical files".into(),
        )),
    }
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = ctx.conn();
    let file = repo::get_file(&conn, &id)?;
    authorize_file_access(&conn, &claims, &file)?;
    repo::log_access(&conn, &file.id, &claims.sub, "viewed")?;
    Ok(Json(json!({
        "file": file,
        "vitals": repo::vitals_for_file(&conn, &file.id)?,
        "allergies": repo::allergies_for_file(&conn, &file.id)?,
        "medications": repo::medications_for_file(&conn, &file.id)?,
        "immunizations": repo::immunizations_for_file(&conn, &file.id)?,
        "lab_results": repo::lab_results_for_file(&conn, &file.id)?,
    })))
}

pub async fn update_emergency_contact(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
    Json(contact): Json<EmergencyContact>,
) -> Result<Json<MedicalFile>, ApiError> {
    let conn = ctx.conn();
    let file = repo::get_file(&conn, &id)?;
    authorize_file_access(&conn, &claims, &file)?;
    repo::update_file_details(
        &conn,
        &id,
        &repo::MedicalFileUpdate {
            emergency_contact: Some(contact),
            ..Default::default()
        },
    )?;
    repo::log_access(&conn, &id, &claims.sub, "updated emergency contact")?;
    Ok(Json(repo::get_file(&conn, &id)?))
}

pub async fn update_insurance(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
    Json(insurance): Json<Insurance>,
) -> Result<Json<MedicalFile>, ApiError> {
    let conn = ctx.conn();
    let file = repo::get_file(&conn, &id)?;
    authorize_file_access(&conn, &claims, &file)?;
    repo::update_file_details(
        &conn,
        &id,
        &repo::MedicalFileUpdate {
            insurance: Some(insurance),
            ..Default::default()
        },
    )?;
    repo::log_access(&conn, &id, &claims.sub, "updated insurance")?;
    Ok(Json(repo::get_file(&conn, &id)?))
}

#[derive(Debug, Deserialize)]
pub struct VitalsRequest {
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
}

/// Care-team doctors record vitals during a visit.
pub async fn record_vitals(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<VitalsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.role != Role::Doctor && claims.role != Role::Admin {
        return Err(ApiError::Forbidden("only doctors record vitals".into()));
    }
    if body.blood_pressure.is_none()
        && body.heart_rate.is_none()
        && body.temperature.is_none()
        && body.weight.is_none()
    {
        return Err(ApiError::validation("at least one measurement is required"));
    }
    let conn = ctx.conn();
    let file = repo::get_file(&conn, &id)?;
    authorize_file_access(&conn, &claims, &file)?;

    let entry = VitalsEntry {
        id: Uuid::new_v4(),
        medical_file_id: id,
        recorded_at: Utc::now().naive_utc(),
        blood_pressure: body.blood_pressure,
        heart_rate: body.heart_rate,
        temperature: body.temperature,
        weight: body.weight,
    };
    repo::insert_vitals(&conn, &entry)?;
    repo::log_access(&conn, &id, &claims.sub, "recorded vitals")?;
    Ok((StatusCode::CREATED, Json(entry)))
}
