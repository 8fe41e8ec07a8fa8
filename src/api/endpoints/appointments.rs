//! Appointment booking and lifecycle.
//!
//! A patient-created appointment starts as `requested`; a doctor-created
//! one as `scheduled`. Creating the first link between a pair also
//! records the care-team relationship.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{paginate, ApiContext, PageQuery, Paginated};
use crate::auth::token::AuthClaims;
use crate::db::repository as repo;
use crate::models::appointment::{Appointment, AppointmentCard};
use crate::models::enums::{AppointmentStatus, Role};
use crate::models::filters::ListFilters;

use super::{caller_scope, require_doctor_profile, require_patient_profile};

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub doctor_id: Option<Uuid>,
    /// Required for doctor-created appointments; ignored for patients.
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub reason: Option<String>,
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<CreateAppointmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = ctx.conn();

    let mut missing = Vec::new();
    if body.date.is_none() {
        missing.push("date");
    }
    if body.time.as_deref().map_or(true, str::is_empty) {
        missing.push("time");
    }

    let (patient_id, doctor_id, status) = match claims.role {
        Role::Patient => {
            if body.doctor_id.is_none() {
                missing.push("doctor_id");
            }
            if !missing.is_empty() {
                return Err(ApiError::missing_fields(&missing));
            }
            let patient = require_patient_profile(&conn, &claims)?;
            let doctor_id = body.doctor_id.unwrap_or_default();
            repo::get_doctor(&conn, &doctor_id)?;
            (patient.id, doctor_id, AppointmentStatus::Requested)
        }
        Role::Doctor => {
            if body.patient_id.is_none() {
                missing.push("patient_id");
            }
            if !missing.is_empty() {
                return Err(ApiError::missing_fields(&missing));
            }
            let doctor = require_doctor_profile(&conn, &claims)?;
            let patient_id = body.patient_id.unwrap_or_default();
            repo::get_patient(&conn, &patient_id)?;
            (patient_id, doctor.id, AppointmentStatus::Scheduled)
        }
        _ => {
            return Err(ApiError::Forbidden(
                "only patients and doctors book appointments".into(),
            ))
        }
    };

    let appointment = Appointment {
        id: Uuid::new_v4(),
        patient_id,
        doctor_id,
        date: body.date.unwrap_or_default(),
        time: body.time.unwrap_or_default(),
        kind: body.kind.unwrap_or_else(|| "consultation".into()),
        reason: body.reason,
        status,
        created_at: Utc::now().naive_utc(),
    };
    repo::insert_appointment(&conn, &appointment)?;
    repo::ensure_care_team(&conn, &patient_id, &doctor_id)?;
    notify_counterpart(&conn, &claims, &appointment, "appointment requested")?;

    tracing::info!(appointment = %appointment.id, status = appointment.status.as_str(), "appointment created");
    Ok((StatusCode::CREATED, Json(appointment)))
}

fn notify_counterpart(
    conn: &Connection,
    claims: &AuthClaims,
    appointment: &Appointment,
    body: &str,
) -> Result<(), ApiError> {
    let recipient = match claims.role {
        Role::Patient => repo::get_doctor(conn, &appointment.doctor_id)
            .map(|d| d.user_id)
            .ok(),
        _ => repo::get_patient(conn, &appointment.patient_id)
            .map(|p| p.user_id)
            .ok(),
    };
    if let Some(user_id) = recipient {
        repo::notify(conn, &user_id, "appointment", body)?;
    }
    Ok(())
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Query(filters): Query<ListFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<AppointmentCard>>, ApiError> {
    let conn = ctx.conn();
    let scope = caller_scope(&conn, &claims, &filters)?;
    let cards = repo::list_appointments_scoped(&conn, &scope, page.limit(), page.offset())?;
    let total = repo::count_appointments_scoped(&conn, &scope)?;
    Ok(Json(paginate(cards, total, &page)))
}

/// Ownership check for single-appointment operations. Pharmacists and
/// admins may read anything; mutation callers must own or be assigned.
fn authorize(
    conn: &Connection,
    claims: &AuthClaims,
    appointment: &Appointment,
    read_only: bool,
) -> Result<(), ApiError> {
    match claims.role {
        Role::Admin => Ok(()),
        Role::Pharmacist if read_only => Ok(()),
        Role::Patient => {
            let patient = require_patient_profile(conn, claims)?;
            if appointment.patient_id == patient.id {
                Ok(())
            } else {
                Err(ApiError::Forbidden("not your appointment".into()))
            }
        }
        Role::Doctor => {
            let doctor = require_doctor_profile(conn, claims)?;
            if appointment.doctor_id == doctor.id {
                Ok(())
            } else {
                Err(ApiError::Forbidden("appointment is not assigned to you".into()))
            }
        }
        _ => Err(ApiError::Forbidden(
            "role may not access appointments".into(),
        )),
    }
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    let conn = ctx.conn();
    let appointment = repo::get_appointment(&conn, &id)?;
    authorize(&conn, &claims, &appointment, true)?;
    Ok(Json(appointment))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<repo::AppointmentUpdate>,
) -> Result<Json<Appointment>, ApiError> {
    let conn = ctx.conn();
    let appointment = repo::get_appointment(&conn, &id)?;
    authorize(&conn, &claims, &appointment, false)?;
    if matches!(
        appointment.status,
        AppointmentStatus::Completed | AppointmentStatus::Cancelled
    ) {
        return Err(ApiError::validation(
            "completed or cancelled appointments cannot be rescheduled",
        ));
    }
    repo::update_appointment(&conn, &id, &body)?;
    Ok(Json(repo::get_appointment(&conn, &id)?))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn set_status(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Appointment>, ApiError> {
    let status: AppointmentStatus = body.status.parse()?;
    let conn = ctx.conn();
    let appointment = repo::get_appointment(&conn, &id)?;
    authorize(&conn, &claims, &appointment, false)?;

    // patients may only withdraw their own appointment
    if claims.role == Role::Patient && status != AppointmentStatus::Cancelled {
        return Err(ApiError::Forbidden(
            "patients may only cancel appointments".into(),
        ));
    }

    repo::set_appointment_status(&conn, &id, status)?;
    notify_counterpart(
        &conn,
        &claims,
        &appointment,
        &format!("appointment {}", status.as_str()),
    )?;
    tracing::info!(appointment = %id, status = status.as_str(), "appointment status changed");
    Ok(Json(repo::get_appointment(&conn, &id)?))
}

/// Patient DELETE maps to cancellation of their own appointment.
pub async fn cancel_own(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    let conn = ctx.conn();
    let appointment = repo::get_appointment(&conn, &id)?;
    authorize(&conn, &claims, &appointment, false)?;
    repo::set_appointment_status(&conn, &id, AppointmentStatus::Cancelled)?;
    notify_counterpart(&conn, &claims, &appointment, "appointment cancelled")?;
    Ok(Json(repo::get_appointment(&conn, &id)?))
}
