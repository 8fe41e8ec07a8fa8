//! Asynchronous consultations between a patient and a doctor.
//!
//! The thread is append-only. A doctor reply on a pending thread marks
//! it answered; either party may close it explicitly.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{paginate, require_role, ApiContext, PageQuery, Paginated};
use crate::auth::token::AuthClaims;
use crate::db::repository as repo;
use crate::models::consultation::{Consultation, ConsultationMessage};
use crate::models::enums::{ConsultationStatus, Role};
use crate::models::filters::ListFilters;

use super::{caller_scope, require_doctor_profile, require_patient_profile};

#[derive(Debug, Deserialize)]
pub struct CreateConsultationRequest {
    pub doctor_id: Option<Uuid>,
    pub subject: Option<String>,
    pub content: Option<String>,
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<CreateConsultationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, &[Role::Patient])?;
    let mut missing = Vec::new();
    if body.doctor_id.is_none() {
        missing.push("doctor_id");
    }
    if body.subject.as_deref().map_or(true, str::is_empty) {
        missing.push("subject");
    }
    if body.content.as_deref().map_or(true, str::is_empty) {
        missing.push("content");
    }
    if !missing.is_empty() {
        return Err(ApiError::missing_fields(&missing));
    }

    let conn = ctx.conn();
    let patient = require_patient_profile(&conn, &claims)?;
    let doctor_id = body.doctor_id.unwrap_or_default();
    let doctor = repo::get_doctor(&conn, &doctor_id)?;

    let id = Uuid::new_v4();
    let now = Utc::now().naive_utc();
    let consultation = Consultation {
        id,
        patient_id: patient.id,
        doctor_id,
        subject: body.subject.unwrap_or_default(),
        status: ConsultationStatus::Pending,
        created_at: now,
        messages: vec![ConsultationMessage {
            id: Uuid::new_v4(),
            consultation_id: id,
            sender_user_id: claims.sub,
            content: body.content.unwrap_or_default(),
            sent_at: now,
        }],
    };
    repo::insert_consultation(&conn, &consultation)?;
    repo::ensure_care_team(&conn, &patient.id, &doctor_id)?;
    repo::notify(&conn, &doctor.user_id, "consultation", "New consultation question")?;
    tracing::info!(consultation = %id, "consultation opened");
    Ok((StatusCode::CREATED, Json(consultation)))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Query(filters): Query<ListFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Consultation>>, ApiError> {
    let conn = ctx.conn();
    let scope = caller_scope(&conn, &claims, &filters)?;
    let consultations =
        repo::list_consultations_scoped(&conn, &scope, page.limit(), page.offset())?;
    let total = repo::count_consultations_scoped(&conn, &scope)?;
    Ok(Json(paginate(consultations, total, &page)))
}

fn authorize(
    conn: &Connection,
    claims: &AuthClaims,
    consultation: &Consultation,
) -> Result<(), ApiError> {
    match claims.role {
        Role::Admin => Ok(()),
        Role::Patient => {
            let patient = require_patient_profile(conn, claims)?;
            if consultation.patient_id == patient.id {
                Ok(())
            } else {
                Err(ApiError::Forbidden("not your consultation".into()))
            }
        }
        Role::Doctor => {
            let doctor = require_doctor_profile(conn, claims)?;
            if consultation.doctor_id == doctor.id {
                Ok(())
            } else {
                Err(ApiError::Forbidden(
                    "consultation is not assigned to you".into(),
                ))
            }
        }
        _ => Err(ApiError::Forbidden(
            "role may not access consultations".into(),
        )),
    }
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Consultation>, ApiError> {
    let conn = ctx.conn();
    let consultation = repo::get_consultation(&conn, &id)?;
    authorize(&conn, &claims, &consultation)?;
    Ok(Json(consultation))
}

#[derive(Debug, Deserialize)]
pub struct ConsultationPatchRequest {
    pub content: Option<String>,
    pub status: Option<String>,
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConsultationPatchRequest>,
) -> Result<Json<Consultation>, ApiError> {
    let conn = ctx.conn();
    let consultation = repo::get_consultation(&conn, &id)?;
    authorize(&conn, &claims, &consultation)?;

    if body.content.is_none() && body.status.is_none() {
        return Err(ApiError::missing_fields(&["content"]));
    }

    if let Some(content) = body.content.filter(|c| !c.is_empty()) {
        if matches!(
            consultation.status,
            ConsultationStatus::Completed | ConsultationStatus::Cancelled
        ) {
            return Err(ApiError::validation("consultation is closed"));
        }
        repo::append_consultation_message(
            &conn,
            &ConsultationMessage {
                id: Uuid::new_v4(),
                consultation_id: id,
                sender_user_id: claims.sub,
                content,
                sent_at: Utc::now().naive_utc(),
            },
        )?;
        // first doctor reply resolves the open question
        if claims.role == Role::Doctor && consultation.status == ConsultationStatus::Pending {
            repo::set_consultation_status(&conn, &id, ConsultationStatus::Answered)?;
        }
        notify_counterpart(&conn, &claims, &consultation)?;
    }

    if let Some(status) = body.status {
        let status: ConsultationStatus = status.parse()?;
        repo::set_consultation_status(&conn, &id, status)?;
    }

    Ok(Json(repo::get_consultation(&conn, &id)?))
}

fn notify_counterpart(
    conn: &Connection,
    claims: &AuthClaims,
    consultation: &Consultation,
) -> Result<(), ApiError> {
    let recipient = match claims.role {
        Role::Patient => repo::get_doctor(conn, &consultation.doctor_id)
            .map(|d| d.user_id)
            .ok(),
        _ => repo::get_patient(conn, &consultation.patient_id)
            .map(|p| p.user_id)
            .ok(),
    };
    if let Some(user_id) = recipient {
        repo::notify(conn, &user_id, "consultation", "New consultation reply")?;
    }
    Ok(())
}
