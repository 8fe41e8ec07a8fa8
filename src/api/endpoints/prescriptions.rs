//! Prescription issuance, editing and dispensing.
//!
//! Doctors own the clinical content; pharmacists only transition status.
//! A fill goes through the conditional UPDATE in the store, so a failed
//! precondition is reported with the reason but never double-applies.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{paginate, require_role, ApiContext, PageQuery, Paginated};
use crate::auth::token::AuthClaims;
use crate::db::repository as repo;
use crate::models::enums::{PrescriptionStatus, Role};
use crate::models::filters::ListFilters;
use crate::models::prescription::{Prescription, PrescriptionItem};

use super::{caller_scope, require_doctor_profile, require_patient_profile, today};

#[derive(Debug, Deserialize)]
pub struct PrescriptionItemRequest {
    pub name: String,
    pub dosage: String,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePrescriptionRequest {
    pub patient_id: Option<Uuid>,
    pub expiry_date: Option<NaiveDate>,
    pub refills: Option<u32>,
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<PrescriptionItemRequest>,
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<CreatePrescriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&claims, &[Role::Doctor])?;
    let mut missing = Vec::new();
    if body.patient_id.is_none() {
        missing.push("patient_id");
    }
    if body.expiry_date.is_none() {
        missing.push("expiry_date");
    }
    if body.items.is_empty() {
        missing.push("items");
    }
    if !missing.is_empty() {
        return Err(ApiError::missing_fields(&missing));
    }

    let conn = ctx.conn();
    let doctor = require_doctor_profile(&conn, &claims)?;
    let patient_id = body.patient_id.unwrap_or_default();
    let patient = repo::get_patient(&conn, &patient_id)?;

    let id = Uuid::new_v4();
    let prescription = Prescription {
        id,
        patient_id,
        doctor_id: doctor.id,
        status: PrescriptionStatus::Active,
        expiry_date: body.expiry_date.unwrap_or_default(),
        refills: body.refills.unwrap_or(0),
        refills_used: 0,
        filled_by_user_id: None,
        filled_at: None,
        notes: body.notes,
        created_at: Utc::now().naive_utc(),
        items: body
            .items
            .into_iter()
            .map(|item| PrescriptionItem {
                id: Uuid::new_v4(),
                prescription_id: id,
                name: item.name,
                dosage: item.dosage,
                frequency: item.frequency,
                duration: item.duration,
                instructions: item.instructions,
            })
            .collect(),
    };
    repo::insert_prescription(&conn, &prescription)?;
    repo::ensure_care_team(&conn, &patient_id, &doctor.id)?;
    repo::notify(&conn, &patient.user_id, "prescription", "New prescription issued")?;
    tracing::info!(prescription = %id, "prescription issued");
    Ok((StatusCode::CREATED, Json(prescription)))
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Query(filters): Query<ListFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Prescription>>, ApiError> {
    let conn = ctx.conn();
    let scope = caller_scope(&conn, &claims, &filters)?;
    let prescriptions =
        repo::list_prescriptions_scoped(&conn, &scope, page.limit(), page.offset())?;
    let total = repo::count_prescriptions_scoped(&conn, &scope)?;
    Ok(Json(paginate(prescriptions, total, &page)))
}

fn authorize_read(
    conn: &Connection,
    claims: &AuthClaims,
    prescription: &Prescription,
) -> Result<(), ApiError> {
    match claims.role {
        Role::Admin | Role::Pharmacist => Ok(()),
        Role::Patient => {
            let patient = require_patient_profile(conn, claims)?;
            if prescription.patient_id == patient.id {
                Ok(())
            } else {
                Err(ApiError::Forbidden("not your prescription".into()))
            }
        }
        Role::Doctor => {
            let doctor = require_doctor_profile(conn, claims)?;
            if prescription.doctor_id == doctor.id {
                Ok(())
            } else {
                Err(ApiError::Forbidden("prescription was not issued by you".into()))
            }
        }
        _ => Err(ApiError::Forbidden(
            "role may not access prescriptions".into(),
        )),
    }
}

pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Prescription>, ApiError> {
    let conn = ctx.conn();
    let prescription = repo::get_prescription(&conn, &id)?;
    authorize_read(&conn, &claims, &prescription)?;
    Ok(Json(prescription))
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionPatchRequest {
    /// Pharmacist transition: `filled` or `cancelled`.
    pub status: Option<String>,
    #[serde(flatten)]
    pub edit: repo::PrescriptionUpdate,
    pub items: Option<Vec<PrescriptionItemRequest>>,
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<PrescriptionPatchRequest>,
) -> Result<Json<Prescription>, ApiError> {
    let conn = ctx.conn();
    match claims.role {
        Role::Doctor => {
            let prescription = repo::get_prescription(&conn, &id)?;
            let doctor = require_doctor_profile(&conn, &claims)?;
            if prescription.doctor_id != doctor.id {
                return Err(ApiError::Forbidden("prescription was not issued by you".into()));
            }
            if body.status.is_some() {
                return Err(ApiError::Forbidden(
                    "doctors edit content; dispensing status belongs to pharmacists".into(),
                ));
            }
            repo::update_prescription(&conn, &id, &body.edit)?;
            if let Some(items) = body.items {
                let items: Vec<PrescriptionItem> = items
                    .into_iter()
                    .map(|item| PrescriptionItem {
                        id: Uuid::new_v4(),
                        prescription_id: id,
                        name: item.name,
                        dosage: item.dosage,
                        frequency: item.frequency,
                        duration: item.duration,
                        instructions: item.instructions,
                    })
                    .collect();
                repo::replace_prescription_items(&conn, &id, &items)?;
            }
            Ok(Json(repo::get_prescription(&conn, &id)?))
        }
        Role::Pharmacist | Role::Admin => {
            let status: PrescriptionStatus = body
                .status
                .as_deref()
                .ok_or_else(|| ApiError::missing_fields(&["status"]))?
                .parse()?;
            match status {
                PrescriptionStatus::Filled => fill(&conn, &claims, &id),
                PrescriptionStatus::Cancelled => {
                    if !repo::cancel_prescription(&conn, &id)? {
                        let prescription = repo::get_prescription(&conn, &id)?;
                        return Err(ApiError::validation(format!(
                            "cannot cancel a {} prescription",
                            prescription.status.as_str()
                        )));
                    }
                    tracing::info!(prescription = %id, "prescription cancelled");
                    Ok(Json(repo::get_prescription(&conn, &id)?))
                }
                _ => Err(ApiError::validation(
                    "pharmacists may only set status to filled or cancelled",
                )),
            }
        }
        _ => Err(ApiError::Forbidden(
            "role may not modify prescriptions".into(),
        )),
    }
}

fn fill(
    conn: &Connection,
    claims: &AuthClaims,
    id: &Uuid,
) -> Result<Json<Prescription>, ApiError> {
    match repo::fill_prescription(conn, id, &claims.sub, today())? {
        Some(filled) => {
            if let Ok(patient) = repo::get_patient(conn, &filled.patient_id) {
                repo::notify(
                    conn,
                    &patient.user_id,
                    "prescription",
                    "Your prescription was filled",
                )?;
            }
            tracing::info!(prescription = %id, pharmacist = %claims.sub, "prescription filled");
            Ok(Json(filled))
        }
        None => {
            // name the failed precondition
            let prescription = repo::get_prescription(conn, id)?;
            let reason = prescription
                .can_be_filled(today())
                .err()
                .unwrap_or("prescription cannot be filled");
            Err(ApiError::validation(reason))
        }
    }
}
