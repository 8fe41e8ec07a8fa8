//! Patient portal: profile, medical file, self-managed medications,
//! consultations, prescriptions, messaging, and provider directories.
//! Every handler is gated on the patient role.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{paginate, require_role, ApiContext, PageQuery, Paginated};
use crate::auth::token::AuthClaims;
use crate::db::repository as repo;
use crate::models::consultation::{Consultation, ConsultationMessage};
use crate::models::conversation::ConversationMessage;
use crate::models::enums::Role;
use crate::models::filters::ListFilters;
use crate::models::medical_file::{FileMedication, MedicalFile};
use crate::models::prescription::Prescription;
use crate::models::user::{Patient, ProviderListing, User};
use crate::transform::{age_from_birth_date, display_name, format_time};

use super::{caller_scope, require_patient_profile, today};

fn gate(claims: &AuthClaims) -> Result<(), ApiError> {
    require_role(claims, &[Role::Patient])
}

fn own_file(conn: &Connection, claims: &AuthClaims) -> Result<(Patient, MedicalFile), ApiError> {
    let patient = require_patient_profile(conn, claims)?;
    let file = repo::file_by_patient(conn, &patient.id)?
        .ok_or_else(|| ApiError::NotFound("medical_file".into()))?;
    Ok((patient, file))
}

// --- profile ---

pub async fn get_profile(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    let user = repo::get_user(&conn, &claims.sub)?;
    let patient = require_patient_profile(&conn, &claims)?;
    let age = user.birth_date.map(|b| age_from_birth_date(b, today()));
    Ok(Json(json!({
        "user": user,
        "medical_history": patient.medical_history,
        "age": age,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PatientProfileRequest {
    #[serde(flatten)]
    pub user: repo::UserProfileUpdate,
    pub medical_history: Option<String>,
}

pub async fn update_profile(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<PatientProfileRequest>,
) -> Result<Json<User>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    require_patient_profile(&conn, &claims)?;
    repo::update_user_profile(&conn, &claims.sub, &body.user)?;
    if let Some(history) = &body.medical_history {
        repo::update_patient_history(&conn, &claims.sub, history)?;
    }
    Ok(Json(repo::get_user(&conn, &claims.sub)?))
}

// --- medical file ---

pub async fn medical_file(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    let (_, file) = own_file(&conn, &claims)?;
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

// --- self-managed medication list ---

pub async fn list_medications(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<Vec<FileMedication>>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    let (_, file) = own_file(&conn, &claims)?;
    Ok(Json(repo::medications_for_file(&conn, &file.id)?))
}

#[derive(Debug, Deserialize)]
pub struct MedicationRequest {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub started_on: Option<NaiveDate>,
}

pub async fn add_medication(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<MedicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    gate(&claims)?;
    let name = match body.name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(ApiError::missing_fields(&["name"])),
    };
    let conn = ctx.conn();
    let (_, file) = own_file(&conn, &claims)?;
    let medication = FileMedication {
        id: Uuid::new_v4(),
        medical_file_id: file.id,
        name,
        dosage: body.dosage,
        frequency: body.frequency,
        started_on: body.started_on,
        stopped_on: None,
    };
    repo::insert_file_medication(&conn, &medication)?;
    repo::log_access(&conn, &file.id, &claims.sub, "added medication")?;
    Ok((StatusCode::CREATED, Json(medication)))
}

pub async fn update_medication(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<repo::FileMedicationUpdate>,
) -> Result<Json<Vec<FileMedication>>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    let (_, file) = own_file(&conn, &claims)?;
    repo::update_file_medication(&conn, &id, &file.id, &body)?;
    Ok(Json(repo::medications_for_file(&conn, &file.id)?))
}

pub async fn remove_medication(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    let (_, file) = own_file(&conn, &claims)?;
    if !repo::delete_file_medication(&conn, &id, &file.id)? {
        return Err(ApiError::NotFound("medication".into()));
    }
    Ok(Json(json!({ "message": "medication removed" })))
}

// --- consultations ---

#[derive(Debug, Deserialize)]
pub struct ConsultationMessageRequest {
    pub content: String,
}

/// Append a follow-up message to the patient's own consultation.
pub async fn reply_consultation(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConsultationMessageRequest>,
) -> Result<Json<Consultation>, ApiError> {
    gate(&claims)?;
    if body.content.is_empty() {
        return Err(ApiError::missing_fields(&["content"]));
    }
    let conn = ctx.conn();
    let patient = require_patient_profile(&conn, &claims)?;
    let consultation = repo::get_consultation(&conn, &id)?;
    if consultation.patient_id != patient.id {
        return Err(ApiError::Forbidden("not your consultation".into()));
    }
    repo::append_consultation_message(
        &conn,
        &ConsultationMessage {
            id: Uuid::new_v4(),
            consultation_id: id,
            sender_user_id: claims.sub,
            content: body.content,
            sent_at: Utc::now().naive_utc(),
        },
    )?;
    Ok(Json(repo::get_consultation(&conn, &id)?))
}

// --- prescriptions ---

pub async fn list_prescriptions(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Query(filters): Query<ListFilters>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<Prescription>>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    let scope = caller_scope(&conn, &claims, &filters)?;
    let prescriptions =
        repo::list_prescriptions_scoped(&conn, &scope, page.limit(), page.offset())?;
    let total = repo::count_prescriptions_scoped(&conn, &scope)?;
    Ok(Json(paginate(prescriptions, total, &page)))
}

pub async fn active_prescriptions(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    let patient = require_patient_profile(&conn, &claims)?;
    Ok(Json(repo::active_for_patient(&conn, &patient.id, today(), 50)?))
}

// --- direct messages ---

pub async fn list_messages(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    let mut threads = Vec::new();
    for conversation in repo::conversations_for_user(&conn, &claims.sub)? {
        let other = conversation.other_participant(&claims.sub);
        let other_name = repo::get_user(&conn, &other).map(|u| u.name).ok();
        let messages = repo::messages_for_conversation(&conn, &conversation.id)?;
        repo::mark_conversation_read(&conn, &conversation.id, &claims.sub)?;
        threads.push(json!({
            "conversation": conversation,
            "with": display_name(other_name, "User"),
            "last_message_at": messages.last().map(|m| format_time(m.sent_at)),
            "messages": messages,
        }));
    }
    Ok(Json(threads))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_user_id: Option<Uuid>,
    pub content: Option<String>,
}

pub async fn send_message(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    gate(&claims)?;
    let mut missing = Vec::new();
    if body.recipient_user_id.is_none() {
        missing.push("recipient_user_id");
    }
    if body.content.as_deref().map_or(true, str::is_empty) {
        missing.push("content");
    }
    if !missing.is_empty() {
        return Err(ApiError::missing_fields(&missing));
    }

    let conn = ctx.conn();
    let recipient = body.recipient_user_id.unwrap_or_default();
    repo::get_user(&conn, &recipient)?;
    let conversation = repo::find_or_create_conversation(&conn, &claims.sub, &recipient)?;
    let message = ConversationMessage {
        id: Uuid::new_v4(),
        conversation_id: conversation.id,
        sender_user_id: claims.sub,
        content: body.content.unwrap_or_default(),
        sent_at: Utc::now().naive_utc(),
        read: false,
    };
    repo::insert_conversation_message(&conn, &message)?;
    repo::notify(&conn, &recipient, "message", "New message received")?;
    Ok((StatusCode::CREATED, Json(message)))
}

// --- provider directories ---

pub async fn list_doctors(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<Vec<ProviderListing>>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    Ok(Json(repo::list_doctors(&conn)?))
}

pub async fn get_doctor(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProviderListing>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    Ok(Json(repo::get_doctor_listing(&conn, &id)?))
}

pub async fn list_pharmacists(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
) -> Result<Json<Vec<ProviderListing>>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    Ok(Json(repo::list_pharmacists(&conn)?))
}

pub async fn get_pharmacist(
    State(ctx): State<ApiContext>,
    Extension(claims): Extension<AuthClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProviderListing>, ApiError> {
    gate(&claims)?;
    let conn = ctx.conn();
    Ok(Json(repo::get_pharmacist_listing(&conn, &id)?))
}
