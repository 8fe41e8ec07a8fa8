//! Route handlers, one module per resource.

pub mod appointments;
pub mod auth;
pub mod consultations;
pub mod dashboard;
pub mod doctors;
pub mod health;
pub mod medical_files;
pub mod notifications;
pub mod patients;
pub mod pharmacists;
pub mod prescriptions;

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;

use crate::auth::token::AuthClaims;
use crate::db::repository as repo;
use crate::models::filters::ListFilters;
use crate::models::user::{Doctor, Patient};
use crate::scope::{scope_for, QueryScope};

use super::error::ApiError;

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Resolve the caller's profile ids and build the scoped predicate for a
/// patient/doctor-owned collection.
pub(crate) fn caller_scope(
    conn: &Connection,
    claims: &AuthClaims,
    filters: &ListFilters,
) -> Result<QueryScope, ApiError> {
    let ids = repo::caller_ids(conn, &claims.sub, claims.role)?;
    Ok(scope_for(claims.role, &ids, filters)?)
}

pub(crate) fn require_patient_profile(
    conn: &Connection,
    claims: &AuthClaims,
) -> Result<Patient, ApiError> {
    repo::patient_by_user(conn, &claims.sub)?
        .ok_or_else(|| ApiError::Forbidden("caller has no patient profile".into()))
}

pub(crate) fn require_doctor_profile(
    conn: &Connection,
    claims: &AuthClaims,
) -> Result<Doctor, ApiError> {
    repo::doctor_by_user(conn, &claims.sub)?
        .ok_or_else(|| ApiError::Forbidden("caller has no doctor profile".into()))
}
