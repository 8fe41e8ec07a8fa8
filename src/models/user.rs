use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;

/// Identity record. Email is unique and the role is immutable after
/// creation; accounts are never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub email_verified: bool,
    pub created_at: NaiveDateTime,
}

/// Role-profile row for a patient user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub medical_history: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pharmacist {
    pub id: Uuid,
    pub user_id: Uuid,
    pub license_number: Option<String>,
    pub pharmacy_name: Option<String>,
    pub pharmacy_address: Option<String>,
}

/// Directory listing shape for doctors/pharmacists: profile joined with
/// the owning user's display fields.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderListing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub pharmacy_name: Option<String>,
}

/// Row in a doctor's patient roster, resolved through the care team.
#[derive(Debug, Clone, Serialize)]
pub struct PatientListing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub birth_date: Option<NaiveDate>,
}

/// Compact user shape for admin views (recent registrations).
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
}
