use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One per patient; clinical sub-collections are child tables keyed on
/// the file id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalFile {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub blood_type: Option<String>,
    pub emergency_contact: Option<EmergencyContact>,
    pub insurance: Option<Insurance>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub relation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insurance {
    pub provider: String,
    pub policy_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalsEntry {
    pub id: Uuid,
    pub medical_file_id: Uuid,
    pub recorded_at: NaiveDateTime,
    /// `"systolic/diastolic"`, e.g. `"120/80"`.
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<i64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allergy {
    pub id: Uuid,
    pub medical_file_id: Uuid,
    pub allergen: String,
    pub reaction: Option<String>,
    pub severity: Option<String>,
}

/// Medication entry in a patient's own file (self-managed list, distinct
/// from doctor-issued prescription line items).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMedication {
    pub id: Uuid,
    pub medical_file_id: Uuid,
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub started_on: Option<NaiveDate>,
    pub stopped_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Immunization {
    pub id: Uuid,
    pub medical_file_id: Uuid,
    pub vaccine: String,
    pub administered_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResult {
    pub id: Uuid,
    pub medical_file_id: Uuid,
    pub test_name: String,
    pub result: Option<String>,
    pub unit: Option<String>,
    pub collected_on: Option<NaiveDate>,
}

/// Append-only access record; never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: Uuid,
    pub medical_file_id: Uuid,
    pub accessor_user_id: Uuid,
    pub action: String,
    pub accessed_at: NaiveDateTime,
}
