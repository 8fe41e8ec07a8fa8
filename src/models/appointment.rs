use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AppointmentStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    /// `HH:mm`
    pub time: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
}

/// Appointment joined with party display names for list/dashboard views.
/// Names fall back to "Unknown Patient"/"Unknown Doctor" when the soft
/// reference cannot be resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentCard {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_name: String,
    pub doctor_name: String,
    pub date: String,
    pub time: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
}
