use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ConsultationStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub subject: String,
    pub status: ConsultationStatus,
    pub created_at: NaiveDateTime,
    pub messages: Vec<ConsultationMessage>,
}

/// Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationMessage {
    pub id: Uuid,
    pub consultation_id: Uuid,
    pub sender_user_id: Uuid,
    pub content: String,
    pub sent_at: NaiveDateTime,
}
