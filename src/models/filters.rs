use serde::Deserialize;
use uuid::Uuid;

/// Caller-supplied list filters, as they arrive from the query string.
/// The query scoper decides which of these a role may actually use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilters {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<String>,
}
