use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PrescriptionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: PrescriptionStatus,
    pub expiry_date: NaiveDate,
    pub refills: u32,
    pub refills_used: u32,
    pub filled_by_user_id: Option<Uuid>,
    pub filled_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub items: Vec<PrescriptionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionItem {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub name: String,
    pub dosage: String,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

impl Prescription {
    /// Fill precondition: active, not expired, refills remaining.
    ///
    /// Advisory only — the actual fill is a conditional UPDATE that
    /// re-checks these inside the store, so a stale read cannot produce
    /// a double fill. This method exists to name the reason in errors.
    pub fn can_be_filled(&self, today: NaiveDate) -> Result<(), &'static str> {
        if self.status != PrescriptionStatus::Active {
            return Err("prescription is not active");
        }
        if self.expiry_date < today {
            return Err("prescription has expired");
        }
        if self.refills_used >= self.refills {
            return Err("no refills remaining");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rx(status: PrescriptionStatus, expiry: NaiveDate, refills: u32, used: u32) -> Prescription {
        Prescription {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            status,
            expiry_date: expiry,
            refills,
            refills_used: used,
            filled_by_user_id: None,
            filled_at: None,
            notes: None,
            created_at: chrono::Local::now().naive_local(),
            items: vec![],
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fillable_when_active_unexpired_with_refills() {
        let p = rx(PrescriptionStatus::Active, day(2026, 12, 31), 2, 0);
        assert!(p.can_be_filled(day(2026, 6, 1)).is_ok());
    }

    #[test]
    fn rejected_when_expired() {
        let p = rx(PrescriptionStatus::Active, day(2026, 1, 1), 2, 0);
        assert_eq!(
            p.can_be_filled(day(2026, 1, 2)),
            Err("prescription has expired")
        );
    }

    #[test]
    fn expiry_day_itself_is_fillable() {
        let p = rx(PrescriptionStatus::Active, day(2026, 1, 1), 1, 0);
        assert!(p.can_be_filled(day(2026, 1, 1)).is_ok());
    }

    #[test]
    fn rejected_when_already_filled() {
        let p = rx(PrescriptionStatus::Filled, day(2026, 12, 31), 2, 1);
        assert_eq!(
            p.can_be_filled(day(2026, 6, 1)),
            Err("prescription is not active")
        );
    }

    #[test]
    fn rejected_when_refills_exhausted() {
        let p = rx(PrescriptionStatus::Active, day(2026, 12, 31), 1, 1);
        assert_eq!(
            p.can_be_filled(day(2026, 6, 1)),
            Err("no refills remaining")
        );
    }
}
