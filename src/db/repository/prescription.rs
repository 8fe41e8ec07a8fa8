//! Prescriptions and their line items.
//!
//! The fill operation is a single conditional UPDATE: the active/expiry/
//! refill preconditions are re-checked by the statement itself, so two
//! concurrent fills can never both succeed off the same stale read.

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::prescription::{Prescription, PrescriptionItem};
use crate::scope::QueryScope;

use super::{datetime_col, fmt_datetime, opt_datetime_col, opt_parsed_col, parsed_col};

pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO prescriptions
            (id, patient_id, doctor_id, status, expiry_date, refills, refills_used,
             filled_by_user_id, filled_at, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            rx.id.to_string(),
            rx.patient_id.to_string(),
            rx.doctor_id.to_string(),
            rx.status.as_str(),
            rx.expiry_date.to_string(),
            rx.refills,
            rx.refills_used,
            rx.filled_by_user_id.map(|id| id.to_string()),
            rx.filled_at.map(fmt_datetime),
            rx.notes,
            fmt_datetime(rx.created_at),
        ],
    )?;
    for item in &rx.items {
        insert_item(&tx, item)?;
    }
    tx.commit()?;
    Ok(())
}

fn insert_item(conn: &Connection, item: &PrescriptionItem) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescription_items (id, prescription_id, name, dosage, frequency, duration, instructions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.id.to_string(),
            item.prescription_id.to_string(),
            item.name,
            item.dosage,
            item.frequency,
            item.duration,
            item.instructions,
        ],
    )?;
    Ok(())
}

pub fn items_for_prescription(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<Vec<PrescriptionItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, prescription_id, name, dosage, frequency, duration, instructions
         FROM prescription_items WHERE prescription_id = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![prescription_id.to_string()], |row| {
        Ok(PrescriptionItem {
            id: parsed_col(row, 0)?,
            prescription_id: parsed_col(row, 1)?,
            name: row.get(2)?,
            dosage: row.get(3)?,
            frequency: row.get(4)?,
            duration: row.get(5)?,
            instructions: row.get(6)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

const RX_COLS: &str = "id, patient_id, doctor_id, status, expiry_date, refills, refills_used, \
     filled_by_user_id, filled_at, notes, created_at";

fn rx_from_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: parsed_col(row, 0)?,
        patient_id: parsed_col(row, 1)?,
        doctor_id: parsed_col(row, 2)?,
        status: parsed_col(row, 3)?,
        expiry_date: parsed_col(row, 4)?,
        refills: row.get(5)?,
        refills_used: row.get(6)?,
        filled_by_user_id: opt_parsed_col(row, 7)?,
        filled_at: opt_datetime_col(row, 8)?,
        notes: row.get(9)?,
        created_at: datetime_col(row, 10)?,
        items: Vec::new(),
    })
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Prescription, DatabaseError> {
    let mut rx = conn
        .query_row(
            &format!("SELECT {RX_COLS} FROM prescriptions WHERE id = ?1"),
            params![id.to_string()],
            rx_from_row,
        )
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "prescription".into(),
            id: id.to_string(),
        })?;
    rx.items = items_for_prescription(conn, id)?;
    Ok(rx)
}

pub fn list_prescriptions_scoped(
    conn: &Connection,
    scope: &QueryScope,
    limit: u32,
    offset: u32,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RX_COLS} FROM prescriptions WHERE {}
         ORDER BY created_at DESC, id LIMIT {limit} OFFSET {offset}",
        scope.clause
    ))?;
    let rows = stmt.query_map(params_from_iter(&scope.params), rx_from_row)?;
    let mut prescriptions: Vec<Prescription> = rows.collect::<Result<_, _>>()?;
    for rx in &mut prescriptions {
        rx.items = items_for_prescription(conn, &rx.id)?;
    }
    Ok(prescriptions)
}

pub fn count_prescriptions_scoped(
    conn: &Connection,
    scope: &QueryScope,
) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM prescriptions WHERE {}", scope.clause),
        params_from_iter(&scope.params),
        |row| row.get(0),
    )?)
}

/// Active and unexpired, newest first, for the patient dashboard.
pub fn active_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    today: NaiveDate,
    limit: u32,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RX_COLS} FROM prescriptions
         WHERE patient_id = ?1 AND status = 'active' AND expiry_date >= ?2
         ORDER BY created_at DESC LIMIT {limit}"
    ))?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), today.to_string()],
        rx_from_row,
    )?;
    let mut prescriptions: Vec<Prescription> = rows.collect::<Result<_, _>>()?;
    for rx in &mut prescriptions {
        rx.items = items_for_prescription(conn, &rx.id)?;
    }
    Ok(prescriptions)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionUpdate {
    pub expiry_date: Option<NaiveDate>,
    pub refills: Option<u32>,
    pub notes: Option<String>,
}

pub fn update_prescription(
    conn: &Connection,
    id: &Uuid,
    update: &PrescriptionUpdate,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions SET
            expiry_date = COALESCE(?1, expiry_date),
            refills = COALESCE(?2, refills),
            notes = COALESCE(?3, notes)
         WHERE id = ?4",
        params![
            update.expiry_date.map(|d| d.to_string()),
            update.refills,
            update.notes,
            id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "prescription".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Swap the line items wholesale (doctor edit).
pub fn replace_prescription_items(
    conn: &Connection,
    prescription_id: &Uuid,
    items: &[PrescriptionItem],
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM prescription_items WHERE prescription_id = ?1",
        params![prescription_id.to_string()],
    )?;
    for item in items {
        insert_item(&tx, item)?;
    }
    tx.commit()?;
    Ok(())
}

/// Atomic fill. Returns the updated prescription when the conditional
/// UPDATE took effect, `None` when a precondition failed (not active,
/// expired before `today`, or refills exhausted).
pub fn fill_prescription(
    conn: &Connection,
    id: &Uuid,
    pharmacist_user_id: &Uuid,
    today: NaiveDate,
) -> Result<Option<Prescription>, DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions SET
            status = 'filled',
            refills_used = refills_used + 1,
            filled_by_user_id = ?1,
            filled_at = datetime('now')
         WHERE id = ?2
           AND status = 'active'
           AND expiry_date >= ?3
           AND refills_used < refills",
        params![
            pharmacist_user_id.to_string(),
            id.to_string(),
            today.to_string(),
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_prescription(conn, id).map(Some)
}

/// Cancel an active prescription; returns false when it was not active.
pub fn cancel_prescription(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions SET status = 'cancelled' WHERE id = ?1 AND status = 'active'",
        params![id.to_string()],
    )?;
    Ok(changed > 0)
}

pub fn prescription_status_counts(conn: &Connection) -> Result<Vec<(String, i64)>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM prescriptions GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<Result<_, _>>()?)
}
