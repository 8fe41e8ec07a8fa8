//! Asynchronous consultations: a subject opened by a patient with an
//! append-only message thread the doctor answers into.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::consultation::{Consultation, ConsultationMessage};
use crate::models::enums::ConsultationStatus;
use crate::scope::QueryScope;

use super::{datetime_col, fmt_datetime, parsed_col};

pub fn insert_consultation(conn: &Connection, consultation: &Consultation) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO consultations (id, patient_id, doctor_id, subject, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            consultation.id.to_string(),
            consultation.patient_id.to_string(),
            consultation.doctor_id.to_string(),
            consultation.subject,
            consultation.status.as_str(),
            fmt_datetime(consultation.created_at),
        ],
    )?;
    for message in &consultation.messages {
        append_consultation_message(&tx, message)?;
    }
    tx.commit()?;
    Ok(())
}

fn consultation_from_row(row: &Row<'_>) -> rusqlite::Result<Consultation> {
    Ok(Consultation {
        id: parsed_col(row, 0)?,
        patient_id: parsed_col(row, 1)?,
        doctor_id: parsed_col(row, 2)?,
        subject: row.get(3)?,
        status: parsed_col(row, 4)?,
        created_at: datetime_col(row, 5)?,
        messages: Vec::new(),
    })
}

pub fn get_consultation(conn: &Connection, id: &Uuid) -> Result<Consultation, DatabaseError> {
    let mut consultation = conn
        .query_row(
            "SELECT id, patient_id, doctor_id, subject, status, created_at
             FROM consultations WHERE id = ?1",
            params![id.to_string()],
            consultation_from_row,
        )
        .optional()?
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "consultation".into(),
            id: id.to_string(),
        })?;
    consultation.messages = messages_for_consultation(conn, id)?;
    Ok(consultation)
}

pub fn list_consultations_scoped(
    conn: &Connection,
    scope: &QueryScope,
    limit: u32,
    offset: u32,
) -> Result<Vec<Consultation>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, patient_id, doctor_id, subject, status, created_at
         FROM consultations WHERE {}
         ORDER BY created_at DESC, id LIMIT {limit} OFFSET {offset}",
        scope.clause
    ))?;
    let rows = stmt.query_map(params_from_iter(&scope.params), consultation_from_row)?;
    let mut consultations: Vec<Consultation> = rows.collect::<Result<_, _>>()?;
    for consultation in &mut consultations {
        consultation.messages = messages_for_consultation(conn, &consultation.id)?;
    }
    Ok(consultations)
}

pub fn count_consultations_scoped(
    conn: &Connection,
    scope: &QueryScope,
) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM consultations WHERE {}", scope.clause),
        params_from_iter(&scope.params),
        |row| row.get(0),
    )?)
}

pub fn messages_for_consultation(
    conn: &Connection,
    consultation_id: &Uuid,
) -> Result<Vec<ConsultationMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, consultation_id, sender_user_id, content, sent_at
         FROM consultation_messages WHERE consultation_id = ?1 ORDER BY sent_at, id",
    )?;
    let rows = stmt.query_map(params![consultation_id.to_string()], |row| {
        Ok(ConsultationMessage {
            id: parsed_col(row, 0)?,
            consultation_id: parsed_col(row, 1)?,
            sender_user_id: parsed_col(row, 2)?,
            content: row.get(3)?,
            sent_at: datetime_col(row, 4)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn append_consultation_message(
    conn: &Connection,
    message: &ConsultationMessage,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO consultation_messages (id, consultation_id, sender_user_id, content, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.id.to_string(),
            message.consultation_id.to_string(),
            message.sender_user_id.to_string(),
            message.content,
            fmt_datetime(message.sent_at),
        ],
    )?;
    Ok(())
}

pub fn set_consultation_status(
    conn: &Connection,
    id: &Uuid,
    status: ConsultationStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE consultations SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "consultation".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
