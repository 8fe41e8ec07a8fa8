//! Appointments: scoped listings with pagination, lifecycle updates, and
//! the focused queries behind the patient/doctor/admin dashboards.

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::appointment::{Appointment, AppointmentCard};
use crate::models::enums::AppointmentStatus;
use crate::scope::QueryScope;
use crate::transform::display_name;

use super::{datetime_col, fmt_datetime, parsed_col};

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, date, time, type, reason, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            appt.id.to_string(),
            appt.patient_id.to_string(),
            appt.doctor_id.to_string(),
            appt.date.to_string(),
            appt.time,
            appt.kind,
            appt.reason,
            appt.status.as_str(),
            fmt_datetime(appt.created_at),
        ],
    )?;
    Ok(())
}

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: parsed_col(row, 0)?,
        patient_id: parsed_col(row, 1)?,
        doctor_id: parsed_col(row, 2)?,
        date: parsed_col(row, 3)?,
        time: row.get(4)?,
        kind: row.get(5)?,
        reason: row.get(6)?,
        status: parsed_col(row, 7)?,
        created_at: datetime_col(row, 8)?,
    })
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Appointment, DatabaseError> {
    conn.query_row(
        "SELECT id, patient_id, doctor_id, date, time, type, reason, status, created_at
         FROM appointments WHERE id = ?1",
        params![id.to_string()],
        appointment_from_row,
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "appointment".into(),
        id: id.to_string(),
    })
}

// Card queries join both parties' display names; LEFT JOINs so a broken
// reference degrades to a placeholder instead of dropping the row.
const CARD_SELECT: &str = "SELECT a.id, a.patient_id, a.doctor_id, pu.name, du.name,
            a.date, a.time, a.type, a.reason, a.status
     FROM appointments a
     LEFT JOIN patients p ON p.id = a.patient_id
     LEFT JOIN users pu ON pu.id = p.user_id
     LEFT JOIN doctors d ON d.id = a.doctor_id
     LEFT JOIN users du ON du.id = d.user_id";

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<AppointmentCard> {
    Ok(AppointmentCard {
        id: parsed_col(row, 0)?,
        patient_id: parsed_col(row, 1)?,
        doctor_id: parsed_col(row, 2)?,
        patient_name: display_name(row.get(3)?, "Patient"),
        doctor_name: display_name(row.get(4)?, "Doctor"),
        date: row.get(5)?,
        time: row.get(6)?,
        kind: row.get(7)?,
        reason: row.get(8)?,
        status: parsed_col(row, 9)?,
    })
}

pub fn list_appointments_scoped(
    conn: &Connection,
    scope: &QueryScope,
    limit: u32,
    offset: u32,
) -> Result<Vec<AppointmentCard>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{CARD_SELECT} WHERE {} ORDER BY a.date DESC, a.time DESC LIMIT {limit} OFFSET {offset}",
        scope.clause
    ))?;
    let rows = stmt.query_map(params_from_iter(&scope.params), card_from_row)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn count_appointments_scoped(
    conn: &Connection,
    scope: &QueryScope,
) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM appointments WHERE {}", scope.clause),
        params_from_iter(&scope.params),
        |row| row.get(0),
    )?)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentUpdate {
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub reason: Option<String>,
}

pub fn update_appointment(
    conn: &Connection,
    id: &Uuid,
    update: &AppointmentUpdate,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET
            date = COALESCE(?1, date),
            time = COALESCE(?2, time),
            type = COALESCE(?3, type),
            reason = COALESCE(?4, reason)
         WHERE id = ?5",
        params![
            update.date.map(|d| d.to_string()),
            update.time,
            update.kind,
            update.reason,
            id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "appointment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn set_appointment_status(
    conn: &Connection,
    id: &Uuid,
    status: AppointmentStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointments SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "appointment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Upcoming (today onward, not yet completed or cancelled) for the
/// patient dashboard.
pub fn upcoming_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    today: NaiveDate,
    limit: u32,
) -> Result<Vec<AppointmentCard>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{CARD_SELECT}
         WHERE a.patient_id = ?1 AND a.date >= ?2 AND a.status IN ('requested', 'scheduled')
         ORDER BY a.date, a.time LIMIT {limit}"
    ))?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), today.to_string()],
        card_from_row,
    )?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn last_completed_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<NaiveDate>, DatabaseError> {
    let date: Option<String> = conn
        .query_row(
            "SELECT date FROM appointments
             WHERE patient_id = ?1 AND status = 'completed'
             ORDER BY date DESC LIMIT 1",
            params![patient_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    date.map(|d| {
        d.parse()
            .map_err(|e: chrono::ParseError| DatabaseError::ConstraintViolation(e.to_string()))
    })
    .transpose()
}

pub fn todays_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
    today: NaiveDate,
    limit: u32,
) -> Result<Vec<AppointmentCard>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{CARD_SELECT}
         WHERE a.doctor_id = ?1 AND a.date = ?2 AND a.status != 'cancelled'
         ORDER BY a.time LIMIT {limit}"
    ))?;
    let rows = stmt.query_map(
        params![doctor_id.to_string(), today.to_string()],
        card_from_row,
    )?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn future_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
    today: NaiveDate,
    limit: u32,
) -> Result<Vec<AppointmentCard>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{CARD_SELECT}
         WHERE a.doctor_id = ?1 AND a.date > ?2 AND a.status = 'scheduled'
         ORDER BY a.date, a.time LIMIT {limit}"
    ))?;
    let rows = stmt.query_map(
        params![doctor_id.to_string(), today.to_string()],
        card_from_row,
    )?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn pending_requests_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
    limit: u32,
) -> Result<Vec<AppointmentCard>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{CARD_SELECT}
         WHERE a.doctor_id = ?1 AND a.status = 'requested'
         ORDER BY a.created_at LIMIT {limit}"
    ))?;
    let rows = stmt.query_map(params![doctor_id.to_string()], card_from_row)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn count_pending_requests_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM appointments WHERE doctor_id = ?1 AND status = 'requested'",
        params![doctor_id.to_string()],
        |row| row.get(0),
    )?)
}

pub fn type_histogram_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<(String, i64)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT type, COUNT(*) FROM appointments
         WHERE doctor_id = ?1 GROUP BY type ORDER BY COUNT(*) DESC",
    )?;
    let rows = stmt.query_map(params![doctor_id.to_string()], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn appointment_status_counts(conn: &Connection) -> Result<Vec<(String, i64)>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM appointments GROUP BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn recent_appointments(
    conn: &Connection,
    limit: u32,
) -> Result<Vec<AppointmentCard>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{CARD_SELECT} ORDER BY a.created_at DESC, a.id LIMIT {limit}"
    ))?;
    let rows = stmt.query_map([], card_from_row)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::super::testutil::{seed_user, test_db};
    use super::super::{doctor_by_user, patient_by_user};
    use super::*;
    use crate::models::enums::Role;
    use crate::models::filters::ListFilters;
    use crate::scope::{scope_for, CallerIds};

    fn seed_pair(conn: &Connection) -> (Uuid, Uuid) {
        let patient_user = seed_user(conn, Role::Patient);
        let doctor_user = seed_user(conn, Role::Doctor);
        let patient = patient_by_user(conn, &patient_user.id).unwrap().unwrap();
        let doctor = doctor_by_user(conn, &doctor_user.id).unwrap().unwrap();
        (patient.id, doctor.id)
    }

    fn appt(
        patient_id: Uuid,
        doctor_id: Uuid,
        date: &str,
        time: &str,
        status: AppointmentStatus,
    ) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            date: date.parse().unwrap(),
            time: time.into(),
            kind: "consultation".into(),
            reason: None,
            status,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn scoped_list_sees_only_own_rows() {
        let conn = test_db();
        let (p1, d1) = seed_pair(&conn);
        let (p2, _) = seed_pair(&conn);

        insert_appointment(
            &conn,
            &appt(p1, d1, "2026-03-01", "09:00", AppointmentStatus::Scheduled),
        )
        .unwrap();
        insert_appointment(
            &conn,
            &appt(p2, d1, "2026-03-02", "10:00", AppointmentStatus::Scheduled),
        )
        .unwrap();

        let caller = CallerIds {
            patient_id: Some(p1),
            doctor_id: None,
        };
        let scope = scope_for(Role::Patient, &caller, &ListFilters::default()).unwrap();
        let cards = list_appointments_scoped(&conn, &scope, 10, 0).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].patient_id, p1);
        assert_eq!(count_appointments_scoped(&conn, &scope).unwrap(), 1);
    }

    #[test]
    fn pagination_windows_the_result() {
        let conn = test_db();
        let (p, d) = seed_pair(&conn);
        for day in 1..=5 {
            insert_appointment(
                &conn,
                &appt(
                    p,
                    d,
                    &format!("2026-03-{day:02}"),
                    "09:00",
                    AppointmentStatus::Scheduled,
                ),
            )
            .unwrap();
        }

        let caller = CallerIds {
            patient_id: Some(p),
            doctor_id: None,
        };
        let scope = scope_for(Role::Patient, &caller, &ListFilters::default()).unwrap();
        let page = list_appointments_scoped(&conn, &scope, 2, 2).unwrap();
        assert_eq!(page.len(), 2);
        // newest first: page 2 of limit 2 holds days 3 and 2
        assert_eq!(page[0].date, "2026-03-03");
        assert_eq!(page[1].date, "2026-03-02");
        assert_eq!(count_appointments_scoped(&conn, &scope).unwrap(), 5);
    }

    #[test]
    fn doctor_dashboard_queries_split_by_day_and_status() {
        let conn = test_db();
        let (p, d) = seed_pair(&conn);
        let today: NaiveDate = "2026-03-10".parse().unwrap();

        insert_appointment(&conn, &appt(p, d, "2026-03-10", "09:00", AppointmentStatus::Scheduled)).unwrap();
        insert_appointment(&conn, &appt(p, d, "2026-03-12", "11:00", AppointmentStatus::Scheduled)).unwrap();
        insert_appointment(&conn, &appt(p, d, "2026-03-15", "14:00", AppointmentStatus::Requested)).unwrap();
        insert_appointment(&conn, &appt(p, d, "2026-03-10", "16:00", AppointmentStatus::Cancelled)).unwrap();

        assert_eq!(todays_for_doctor(&conn, &d, today, 5).unwrap().len(), 1);
        assert_eq!(future_for_doctor(&conn, &d, today, 5).unwrap().len(), 1);
        assert_eq!(pending_requests_for_doctor(&conn, &d, 5).unwrap().len(), 1);
        assert_eq!(count_pending_requests_for_doctor(&conn, &d).unwrap(), 1);
    }

    #[test]
    fn broken_doctor_reference_renders_placeholder() {
        let conn = test_db();
        let (p, _) = seed_pair(&conn);
        let ghost_doctor = Uuid::new_v4();
        insert_appointment(
            &conn,
            &appt(p, ghost_doctor, "2026-04-01", "08:30", AppointmentStatus::Requested),
        )
        .unwrap();

        let caller = CallerIds {
            patient_id: Some(p),
            doctor_id: None,
        };
        let scope = scope_for(Role::Patient, &caller, &ListFilters::default()).unwrap();
        let cards = list_appointments_scoped(&conn, &scope, 10, 0).unwrap();
        assert_eq!(cards[0].doctor_name, "Unknown Doctor");
        assert_ne!(cards[0].patient_name, "Unknown Patient");
    }

    #[test]
    fn status_transition_and_update_merge() {
        let conn = test_db();
        let (p, d) = seed_pair(&conn);
        let a = appt(p, d, "2026-05-01", "10:00", AppointmentStatus::Requested);
        insert_appointment(&conn, &a).unwrap();

        set_appointment_status(&conn, &a.id, AppointmentStatus::Scheduled).unwrap();
        update_appointment(
            &conn,
            &a.id,
            &AppointmentUpdate {
                time: Some("11:30".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let reloaded = get_appointment(&conn, &a.id).unwrap();
        assert_eq!(reloaded.status, AppointmentStatus::Scheduled);
        assert_eq!(reloaded.time, "11:30");
        assert_eq!(reloaded.date.to_string(), "2026-05-01");

        let missing = set_appointment_status(&conn, &Uuid::new_v4(), AppointmentStatus::Cancelled);
        assert!(matches!(missing, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn last_completed_checkup_date() {
        let conn = test_db();
        let (p, d) = seed_pair(&conn);
        assert_eq!(last_completed_for_patient(&conn, &p).unwrap(), None);

        insert_appointment(&conn, &appt(p, d, "2025-11-01", "09:00", AppointmentStatus::Completed)).unwrap();
        insert_appointment(&conn, &appt(p, d, "2026-01-20", "09:00", AppointmentStatus::Completed)).unwrap();
        assert_eq!(
            last_completed_for_patient(&conn, &p).unwrap(),
            Some("2026-01-20".parse().unwrap())
        );
    }
}
