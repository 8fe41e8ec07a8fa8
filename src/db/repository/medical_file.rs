//! Medical files and their clinical sub-collections, plus the append-only
//! access log that feeds the doctor and admin dashboards.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::medical_file::{
    AccessLogEntry, Allergy, EmergencyContact, FileMedication, Immunization, Insurance, LabResult,
    MedicalFile, VitalsEntry,
};

use super::{datetime_col, fmt_datetime, opt_parsed_col, parsed_col};

pub fn insert_medical_file(conn: &Connection, file: &MedicalFile) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medical_files
            (id, patient_id, blood_type, emergency_contact_name, emergency_contact_phone,
             emergency_contact_relation, insurance_provider, insurance_policy_number, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            file.id.to_string(),
            file.patient_id.to_string(),
            file.blood_type,
            file.emergency_contact.as_ref().map(|c| c.name.clone()),
            file.emergency_contact.as_ref().map(|c| c.phone.clone()),
            file.emergency_contact.as_ref().and_then(|c| c.relation.clone()),
            file.insurance.as_ref().map(|i| i.provider.clone()),
            file.insurance.as_ref().map(|i| i.policy_number.clone()),
            fmt_datetime(file.created_at),
        ],
    )?;
    Ok(())
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<MedicalFile> {
    let contact_name: Option<String> = row.get(3)?;
    let contact_phone: Option<String> = row.get(4)?;
    let emergency_contact = match (contact_name, contact_phone) {
        (Some(name), Some(phone)) => Some(EmergencyContact {
            name,
            phone,
            relation: row.get(5)?,
        }),
        _ => None,
    };
    let provider: Option<String> = row.get(6)?;
    let policy: Option<String> = row.get(7)?;
    let insurance = match (provider, policy) {
        (Some(provider), Some(policy_number)) => Some(Insurance {
            provider,
            policy_number,
        }),
        _ => None,
    };
    Ok(MedicalFile {
        id: parsed_col(row, 0)?,
        patient_id: parsed_col(row, 1)?,
        blood_type: row.get(2)?,
        emergency_contact,
        insurance,
        created_at: datetime_col(row, 8)?,
    })
}

const FILE_COLS: &str = "id, patient_id, blood_type, emergency_contact_name, \
     emergency_contact_phone, emergency_contact_relation, insurance_provider, \
     insurance_policy_number, created_at";

pub fn get_file(conn: &Connection, id: &Uuid) -> Result<MedicalFile, DatabaseError> {
    conn.query_row(
        &format!("SELECT {FILE_COLS} FROM medical_files WHERE id = ?1"),
        params![id.to_string()],
        file_from_row,
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "medical_file".into(),
        id: id.to_string(),
    })
}

pub fn file_by_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<MedicalFile>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {FILE_COLS} FROM medical_files WHERE patient_id = ?1"),
            params![patient_id.to_string()],
            file_from_row,
        )
        .optional()?)
}

/// Partial update of the file header. A supplied contact or insurance
/// block replaces the whole block; absent blocks are untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedicalFileUpdate {
    pub blood_type: Option<String>,
    pub emergency_contact: Option<EmergencyContact>,
    pub insurance: Option<Insurance>,
}

pub fn update_file_details(
    conn: &Connection,
    file_id: &Uuid,
    update: &MedicalFileUpdate,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE medical_files SET
            blood_type = COALESCE(?1, blood_type),
            emergency_contact_name = COALESCE(?2, emergency_contact_name),
            emergency_contact_phone = COALESCE(?3, emergency_contact_phone),
            emergency_contact_relation = CASE WHEN ?2 IS NULL
                THEN emergency_contact_relation ELSE ?4 END,
            insurance_provider = COALESCE(?5, insurance_provider),
            insurance_policy_number = COALESCE(?6, insurance_policy_number)
         WHERE id = ?7",
        params![
            update.blood_type,
            update.emergency_contact.as_ref().map(|c| c.name.clone()),
            update.emergency_contact.as_ref().map(|c| c.phone.clone()),
            update.emergency_contact.as_ref().and_then(|c| c.relation.clone()),
            update.insurance.as_ref().map(|i| i.provider.clone()),
            update.insurance.as_ref().map(|i| i.policy_number.clone()),
            file_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "medical_file".into(),
            id: file_id.to_string(),
        });
    }
    Ok(())
}

pub fn insert_vitals(conn: &Connection, entry: &VitalsEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO vitals (id, medical_file_id, recorded_at, blood_pressure, heart_rate, temperature, weight)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id.to_string(),
            entry.medical_file_id.to_string(),
            fmt_datetime(entry.recorded_at),
            entry.blood_pressure,
            entry.heart_rate,
            entry.temperature,
            entry.weight,
        ],
    )?;
    Ok(())
}

fn vitals_from_row(row: &Row<'_>) -> rusqlite::Result<VitalsEntry> {
    Ok(VitalsEntry {
        id: parsed_col(row, 0)?,
        medical_file_id: parsed_col(row, 1)?,
        recorded_at: datetime_col(row, 2)?,
        blood_pressure: row.get(3)?,
        heart_rate: row.get(4)?,
        temperature: row.get(5)?,
        weight: row.get(6)?,
    })
}

pub fn vitals_for_file(conn: &Connection, file_id: &Uuid) -> Result<Vec<VitalsEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, medical_file_id, recorded_at, blood_pressure, heart_rate, temperature, weight
         FROM vitals WHERE medical_file_id = ?1 ORDER BY recorded_at DESC",
    )?;
    let rows = stmt.query_map(params![file_id.to_string()], vitals_from_row)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn latest_vitals(conn: &Connection, file_id: &Uuid) -> Result<Option<VitalsEntry>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, medical_file_id, recorded_at, blood_pressure, heart_rate, temperature, weight
             FROM vitals WHERE medical_file_id = ?1 ORDER BY recorded_at DESC LIMIT 1",
            params![file_id.to_string()],
            vitals_from_row,
        )
        .optional()?)
}

/// Last `limit` blood-pressure readings, oldest first (chart order).
pub fn recent_blood_pressure(
    conn: &Connection,
    file_id: &Uuid,
    limit: u32,
) -> Result<Vec<(NaiveDateTime, String)>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT recorded_at, blood_pressure FROM (
             SELECT recorded_at, blood_pressure FROM vitals
             WHERE medical_file_id = ?1 AND blood_pressure IS NOT NULL
             ORDER BY recorded_at DESC LIMIT {limit}
         ) ORDER BY recorded_at ASC"
    ))?;
    let rows = stmt.query_map(params![file_id.to_string()], |row| {
        Ok((datetime_col(row, 0)?, row.get(1)?))
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn insert_allergy(conn: &Connection, allergy: &Allergy) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO allergies (id, medical_file_id, allergen, reaction, severity)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            allergy.id.to_string(),
            allergy.medical_file_id.to_string(),
            allergy.allergen,
            allergy.reaction,
            allergy.severity,
        ],
    )?;
    Ok(())
}

pub fn allergies_for_file(conn: &Connection, file_id: &Uuid) -> Result<Vec<Allergy>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, medical_file_id, allergen, reaction, severity
         FROM allergies WHERE medical_file_id = ?1 ORDER BY allergen",
    )?;
    let rows = stmt.query_map(params![file_id.to_string()], |row| {
        Ok(Allergy {
            id: parsed_col(row, 0)?,
            medical_file_id: parsed_col(row, 1)?,
            allergen: row.get(2)?,
            reaction: row.get(3)?,
            severity: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn delete_allergy(conn: &Connection, id: &Uuid, file_id: &Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM allergies WHERE id = ?1 AND medical_file_id = ?2",
        params![id.to_string(), file_id.to_string()],
    )?;
    Ok(changed > 0)
}

pub fn insert_file_medication(
    conn: &Connection,
    medication: &FileMedication,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO file_medications (id, medical_file_id, name, dosage, frequency, started_on, stopped_on)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            medication.id.to_string(),
            medication.medical_file_id.to_string(),
            medication.name,
            medication.dosage,
            medication.frequency,
            medication.started_on.map(|d| d.to_string()),
            medication.stopped_on.map(|d| d.to_string()),
        ],
    )?;
    Ok(())
}

pub fn medications_for_file(
    conn: &Connection,
    file_id: &Uuid,
) -> Result<Vec<FileMedication>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, medical_file_id, name, dosage, frequency, started_on, stopped_on
         FROM file_medications WHERE medical_file_id = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![file_id.to_string()], |row| {
        Ok(FileMedication {
            id: parsed_col(row, 0)?,
            medical_file_id: parsed_col(row, 1)?,
            name: row.get(2)?,
            dosage: row.get(3)?,
            frequency: row.get(4)?,
            started_on: opt_parsed_col(row, 5)?,
            stopped_on: opt_parsed_col(row, 6)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileMedicationUpdate {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub started_on: Option<chrono::NaiveDate>,
    pub stopped_on: Option<chrono::NaiveDate>,
}

pub fn update_file_medication(
    conn: &Connection,
    id: &Uuid,
    file_id: &Uuid,
    update: &FileMedicationUpdate,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE file_medications SET
            name = COALESCE(?1, name),
            dosage = COALESCE(?2, dosage),
            frequency = COALESCE(?3, frequency),
            started_on = COALESCE(?4, started_on),
            stopped_on = COALESCE(?5, stopped_on)
         WHERE id = ?6 AND medical_file_id = ?7",
        params![
            update.name,
            update.dosage,
            update.frequency,
            update.started_on.map(|d| d.to_string()),
            update.stopped_on.map(|d| d.to_string()),
            id.to_string(),
            file_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "medication".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_file_medication(
    conn: &Connection,
    id: &Uuid,
    file_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM file_medications WHERE id = ?1 AND medical_file_id = ?2",
        params![id.to_string(), file_id.to_string()],
    )?;
    Ok(changed > 0)
}

pub fn insert_immunization(
    conn: &Connection,
    immunization: &Immunization,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO immunizations (id, medical_file_id, vaccine, administered_on)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            immunization.id.to_string(),
            immunization.medical_file_id.to_string(),
            immunization.vaccine,
            immunization.administered_on.map(|d| d.to_string()),
        ],
    )?;
    Ok(())
}

pub fn immunizations_for_file(
    conn: &Connection,
    file_id: &Uuid,
) -> Result<Vec<Immunization>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, medical_file_id, vaccine, administered_on
         FROM immunizations WHERE medical_file_id = ?1 ORDER BY administered_on DESC",
    )?;
    let rows = stmt.query_map(params![file_id.to_string()], |row| {
        Ok(Immunization {
            id: parsed_col(row, 0)?,
            medical_file_id: parsed_col(row, 1)?,
            vaccine: row.get(2)?,
            administered_on: opt_parsed_col(row, 3)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn insert_lab_result(conn: &Connection, lab: &LabResult) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO lab_results (id, medical_file_id, test_name, result, unit, collected_on)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            lab.id.to_string(),
            lab.medical_file_id.to_string(),
            lab.test_name,
            lab.result,
            lab.unit,
            lab.collected_on.map(|d| d.to_string()),
        ],
    )?;
    Ok(())
}

pub fn lab_results_for_file(
    conn: &Connection,
    file_id: &Uuid,
) -> Result<Vec<LabResult>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, medical_file_id, test_name, result, unit, collected_on
         FROM lab_results WHERE medical_file_id = ?1 ORDER BY collected_on DESC",
    )?;
    let rows = stmt.query_map(params![file_id.to_string()], |row| {
        Ok(LabResult {
            id: parsed_col(row, 0)?,
            medical_file_id: parsed_col(row, 1)?,
            test_name: row.get(2)?,
            result: row.get(3)?,
            unit: row.get(4)?,
            collected_on: opt_parsed_col(row, 5)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// Append-only.
pub fn log_access(
    conn: &Connection,
    file_id: &Uuid,
    accessor_user_id: &Uuid,
    action: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO access_log (id, medical_file_id, accessor_user_id, action)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            Uuid::new_v4().to_string(),
            file_id.to_string(),
            accessor_user_id.to_string(),
            action,
        ],
    )?;
    Ok(())
}

pub fn access_log_for_file(
    conn: &Connection,
    file_id: &Uuid,
    limit: u32,
) -> Result<Vec<AccessLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, medical_file_id, accessor_user_id, action, accessed_at
         FROM access_log WHERE medical_file_id = ?1
         ORDER BY accessed_at DESC LIMIT {limit}"
    ))?;
    let rows = stmt.query_map(params![file_id.to_string()], |row| {
        Ok(AccessLogEntry {
            id: parsed_col(row, 0)?,
            medical_file_id: parsed_col(row, 1)?,
            accessor_user_id: parsed_col(row, 2)?,
            action: row.get(3)?,
            accessed_at: datetime_col(row, 4)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// File access resolved to the patient it concerns; names stay optional
/// so broken references can fall back to a placeholder downstream.
#[derive(Debug, Clone, Serialize)]
pub struct AccessView {
    pub patient_name: Option<String>,
    pub action: String,
    pub accessed_at: NaiveDateTime,
}

pub fn recent_access_for_user(
    conn: &Connection,
    accessor_user_id: &Uuid,
    limit: u32,
) -> Result<Vec<AccessView>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT u.name, a.action, a.accessed_at
         FROM access_log a
         JOIN medical_files f ON f.id = a.medical_file_id
         LEFT JOIN patients p ON p.id = f.patient_id
         LEFT JOIN users u ON u.id = p.user_id
         WHERE a.accessor_user_id = ?1
         ORDER BY a.accessed_at DESC LIMIT {limit}"
    ))?;
    let rows = stmt.query_map(params![accessor_user_id.to_string()], |row| {
        Ok(AccessView {
            patient_name: row.get(0)?,
            action: row.get(1)?,
            accessed_at: datetime_col(row, 2)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// System-wide access feed for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub actor_name: Option<String>,
    pub patient_name: Option<String>,
    pub action: String,
    pub at: NaiveDateTime,
}

pub fn activity_feed(conn: &Connection, limit: u32) -> Result<Vec<ActivityEntry>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT actor.name, pu.name, a.action, a.accessed_at
         FROM access_log a
         LEFT JOIN users actor ON actor.id = a.accessor_user_id
         JOIN medical_files f ON f.id = a.medical_file_id
         LEFT JOIN patients p ON p.id = f.patient_id
         LEFT JOIN users pu ON pu.id = p.user_id
         ORDER BY a.accessed_at DESC LIMIT {limit}"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(ActivityEntry {
            actor_name: row.get(0)?,
            patient_name: row.get(1)?,
            action: row.get(2)?,
            at: datetime_col(row, 3)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::super::testutil::{seed_user, test_db};
    use super::super::patient_by_user;
    use super::*;
    use crate::models::enums::Role;

    fn seed_file(conn: &Connection) -> MedicalFile {
        let user = seed_user(conn, Role::Patient);
        let patient = patient_by_user(conn, &user.id).unwrap().unwrap();
        file_by_patient(conn, &patient.id).unwrap().unwrap()
    }

    fn vitals(file_id: Uuid, minutes_ago: i64, bp: Option<&str>) -> VitalsEntry {
        VitalsEntry {
            id: Uuid::new_v4(),
            medical_file_id: file_id,
            recorded_at: Utc::now().naive_utc() - Duration::minutes(minutes_ago),
            blood_pressure: bp.map(str::to_string),
            heart_rate: Some(72),
            temperature: Some(36.8),
            weight: Some(70.0),
        }
    }

    #[test]
    fn blood_pressure_series_is_oldest_first() {
        let conn = test_db();
        let file = seed_file(&conn);
        for (ago, bp) in [(50, "110/70"), (40, "120/80"), (30, "130/85"), (20, "125/82")] {
            insert_vitals(&conn, &vitals(file.id, ago, Some(bp))).unwrap();
        }
        insert_vitals(&conn, &vitals(file.id, 10, None)).unwrap();

        let series = recent_blood_pressure(&conn, &file.id, 3).unwrap();
        let readings: Vec<&str> = series.iter().map(|(_, bp)| bp.as_str()).collect();
        assert_eq!(readings, vec!["120/80", "130/85", "125/82"]);
    }

    #[test]
    fn latest_vitals_is_most_recent() {
        let conn = test_db();
        let file = seed_file(&conn);
        insert_vitals(&conn, &vitals(file.id, 60, Some("110/70"))).unwrap();
        insert_vitals(&conn, &vitals(file.id, 5, Some("140/90"))).unwrap();

        let latest = latest_vitals(&conn, &file.id).unwrap().unwrap();
        assert_eq!(latest.blood_pressure.as_deref(), Some("140/90"));
    }

    #[test]
    fn file_header_update_replaces_whole_contact_block() {
        let conn = test_db();
        let file = seed_file(&conn);
        update_file_details(
            &conn,
            &file.id,
            &MedicalFileUpdate {
                blood_type: Some("O+".into()),
                emergency_contact: Some(EmergencyContact {
                    name: "Nadia".into(),
                    phone: "555-0199".into(),
                    relation: Some("sister".into()),
                }),
                insurance: None,
            },
        )
        .unwrap();

        let reloaded = get_file(&conn, &file.id).unwrap();
        assert_eq!(reloaded.blood_type.as_deref(), Some("O+"));
        let contact = reloaded.emergency_contact.unwrap();
        assert_eq!(contact.relation.as_deref(), Some("sister"));
        assert!(reloaded.insurance.is_none());
    }

    #[test]
    fn access_log_is_append_only_and_joined() {
        let conn = test_db();
        let file = seed_file(&conn);
        let doctor = seed_user(&conn, Role::Doctor);

        log_access(&conn, &file.id, &doctor.id, "viewed").unwrap();
        log_access(&conn, &file.id, &doctor.id, "updated vitals").unwrap();

        let entries = access_log_for_file(&conn, &file.id, 10).unwrap();
        assert_eq!(entries.len(), 2);

        let mine = recent_access_for_user(&conn, &doctor.id, 5).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].patient_name.is_some());

        let feed = activity_feed(&conn, 10).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].actor_name.as_deref(), Some(doctor.name.as_str()));
    }

    #[test]
    fn sub_collections_round_trip() {
        let conn = test_db();
        let file = seed_file(&conn);

        insert_allergy(
            &conn,
            &Allergy {
                id: Uuid::new_v4(),
                medical_file_id: file.id,
                allergen: "penicillin".into(),
                reaction: Some("rash".into()),
                severity: Some("moderate".into()),
            },
        )
        .unwrap();
        let allergies = allergies_for_file(&conn, &file.id).unwrap();
        assert_eq!(allergies.len(), 1);
        assert!(delete_allergy(&conn, &allergies[0].id, &file.id).unwrap());
        assert!(allergies_for_file(&conn, &file.id).unwrap().is_empty());

        insert_immunization(
            &conn,
            &Immunization {
                id: Uuid::new_v4(),
                medical_file_id: file.id,
                vaccine: "tetanus".into(),
                administered_on: chrono::NaiveDate::from_ymd_opt(2023, 5, 10),
            },
        )
        .unwrap();
        assert_eq!(immunizations_for_file(&conn, &file.id).unwrap().len(), 1);

        insert_lab_result(
            &conn,
            &LabResult {
                id: Uuid::new_v4(),
                medical_file_id: file.id,
                test_name: "HbA1c".into(),
                result: Some("5.4".into()),
                unit: Some("%".into()),
                collected_on: chrono::NaiveDate::from_ymd_opt(2024, 1, 15),
            },
        )
        .unwrap();
        assert_eq!(lab_results_for_file(&conn, &file.id).unwrap().len(), 1);
    }
}
