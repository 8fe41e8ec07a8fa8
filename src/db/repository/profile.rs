//! Role profiles and the doctor-patient care team.
//!
//! The `care_team` table is the single representation of "doctor X treats
//! patient Y": it is written whenever an appointment, prescription or
//! consultation first links the pair, and every relationship query reads
//! only this table.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::Role;
use crate::models::user::{Doctor, Patient, PatientListing, Pharmacist, ProviderListing};
use crate::scope::CallerIds;

use super::{opt_parsed_col, parsed_col};

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, user_id, medical_history) VALUES (?1, ?2, ?3)",
        params![
            patient.id.to_string(),
            patient.user_id.to_string(),
            patient.medical_history,
        ],
    )?;
    Ok(())
}

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, user_id, specialty, license_number) VALUES (?1, ?2, ?3, ?4)",
        params![
            doctor.id.to_string(),
            doctor.user_id.to_string(),
            doctor.specialty,
            doctor.license_number,
        ],
    )?;
    Ok(())
}

pub fn insert_pharmacist(conn: &Connection, pharmacist: &Pharmacist) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pharmacists (id, user_id, license_number, pharmacy_name, pharmacy_address)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            pharmacist.id.to_string(),
            pharmacist.user_id.to_string(),
            pharmacist.license_number,
            pharmacist.pharmacy_name,
            pharmacist.pharmacy_address,
        ],
    )?;
    Ok(())
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: parsed_col(row, 0)?,
        user_id: parsed_col(row, 1)?,
        medical_history: row.get(2)?,
    })
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Patient, DatabaseError> {
    conn.query_row(
        "SELECT id, user_id, medical_history FROM patients WHERE id = ?1",
        params![id.to_string()],
        patient_from_row,
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "patient".into(),
        id: id.to_string(),
    })
}

pub fn patient_by_user(conn: &Connection, user_id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, medical_history FROM patients WHERE user_id = ?1",
            params![user_id.to_string()],
            patient_from_row,
        )
        .optional()?)
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Doctor, DatabaseError> {
    conn.query_row(
        "SELECT id, user_id, specialty, license_number FROM doctors WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok(Doctor {
                id: parsed_col(row, 0)?,
                user_id: parsed_col(row, 1)?,
                specialty: row.get(2)?,
                license_number: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "doctor".into(),
        id: id.to_string(),
    })
}

pub fn doctor_by_user(conn: &Connection, user_id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, specialty, license_number FROM doctors WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok(Doctor {
                    id: parsed_col(row, 0)?,
                    user_id: parsed_col(row, 1)?,
                    specialty: row.get(2)?,
                    license_number: row.get(3)?,
                })
            },
        )
        .optional()?)
}

pub fn pharmacist_by_user(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Option<Pharmacist>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, license_number, pharmacy_name, pharmacy_address
             FROM pharmacists WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| {
                Ok(Pharmacist {
                    id: parsed_col(row, 0)?,
                    user_id: parsed_col(row, 1)?,
                    license_number: row.get(2)?,
                    pharmacy_name: row.get(3)?,
                    pharmacy_address: row.get(4)?,
                })
            },
        )
        .optional()?)
}

/// Resolve the caller's profile ids for query scoping. Roles without a
/// profile table resolve to an empty set.
pub fn caller_ids(conn: &Connection, user_id: &Uuid, role: Role) -> Result<CallerIds, DatabaseError> {
    let mut ids = CallerIds::default();
    match role {
        Role::Patient => ids.patient_id = patient_by_user(conn, user_id)?.map(|p| p.id),
        Role::Doctor => ids.doctor_id = doctor_by_user(conn, user_id)?.map(|d| d.id),
        Role::Pharmacist | Role::Admin | Role::Distributor => {}
    }
    Ok(ids)
}

pub fn update_patient_history(
    conn: &Connection,
    user_id: &Uuid,
    medical_history: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET medical_history = ?1 WHERE user_id = ?2",
        params![medical_history, user_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: user_id.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorProfileUpdate {
    pub specialty: Option<String>,
    pub license_number: Option<String>,
}

pub fn update_doctor_profile(
    conn: &Connection,
    user_id: &Uuid,
    update: &DoctorProfileUpdate,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctors SET
            specialty = COALESCE(?1, specialty),
            license_number = COALESCE(?2, license_number)
         WHERE user_id = ?3",
        params![update.specialty, update.license_number, user_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "doctor".into(),
            id: user_id.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PharmacistProfileUpdate {
    pub license_number: Option<String>,
    pub pharmacy_name: Option<String>,
    pub pharmacy_address: Option<String>,
}

pub fn update_pharmacist_profile(
    conn: &Connection,
    user_id: &Uuid,
    update: &PharmacistProfileUpdate,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE pharmacists SET
            license_number = COALESCE(?1, license_number),
            pharmacy_name = COALESCE(?2, pharmacy_name),
            pharmacy_address = COALESCE(?3, pharmacy_address)
         WHERE user_id = ?4",
        params![
            update.license_number,
            update.pharmacy_name,
            update.pharmacy_address,
            user_id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "pharmacist".into(),
            id: user_id.to_string(),
        });
    }
    Ok(())
}

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<ProviderListing> {
    Ok(ProviderListing {
        id: parsed_col(row, 0)?,
        user_id: parsed_col(row, 1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        specialty: row.get(4)?,
        license_number: row.get(5)?,
        pharmacy_name: row.get(6)?,
    })
}

pub fn list_doctors(conn: &Connection) -> Result<Vec<ProviderListing>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.user_id, u.name, u.email, d.specialty, d.license_number, NULL
         FROM doctors d JOIN users u ON u.id = d.user_id
         ORDER BY u.name",
    )?;
    let rows = stmt.query_map([], provider_from_row)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn get_doctor_listing(conn: &Connection, id: &Uuid) -> Result<ProviderListing, DatabaseError> {
    conn.query_row(
        "SELECT d.id, d.user_id, u.name, u.email, d.specialty, d.license_number, NULL
         FROM doctors d JOIN users u ON u.id = d.user_id
         WHERE d.id = ?1",
        params![id.to_string()],
        provider_from_row,
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "doctor".into(),
        id: id.to_string(),
    })
}

pub fn list_pharmacists(conn: &Connection) -> Result<Vec<ProviderListing>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.user_id, u.name, u.email, NULL, p.license_number, p.pharmacy_name
         FROM pharmacists p JOIN users u ON u.id = p.user_id
         ORDER BY u.name",
    )?;
    let rows = stmt.query_map([], provider_from_row)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn get_pharmacist_listing(
    conn: &Connection,
    id: &Uuid,
) -> Result<ProviderListing, DatabaseError> {
    conn.query_row(
        "SELECT p.id, p.user_id, u.name, u.email, NULL, p.license_number, p.pharmacy_name
         FROM pharmacists p JOIN users u ON u.id = p.user_id
         WHERE p.id = ?1",
        params![id.to_string()],
        provider_from_row,
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "pharmacist".into(),
        id: id.to_string(),
    })
}

/// Record the relationship; repeat links are a no-op.
pub fn ensure_care_team(
    conn: &Connection,
    patient_id: &Uuid,
    doctor_id: &Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO care_team (patient_id, doctor_id) VALUES (?1, ?2)",
        params![patient_id.to_string(), doctor_id.to_string()],
    )?;
    Ok(())
}

pub fn care_team_exists(
    conn: &Connection,
    patient_id: &Uuid,
    doctor_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM care_team WHERE patient_id = ?1 AND doctor_id = ?2",
        params![patient_id.to_string(), doctor_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_doctors_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM care_team WHERE patient_id = ?1",
        params![patient_id.to_string()],
        |row| row.get(0),
    )?)
}

pub fn count_patients_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM care_team WHERE doctor_id = ?1",
        params![doctor_id.to_string()],
        |row| row.get(0),
    )?)
}

pub fn patients_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<PatientListing>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.user_id, u.name, u.email, u.birth_date
         FROM care_team ct
         JOIN patients p ON p.id = ct.patient_id
         JOIN users u ON u.id = p.user_id
         WHERE ct.doctor_id = ?1
         ORDER BY u.name",
    )?;
    let rows = stmt.query_map(params![doctor_id.to_string()], |row| {
        Ok(PatientListing {
            id: parsed_col(row, 0)?,
            user_id: parsed_col(row, 1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            birth_date: opt_parsed_col(row, 4)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{seed_user, test_db};
    use super::*;

    #[test]
    fn care_team_link_is_idempotent() {
        let conn = test_db();
        let patient_user = seed_user(&conn, Role::Patient);
        let doctor_user = seed_user(&conn, Role::Doctor);
        let patient = patient_by_user(&conn, &patient_user.id).unwrap().unwrap();
        let doctor = doctor_by_user(&conn, &doctor_user.id).unwrap().unwrap();

        ensure_care_team(&conn, &patient.id, &doctor.id).unwrap();
        ensure_care_team(&conn, &patient.id, &doctor.id).unwrap();

        assert_eq!(count_patients_for_doctor(&conn, &doctor.id).unwrap(), 1);
        assert_eq!(count_doctors_for_patient(&conn, &patient.id).unwrap(), 1);
    }

    #[test]
    fn doctor_roster_resolves_patient_users() {
        let conn = test_db();
        let doctor_user = seed_user(&conn, Role::Doctor);
        let doctor = doctor_by_user(&conn, &doctor_user.id).unwrap().unwrap();

        for _ in 0..2 {
            let patient_user = seed_user(&conn, Role::Patient);
            let patient = patient_by_user(&conn, &patient_user.id).unwrap().unwrap();
            ensure_care_team(&conn, &patient.id, &doctor.id).unwrap();
        }

        let roster = patients_for_doctor(&conn, &doctor.id).unwrap();
        assert_eq!(roster.len(), 2);
        assert!(roster.iter().all(|p| !p.email.is_empty()));
    }

    #[test]
    fn caller_ids_match_role_profile() {
        let conn = test_db();
        let patient_user = seed_user(&conn, Role::Patient);
        let ids = caller_ids(&conn, &patient_user.id, Role::Patient).unwrap();
        assert!(ids.patient_id.is_some());
        assert!(ids.doctor_id.is_none());

        let admin_user = seed_user(&conn, Role::Admin);
        let ids = caller_ids(&conn, &admin_user.id, Role::Admin).unwrap();
        assert!(ids.patient_id.is_none() && ids.doctor_id.is_none());
    }

    #[test]
    fn provider_directory_lists_doctors() {
        let conn = test_db();
        let doctor_user = seed_user(&conn, Role::Doctor);
        seed_user(&conn, Role::Pharmacist);

        let doctors = list_doctors(&conn).unwrap();
        assert_eq!(doctors.len(), 1);
        assert_eq!(doctors[0].user_id, doctor_user.id);
        assert_eq!(doctors[0].specialty.as_deref(), Some("general"));

        let pharmacists = list_pharmacists(&conn).unwrap();
        assert_eq!(pharmacists.len(), 1);
        assert!(pharmacists[0].specialty.is_none());
    }

    #[test]
    fn pharmacist_profile_update_merges() {
        let conn = test_db();
        let user = seed_user(&conn, Role::Pharmacist);
        update_pharmacist_profile(
            &conn,
            &user.id,
            &PharmacistProfileUpdate {
                pharmacy_name: Some("Central Pharmacy".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let profile = pharmacist_by_user(&conn, &user.id).unwrap().unwrap();
        assert_eq!(profile.pharmacy_name.as_deref(), Some("Central Pharmacy"));
    }
}
