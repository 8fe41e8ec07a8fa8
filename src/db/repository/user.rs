//! Users: accounts, registration, credentials, admin aggregates.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::Role;
use crate::models::medical_file::MedicalFile;
use crate::models::user::{Doctor, Patient, Pharmacist, User, UserSummary};

use super::{datetime_col, fmt_datetime, opt_parsed_col, parsed_col};

const USER_COLS: &str =
    "id, email, password_hash, name, role, phone, address, birth_date, gender, email_verified, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parsed_col(row, 0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        role: parsed_col(row, 4)?,
        phone: row.get(5)?,
        address: row.get(6)?,
        birth_date: opt_parsed_col(row, 7)?,
        gender: row.get(8)?,
        email_verified: row.get(9)?,
        created_at: datetime_col(row, 10)?,
    })
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, email, password_hash, name, role, phone, address, birth_date, gender, email_verified, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            user.id.to_string(),
            user.email,
            user.password_hash,
            user.name,
            user.role.as_str(),
            user.phone,
            user.address,
            user.birth_date.map(|d| d.to_string()),
            user.gender,
            user.email_verified,
            fmt_datetime(user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<User, DatabaseError> {
    conn.query_row(
        &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
        params![id.to_string()],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "user".into(),
        id: id.to_string(),
    })
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
            params![email],
            user_from_row,
        )
        .optional()?)
}

/// Partial profile update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
}

pub fn update_user_profile(
    conn: &Connection,
    id: &Uuid,
    update: &UserProfileUpdate,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET
            name = COALESCE(?1, name),
            phone = COALESCE(?2, phone),
            address = COALESCE(?3, address),
            birth_date = COALESCE(?4, birth_date),
            gender = COALESCE(?5, gender)
         WHERE id = ?6",
        params![
            update.name,
            update.phone,
            update.address,
            update.birth_date.map(|d| d.to_string()),
            update.gender,
            id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "user".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn update_password(
    conn: &Connection,
    user_id: &Uuid,
    password_hash: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        params![password_hash, user_id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "user".into(),
            id: user_id.to_string(),
        });
    }
    Ok(())
}

/// Registration payload covering all roles; the role-specific fields are
/// ignored for roles they do not apply to.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub medical_history: Option<String>,
    pub specialty: Option<String>,
    pub license_number: Option<String>,
    pub pharmacy_name: Option<String>,
    pub pharmacy_address: Option<String>,
}

/// Create the account, its role profile, and (for patients) the medical
/// file in one transaction. A failure at any step leaves no partial rows.
pub fn register_user(conn: &Connection, reg: NewRegistration) -> Result<User, DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    if find_user_by_email(&tx, &reg.email)?.is_some() {
        return Err(DatabaseError::ConstraintViolation(
            "email already registered".into(),
        ));
    }

    let user = User {
        id: Uuid::new_v4(),
        email: reg.email,
        password_hash: reg.password_hash,
        name: reg.name,
        role: reg.role,
        phone: reg.phone,
        address: reg.address,
        birth_date: reg.birth_date,
        gender: reg.gender,
        email_verified: false,
        created_at: Utc::now().naive_utc(),
    };
    insert_user(&tx, &user)?;

    match reg.role {
        Role::Patient => {
            let patient = Patient {
                id: Uuid::new_v4(),
                user_id: user.id,
                medical_history: reg.medical_history,
            };
            super::insert_patient(&tx, &patient)?;
            super::insert_medical_file(
                &tx,
                &MedicalFile {
                    id: Uuid::new_v4(),
                    patient_id: patient.id,
                    blood_type: None,
                    emergency_contact: None,
                    insurance: None,
                    created_at: user.created_at,
                },
            )?;
        }
        Role::Doctor => {
            super::insert_doctor(
                &tx,
                &Doctor {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    specialty: reg.specialty,
                    license_number: reg.license_number,
                },
            )?;
        }
        Role::Pharmacist => {
            super::insert_pharmacist(
                &tx,
                &Pharmacist {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    license_number: reg.license_number,
                    pharmacy_name: reg.pharmacy_name,
                    pharmacy_address: reg.pharmacy_address,
                },
            )?;
        }
        Role::Admin | Role::Distributor => {}
    }

    tx.commit()?;
    Ok(user)
}

pub fn count_users_by_role(conn: &Connection) -> Result<Vec<(String, i64)>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT role, COUNT(*) FROM users GROUP BY role")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn recent_users(conn: &Connection, limit: u32) -> Result<Vec<UserSummary>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, email, role, created_at FROM users
         ORDER BY created_at DESC, id LIMIT {limit}"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(UserSummary {
            id: parsed_col(row, 0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            role: parsed_col(row, 3)?,
            created_at: datetime_col(row, 4)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// Month-bucketed registration counts for the trailing window.
/// One (month, role) bucket in the registration time series.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistrationPoint {
    /// `YYYY-MM`
    pub month: String,
    pub role: String,
    pub count: i64,
}

pub fn registration_series(
    conn: &Connection,
    months: u32,
) -> Result<Vec<RegistrationPoint>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT strftime('%Y-%m', created_at) AS month, role, COUNT(*)
         FROM users
         WHERE created_at >= date('now', 'start of month', ?1)
         GROUP BY month, role ORDER BY month, role",
    )?;
    let window = format!("-{} months", months.saturating_sub(1));
    let rows = stmt.query_map(params![window], |row| {
        Ok(RegistrationPoint {
            month: row.get(0)?,
            role: row.get(1)?,
            count: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn create_password_reset(
    conn: &Connection,
    user_id: &Uuid,
    token_hash: &str,
    expires_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO password_resets (id, user_id, token_hash, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            Uuid::new_v4().to_string(),
            user_id.to_string(),
            token_hash,
            fmt_datetime(expires_at),
        ],
    )?;
    Ok(())
}

/// Single-use: a valid token is marked used and its user id returned;
/// unknown, expired, or already-used tokens return `None`.
pub fn consume_password_reset(
    conn: &Connection,
    token_hash: &str,
) -> Result<Option<Uuid>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let found: Option<(String, String)> = tx
        .query_row(
            "SELECT id, user_id FROM password_resets
             WHERE token_hash = ?1 AND used = 0 AND expires_at > datetime('now')",
            params![token_hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((id, user_id)) = found else {
        return Ok(None);
    };
    tx.execute("UPDATE password_resets SET used = 1 WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(Some(super::parsed_uuid(&user_id)?))
}

pub fn create_email_verification(
    conn: &Connection,
    user_id: &Uuid,
    token_hash: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO email_verifications (id, user_id, token_hash) VALUES (?1, ?2, ?3)",
        params![Uuid::new_v4().to_string(), user_id.to_string(), token_hash],
    )?;
    Ok(())
}

/// Marks the verification row and the account; returns the verified user
/// id, or `None` for unknown/already-consumed tokens.
pub fn confirm_email_token(
    conn: &Connection,
    token_hash: &str,
) -> Result<Option<Uuid>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let found: Option<(String, String)> = tx
        .query_row(
            "SELECT id, user_id FROM email_verifications
             WHERE token_hash = ?1 AND verified_at IS NULL",
            params![token_hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((id, user_id)) = found else {
        return Ok(None);
    };
    tx.execute(
        "UPDATE email_verifications SET verified_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    tx.execute(
        "UPDATE users SET email_verified = 1 WHERE id = ?1",
        params![user_id],
    )?;
    tx.commit()?;
    Ok(Some(super::parsed_uuid(&user_id)?))
}

#[cfg(test)]
mod tests {
    use super::super::testutil::test_db;
    use super::super::{file_by_patient, patient_by_user, seed_registration};
    use super::*;

    #[test]
    fn registration_creates_profile_and_medical_file() {
        let conn = test_db();
        let user = register_user(&conn, seed_registration(Role::Patient)).unwrap();
        assert_eq!(user.role, Role::Patient);

        let patient = patient_by_user(&conn, &user.id).unwrap().unwrap();
        let file = file_by_patient(&conn, &patient.id).unwrap().unwrap();
        assert_eq!(file.patient_id, patient.id);
    }

    #[test]
    fn duplicate_email_leaves_no_partial_rows() {
        let conn = test_db();
        let mut reg = seed_registration(Role::Patient);
        reg.email = "dup@safe.test".into();
        register_user(&conn, reg.clone()).unwrap();

        let err = register_user(&conn, reg).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));

        let users: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE email = 'dup@safe.test'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(users, 1);
        let patients: i64 = conn
            .query_row("SELECT COUNT(*) FROM patients", [], |r| r.get(0))
            .unwrap();
        assert_eq!(patients, 1);
    }

    #[test]
    fn profile_update_merges_supplied_fields_only() {
        let conn = test_db();
        let mut reg = seed_registration(Role::Doctor);
        reg.phone = Some("555-0100".into());
        let user = register_user(&conn, reg).unwrap();

        update_user_profile(
            &conn,
            &user.id,
            &UserProfileUpdate {
                address: Some("12 Rue Neuve".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let reloaded = get_user(&conn, &user.id).unwrap();
        assert_eq!(reloaded.phone.as_deref(), Some("555-0100"));
        assert_eq!(reloaded.address.as_deref(), Some("12 Rue Neuve"));
        assert_eq!(reloaded.name, user.name);
    }

    #[test]
    fn password_reset_is_single_use() {
        let conn = test_db();
        let user = register_user(&conn, seed_registration(Role::Patient)).unwrap();
        let expires = Utc::now().naive_utc() + chrono::Duration::hours(1);
        create_password_reset(&conn, &user.id, "reset-digest", expires).unwrap();

        assert_eq!(
            consume_password_reset(&conn, "reset-digest").unwrap(),
            Some(user.id)
        );
        assert_eq!(consume_password_reset(&conn, "reset-digest").unwrap(), None);
        assert_eq!(consume_password_reset(&conn, "never-issued").unwrap(), None);
    }

    #[test]
    fn expired_password_reset_is_rejected() {
        let conn = test_db();
        let user = register_user(&conn, seed_registration(Role::Patient)).unwrap();
        let expires = Utc::now().naive_utc() - chrono::Duration::hours(1);
        create_password_reset(&conn, &user.id, "stale-digest", expires).unwrap();
        assert_eq!(consume_password_reset(&conn, "stale-digest").unwrap(), None);
    }

    #[test]
    fn email_verification_flips_account_flag() {
        let conn = test_db();
        let user = register_user(&conn, seed_registration(Role::Patient)).unwrap();
        assert!(!user.email_verified);

        create_email_verification(&conn, &user.id, "verify-digest").unwrap();
        assert_eq!(
            confirm_email_token(&conn, "verify-digest").unwrap(),
            Some(user.id)
        );
        assert!(get_user(&conn, &user.id).unwrap().email_verified);
        // second confirmation is a no-op
        assert_eq!(confirm_email_token(&conn, "verify-digest").unwrap(), None);
    }

    #[test]
    fn registration_series_buckets_by_month_and_role() {
        let conn = test_db();
        register_user(&conn, seed_registration(Role::Patient)).unwrap();
        register_user(&conn, seed_registration(Role::Patient)).unwrap();
        register_user(&conn, seed_registration(Role::Doctor)).unwrap();

        let series = registration_series(&conn, 6).unwrap();
        let this_month = Utc::now().format("%Y-%m").to_string();
        let patients = series
            .iter()
            .find(|p| p.role == "patient")
            .expect("patient bucket");
        assert_eq!(patients.month, this_month);
        assert_eq!(patients.count, 2);
        assert_eq!(
            series.iter().find(|p| p.role == "doctor").unwrap().count,
            1
        );
    }

    #[test]
    fn admin_registration_has_no_profile_rows() {
        let conn = test_db();
        register_user(&conn, seed_registration(Role::Admin)).unwrap();
        let profiles: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM patients)
                      + (SELECT COUNT(*) FROM doctors)
                      + (SELECT COUNT(*) FROM pharmacists)",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(profiles, 0);
    }
}
