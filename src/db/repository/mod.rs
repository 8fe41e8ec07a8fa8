//! Repository layer — entity-scoped database operations.
//!
//! All functions take a `&Connection` and return `DatabaseError`. Ids are
//! stored as TEXT uuids, dates as `YYYY-MM-DD`, datetimes as
//! `YYYY-MM-DD HH:MM:SS` (the `datetime('now')` shape).

mod appointment;
mod consultation;
mod conversation;
mod medical_file;
mod notification;
mod prescription;
mod profile;
mod user;

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Row;

pub use appointment::*;
pub use consultation::*;
pub use conversation::*;
pub use medical_file::*;
pub use notification::*;
pub use prescription::*;
pub use profile::*;
pub use user::*;

pub(crate) const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn parsed_uuid(s: &str) -> Result<uuid::Uuid, crate::db::DatabaseError> {
    uuid::Uuid::parse_str(s)
        .map_err(|e| crate::db::DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn fmt_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn conv_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Read a TEXT column and parse it via `FromStr` (uuids, status enums,
/// dates in `YYYY-MM-DD`).
pub(crate) fn parsed_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conv_err(idx, e))
}

pub(crate) fn opt_parsed_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|s| s.parse().map_err(|e| conv_err(idx, e))).transpose()
}

/// Datetimes are stored in the `datetime('now')` shape, which is not the
/// ISO `T`-separated form `FromStr` expects.
pub(crate) fn datetime_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&s, DATETIME_FMT).map_err(|e| conv_err(idx, e))
}

pub(crate) fn opt_datetime_col(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<NaiveDateTime>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FMT).map_err(|e| conv_err(idx, e)))
        .transpose()
}

/// Registration payload with a unique email, for tests that need a user
/// of a given role without caring about the details.
#[cfg(test)]
pub(crate) fn seed_registration(role: crate::models::enums::Role) -> NewRegistration {
    NewRegistration {
        email: format!("{}@safe.test", uuid::Uuid::new_v4()),
        password_hash: "phc-hash".into(),
        name: format!("Test {}", role.as_str()),
        role,
        phone: None,
        address: None,
        birth_date: chrono::NaiveDate::from_ymd_opt(1990, 4, 2),
        gender: None,
        medical_history: None,
        specialty: Some("general".into()),
        license_number: None,
        pharmacy_name: None,
        pharmacy_address: None,
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use rusqlite::Connection;

    use crate::db::open_memory_database;
    use crate::models::enums::Role;
    use crate::models::user::User;

    use super::{register_user, seed_registration};

    pub fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    pub fn seed_user(conn: &Connection, role: Role) -> User {
        register_user(conn, seed_registration(role)).unwrap()
    }
}
