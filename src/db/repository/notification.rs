//! Per-user notifications (appointment updates, prescription fills,
//! consultation replies).

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::notification::Notification;

use super::{datetime_col, fmt_datetime, parsed_col};

pub fn notify(
    conn: &Connection,
    user_id: &Uuid,
    kind: &str,
    body: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO notifications (id, user_id, kind, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            Uuid::new_v4().to_string(),
            user_id.to_string(),
            kind,
            body,
            fmt_datetime(Utc::now().naive_utc()),
        ],
    )?;
    Ok(())
}

pub fn notifications_for_user(
    conn: &Connection,
    user_id: &Uuid,
    limit: u32,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, user_id, kind, body, read, created_at
         FROM notifications WHERE user_id = ?1
         ORDER BY created_at DESC, id LIMIT {limit}"
    ))?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        Ok(Notification {
            id: parsed_col(row, 0)?,
            user_id: parsed_col(row, 1)?,
            kind: row.get(2)?,
            body: row.get(3)?,
            read: row.get(4)?,
            created_at: datetime_col(row, 5)?,
        })
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// Scoped to the owner so one user cannot clear another's notification.
pub fn mark_notification_read(
    conn: &Connection,
    id: &Uuid,
    user_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
    )?;
    Ok(changed > 0)
}

pub fn mark_all_notifications_read(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
        params![user_id.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{seed_user, test_db};
    use super::*;
    use crate::models::enums::Role;

    #[test]
    fn notifications_are_listed_newest_first_and_scoped_to_owner() {
        let conn = test_db();
        let user = seed_user(&conn, Role::Patient);
        let other = seed_user(&conn, Role::Patient);

        notify(&conn, &user.id, "appointment", "Your appointment was confirmed").unwrap();
        notify(&conn, &user.id, "prescription", "Your prescription was filled").unwrap();
        notify(&conn, &other.id, "appointment", "Unrelated").unwrap();

        let mine = notifications_for_user(&conn, &user.id, 10).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|n| !n.read));

        // the other user's id cannot clear mine
        assert!(!mark_notification_read(&conn, &mine[0].id, &other.id).unwrap());
        assert!(mark_notification_read(&conn, &mine[0].id, &user.id).unwrap());

        mark_all_notifications_read(&conn, &user.id).unwrap();
        let mine = notifications_for_user(&conn, &user.id, 10).unwrap();
        assert!(mine.iter().all(|n| n.read));
        assert_eq!(notifications_for_user(&conn, &other.id, 10).unwrap().len(), 1);
    }
}
