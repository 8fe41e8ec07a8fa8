//! Direct messaging. One conversation per user pair; the pair is stored
//! in sorted order so lookups are order-independent.

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::conversation::{Conversation, ConversationMessage};

use super::{datetime_col, fmt_datetime, parsed_col};

fn sorted_pair(a: &Uuid, b: &Uuid) -> (String, String) {
    let (x, y) = (a.to_string(), b.to_string());
    if x <= y {
        (x, y)
    } else {
        (y, x)
    }
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: parsed_col(row, 0)?,
        participant_a: parsed_col(row, 1)?,
        participant_b: parsed_col(row, 2)?,
        started_at: datetime_col(row, 3)?,
    })
}

pub fn find_or_create_conversation(
    conn: &Connection,
    user_a: &Uuid,
    user_b: &Uuid,
) -> Result<Conversation, DatabaseError> {
    let (a, b) = sorted_pair(user_a, user_b);
    let existing = conn
        .query_row(
            "SELECT id, participant_a, participant_b, started_at
             FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
            params![a, b],
            conversation_from_row,
        )
        .optional()?;
    if let Some(conversation) = existing {
        return Ok(conversation);
    }

    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO conversations (id, participant_a, participant_b) VALUES (?1, ?2, ?3)",
        params![id.to_string(), a, b],
    )?;
    get_conversation(conn, &id)
}

pub fn get_conversation(conn: &Connection, id: &Uuid) -> Result<Conversation, DatabaseError> {
    conn.query_row(
        "SELECT id, participant_a, participant_b, started_at FROM conversations WHERE id = ?1",
        params![id.to_string()],
        conversation_from_row,
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "conversation".into(),
        id: id.to_string(),
    })
}

pub fn conversations_for_user(
    conn: &Connection,
    user_id: &Uuid,
) -> Result<Vec<Conversation>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, participant_a, participant_b, started_at
         FROM conversations WHERE participant_a = ?1 OR participant_b = ?1
         ORDER BY started_at DESC",
    )?;
    let rows = stmt.query_map(params![user_id.to_string()], conversation_from_row)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationMessage> {
    Ok(ConversationMessage {
        id: parsed_col(row, 0)?,
        conversation_id: parsed_col(row, 1)?,
        sender_user_id: parsed_col(row, 2)?,
        content: row.get(3)?,
        sent_at: datetime_col(row, 4)?,
        read: row.get(5)?,
    })
}

pub fn messages_for_conversation(
    conn: &Connection,
    conversation_id: &Uuid,
) -> Result<Vec<ConversationMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_user_id, content, sent_at, read
         FROM conversation_messages WHERE conversation_id = ?1 ORDER BY sent_at, id",
    )?;
    let rows = stmt.query_map(params![conversation_id.to_string()], message_from_row)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn insert_conversation_message(
    conn: &Connection,
    message: &ConversationMessage,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conversation_messages (id, conversation_id, sender_user_id, content, sent_at, read)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            message.id.to_string(),
            message.conversation_id.to_string(),
            message.sender_user_id.to_string(),
            message.content,
            fmt_datetime(message.sent_at),
            message.read,
        ],
    )?;
    Ok(())
}

/// Mark the other party's messages as read.
pub fn mark_conversation_read(
    conn: &Connection,
    conversation_id: &Uuid,
    reader_user_id: &Uuid,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE conversation_messages SET read = 1
         WHERE conversation_id = ?1 AND sender_user_id != ?2 AND read = 0",
        params![conversation_id.to_string(), reader_user_id.to_string()],
    )?;
    Ok(())
}

/// Unread messages addressed to the user across all their conversations.
pub fn unread_count_for_user(conn: &Connection, user_id: &Uuid) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*)
         FROM conversation_messages m
         JOIN conversations c ON c.id = m.conversation_id
         WHERE (c.participant_a = ?1 OR c.participant_b = ?1)
           AND m.sender_user_id != ?1 AND m.read = 0",
        params![user_id.to_string()],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::super::testutil::{seed_user, test_db};
    use super::*;
    use crate::models::enums::Role;

    fn send(conn: &Connection, conversation_id: Uuid, sender: Uuid, content: &str) {
        insert_conversation_message(
            conn,
            &ConversationMessage {
                id: Uuid::new_v4(),
                conversation_id,
                sender_user_id: sender,
                content: content.into(),
                sent_at: Utc::now().naive_utc(),
                read: false,
            },
        )
        .unwrap();
    }

    #[test]
    fn pair_resolves_to_one_thread_regardless_of_order() {
        let conn = test_db();
        let a = seed_user(&conn, Role::Patient);
        let b = seed_user(&conn, Role::Doctor);

        let first = find_or_create_conversation(&conn, &a.id, &b.id).unwrap();
        let second = find_or_create_conversation(&conn, &b.id, &a.id).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.other_participant(&a.id), b.id);
    }

    #[test]
    fn read_marking_only_touches_the_other_partys_messages() {
        let conn = test_db();
        let a = seed_user(&conn, Role::Patient);
        let b = seed_user(&conn, Role::Doctor);
        let thread = find_or_create_conversation(&conn, &a.id, &b.id).unwrap();

        send(&conn, thread.id, a.id, "hello");
        send(&conn, thread.id, b.id, "hi, how can I help?");
        assert_eq!(unread_count_for_user(&conn, &a.id).unwrap(), 1);
        assert_eq!(unread_count_for_user(&conn, &b.id).unwrap(), 1);

        mark_conversation_read(&conn, &thread.id, &a.id).unwrap();
        assert_eq!(unread_count_for_user(&conn, &a.id).unwrap(), 0);
        // a's own outgoing message stays unread for b
        assert_eq!(unread_count_for_user(&conn, &b.id).unwrap(), 1);
    }

    #[test]
    fn listing_covers_both_sides() {
        let conn = test_db();
        let a = seed_user(&conn, Role::Patient);
        let b = seed_user(&conn, Role::Doctor);
        let c = seed_user(&conn, Role::Pharmacist);
        find_or_create_conversation(&conn, &a.id, &b.id).unwrap();
        find_or_create_conversation(&conn, &c.id, &a.id).unwrap();

        assert_eq!(conversations_for_user(&conn, &a.id).unwrap().len(), 2);
        assert_eq!(conversations_for_user(&conn, &b.id).unwrap().len(), 1);
    }
}
