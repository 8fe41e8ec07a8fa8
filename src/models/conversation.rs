use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direct-message thread between two users, created on first contact.
/// Participants are stored in sorted order so each pair has one thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub started_at: NaiveDateTime,
}

impl Conversation {
    pub fn other_participant(&self, me: &Uuid) -> Uuid {
        if &self.participant_a == me {
            self.participant_b
        } else {
            self.participant_a
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_user_id: Uuid,
    pub content: String,
    pub sent_at: NaiveDateTime,
    pub read: bool,
}
