//! Types for the chats module

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A participant as shown in a chat header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRef {
    /// User id
    pub user_id: String,
    /// Display name at fetch time
    #[serde(default)]
    pub display_name: Option<String>,
    /// Avatar object path
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A direct or group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat id
    pub id: String,
    /// Whether this is a group chat
    pub is_group: bool,
    /// Group name; direct chats are named after the peer
    #[serde(default)]
    pub name: Option<String>,
    /// Members, including the current user
    pub participants: Vec<ParticipantRef>,
    /// Users that pinned this chat
    #[serde(default)]
    pub pinned_by: BTreeSet<String>,
    /// Disappearing-message duration applied to new messages at send time
    #[serde(default)]
    pub auto_delete_secs: Option<u64>,
    /// Time of the newest message, used for list ordering
    #[serde(default)]
    pub last_message_at: Option<i64>,
}

impl Chat {
    /// Check the structural invariants of a chat.
    ///
    /// Direct chats have exactly two participants and no participant appears twice.
    pub fn validate(&self) -> Result<(), StorageError> {
        if !self.is_group && self.participants.len() != 2 {
            return Err(StorageError::InvalidParameters(format!(
                "direct chat {} must have exactly 2 participants, got {}",
                self.id,
                self.participants.len()
            )));
        }
        let mut seen = BTreeSet::new();
        for participant in &self.participants {
            if !seen.insert(participant.user_id.as_str()) {
                return Err(StorageError::InvalidParameters(format!(
                    "duplicate participant {} in chat {}",
                    participant.user_id, self.id
                )));
            }
        }
        Ok(())
    }

    /// Whether `user_id` is a member
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    /// Members other than `user_id`
    pub fn recipients_of(&self, user_id: &str) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| p.user_id != user_id)
            .map(|p| p.user_id.clone())
            .collect()
    }

    /// The other member of a direct chat
    pub fn peer_of(&self, user_id: &str) -> Option<&ParticipantRef> {
        if self.is_group {
            return None;
        }
        self.participants.iter().find(|p| p.user_id != user_id)
    }

    /// Whether `user_id` pinned the chat
    pub fn is_pinned_by(&self, user_id: &str) -> bool {
        self.pinned_by.contains(user_id)
    }

    /// The auto-delete duration, if one is set
    pub fn auto_delete(&self) -> Option<Duration> {
        self.auto_delete_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(user_id: &str) -> ParticipantRef {
        ParticipantRef {
            user_id: user_id.to_string(),
            display_name: None,
            avatar: None,
        }
    }

    fn chat(is_group: bool, members: &[&str]) -> Chat {
        Chat {
            id: "chat-1".to_string(),
            is_group,
            name: None,
            participants: members.iter().map(|m| participant(m)).collect(),
            pinned_by: BTreeSet::new(),
            auto_delete_secs: None,
            last_message_at: None,
        }
    }

    #[test]
    fn direct_chat_requires_two_participants() {
        assert!(chat(false, &["alice", "bob"]).validate().is_ok());

        let err = chat(false, &["alice", "bob", "carol"]).validate().unwrap_err();
        assert!(matches!(err, StorageError::InvalidParameters(_)));
        assert!(chat(false, &["alice"]).validate().is_err());
    }

    #[test]
    fn group_chat_accepts_any_size() {
        assert!(chat(true, &["alice"]).validate().is_ok());
        assert!(chat(true, &["alice", "bob", "carol"]).validate().is_ok());
    }

    #[test]
    fn duplicate_participants_rejected() {
        assert!(chat(true, &["alice", "alice"]).validate().is_err());
    }

    #[test]
    fn peer_and_recipients() {
        let direct = chat(false, &["alice", "bob"]);
        assert_eq!(direct.peer_of("alice").unwrap().user_id, "bob");
        assert_eq!(direct.recipients_of("alice"), vec!["bob".to_string()]);

        let group = chat(true, &["alice", "bob", "carol"]);
        assert!(group.peer_of("alice").is_none());
        assert_eq!(group.recipients_of("bob"), vec!["alice", "carol"]);
    }

    #[test]
    fn zero_auto_delete_means_off() {
        let mut c = chat(false, &["alice", "bob"]);
        c.auto_delete_secs = Some(0);
        assert_eq!(c.auto_delete(), None);
        c.auto_delete_secs = Some(30);
        assert_eq!(c.auto_delete(), Some(Duration::from_secs(30)));
    }
}
