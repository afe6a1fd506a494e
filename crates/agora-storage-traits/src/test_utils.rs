//! Fixture builders shared by the storage and core test suites

use std::collections::{BTreeMap, BTreeSet};

use crate::chats::types::{Chat, ParticipantRef};
use crate::messages::types::{DeliveryState, MediaRef, Message};
use crate::objects::types::{CachedObject, Page, Post, Profile, Reel, Story};

/// A sent text message
pub fn sample_message(id: &str, chat_id: &str, sender_id: &str, created_at: i64) -> Message {
    Message {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender_id: sender_id.to_string(),
        content: format!("message {id}"),
        media: Vec::new(),
        created_at,
        edited_at: None,
        deleted_for: BTreeSet::new(),
        starred_by: BTreeSet::new(),
        expires_at: None,
        forwarded_from: None,
        delivery: DeliveryState::Sent,
        receipts: BTreeMap::new(),
        failure_reason: None,
    }
}

/// A chat with the given members; direct when there are exactly two
pub fn sample_chat(id: &str, members: &[&str]) -> Chat {
    Chat {
        id: id.to_string(),
        is_group: members.len() != 2,
        name: None,
        participants: members
            .iter()
            .map(|m| ParticipantRef {
                user_id: m.to_string(),
                display_name: Some(m.to_string()),
                avatar: None,
            })
            .collect(),
        pinned_by: BTreeSet::new(),
        auto_delete_secs: None,
        last_message_at: None,
    }
}

/// An image attachment
pub fn sample_media(path: &str) -> MediaRef {
    MediaRef {
        bucket: "media".to_string(),
        path: path.to_string(),
        mime_type: "image/jpeg".to_string(),
    }
}

/// A post wrapped for the object store
pub fn sample_post(id: &str, content: &str) -> CachedObject {
    CachedObject::Post(Post {
        id: id.to_string(),
        author_id: "author".to_string(),
        content: content.to_string(),
        media: Vec::new(),
        hashtags: Vec::new(),
        like_count: 0,
        comment_count: 0,
        created_at: 0,
        updated_at: None,
    })
}

/// A profile wrapped for the object store
pub fn sample_profile(id: &str) -> CachedObject {
    CachedObject::Profile(Profile {
        id: id.to_string(),
        username: format!("user_{id}"),
        display_name: None,
        avatar: None,
        bio: None,
        is_premium: false,
    })
}

/// A reel wrapped for the object store
pub fn sample_reel(id: &str) -> CachedObject {
    CachedObject::Reel(Reel {
        id: id.to_string(),
        author_id: "author".to_string(),
        video: MediaRef {
            bucket: "reels".to_string(),
            path: format!("{id}.mp4"),
            mime_type: "video/mp4".to_string(),
        },
        caption: None,
        view_count: 0,
        created_at: 0,
    })
}

/// A page wrapped for the object store
pub fn sample_page(id: &str) -> CachedObject {
    CachedObject::Page(Page {
        id: id.to_string(),
        owner_id: "owner".to_string(),
        name: format!("page {id}"),
        description: None,
        follower_count: 0,
    })
}

/// A story wrapped for the object store
pub fn sample_story(id: &str) -> CachedObject {
    CachedObject::Story(Story {
        id: id.to_string(),
        author_id: "author".to_string(),
        media: sample_media(&format!("{id}.jpg")),
        created_at: 0,
        expires_at: 86_400_000,
    })
}
