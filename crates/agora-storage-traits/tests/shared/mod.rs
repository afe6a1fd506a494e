//! Backend-agnostic storage test functions, instantiated per backend by the macros in
//! `memory_storage.rs` and `sqlite_storage.rs`.

#![allow(dead_code)]

use agora_storage_traits::messages::types::MediaRef;
use agora_storage_traits::objects::types::{CachedObject, Post, Profile, Story};

pub mod kv_tests;
pub mod object_tests;
pub mod rate_limit_tests;

pub fn create_test_post(id: &str, content: &str) -> CachedObject {
    CachedObject::Post(Post {
        id: id.to_string(),
        author_id: "author".to_string(),
        content: content.to_string(),
        media: Vec::new(),
        hashtags: vec!["rust".to_string()],
        like_count: 3,
        comment_count: 1,
        created_at: 1_700_000_000_000,
        updated_at: None,
    })
}

pub fn create_test_profile(id: &str) -> CachedObject {
    CachedObject::Profile(Profile {
        id: id.to_string(),
        username: format!("user_{id}"),
        display_name: Some("Test User".to_string()),
        avatar: None,
        bio: None,
        is_premium: false,
    })
}

pub fn create_test_story(id: &str) -> CachedObject {
    CachedObject::Story(Story {
        id: id.to_string(),
        author_id: "author".to_string(),
        media: MediaRef {
            bucket: "stories".to_string(),
            path: format!("{id}.jpg"),
            mime_type: "image/jpeg".to_string(),
        },
        created_at: 0,
        expires_at: 86_400_000,
    })
}
