//! Types for the objects module

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::messages::types::MediaRef;

/// A named collection in the object store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Feed posts
    Posts,
    /// User profiles
    Profiles,
    /// Short videos
    Reels,
    /// Pages
    Pages,
    /// Stories
    Stories,
}

impl Collection {
    /// Every collection, in creation order
    pub const ALL: [Collection; 5] = [
        Self::Posts,
        Self::Profiles,
        Self::Reels,
        Self::Pages,
        Self::Stories,
    ];

    /// Get as `&str`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Profiles => "profiles",
            Self::Reels => "reels",
            Self::Pages => "pages",
            Self::Stories => "stories",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Collection {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts" => Ok(Self::Posts),
            "profiles" => Ok(Self::Profiles),
            "reels" => Ok(Self::Reels),
            "pages" => Ok(Self::Pages),
            "stories" => Ok(Self::Stories),
            _ => Err(StorageError::InvalidParameters(format!(
                "Invalid collection: {}",
                s
            ))),
        }
    }
}

/// A feed post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post id
    pub id: String,
    /// Author
    pub author_id: String,
    /// Text content
    pub content: String,
    /// Attachments
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// Hashtags extracted by the backend
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Like counter
    #[serde(default)]
    pub like_count: u64,
    /// Comment counter
    #[serde(default)]
    pub comment_count: u64,
    /// Creation time
    pub created_at: i64,
    /// Last update time
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// A user profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// User id
    pub id: String,
    /// Unique handle
    pub username: String,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Avatar object path
    #[serde(default)]
    pub avatar: Option<String>,
    /// Free-form bio
    #[serde(default)]
    pub bio: Option<String>,
    /// Premium subscriber
    #[serde(default)]
    pub is_premium: bool,
}

/// A short video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reel {
    /// Reel id
    pub id: String,
    /// Author
    pub author_id: String,
    /// The video object
    pub video: MediaRef,
    /// Caption
    #[serde(default)]
    pub caption: Option<String>,
    /// View counter
    #[serde(default)]
    pub view_count: u64,
    /// Creation time
    pub created_at: i64,
}

/// A page (brand, community)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page id
    pub id: String,
    /// Owner
    pub owner_id: String,
    /// Page name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Follower counter
    #[serde(default)]
    pub follower_count: u64,
}

/// A story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Story id
    pub id: String,
    /// Author
    pub author_id: String,
    /// The story media
    pub media: MediaRef,
    /// Creation time
    pub created_at: i64,
    /// When the story stops being shown
    pub expires_at: i64,
}

/// A value held by the object store, tagged by kind so every collection has a known schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CachedObject {
    /// A [`Post`]
    Post(Post),
    /// A [`Profile`]
    Profile(Profile),
    /// A [`Reel`]
    Reel(Reel),
    /// A [`Page`]
    Page(Page),
    /// A [`Story`]
    Story(Story),
}

impl CachedObject {
    /// The collection this value belongs to
    pub fn collection(&self) -> Collection {
        match self {
            Self::Post(_) => Collection::Posts,
            Self::Profile(_) => Collection::Profiles,
            Self::Reel(_) => Collection::Reels,
            Self::Page(_) => Collection::Pages,
            Self::Story(_) => Collection::Stories,
        }
    }

    /// The id of the wrapped entity
    pub fn id(&self) -> &str {
        match self {
            Self::Post(p) => &p.id,
            Self::Profile(p) => &p.id,
            Self::Reel(r) => &r.id,
            Self::Page(p) => &p.id,
            Self::Story(s) => &s.id,
        }
    }
}

/// A [`CachedObject`] stamped with the time it was written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// The cached value
    pub value: CachedObject,
    /// Write time
    pub timestamp: i64,
}

impl StoredObject {
    /// Stamp `value` with `now`
    pub fn new(value: CachedObject, now: i64) -> Self {
        Self {
            value,
            timestamp: now,
        }
    }

    /// Fail with [`StorageError::CollectionMismatch`] unless the value belongs to `expected`
    pub fn check_collection(&self, expected: Collection) -> Result<(), StorageError> {
        let actual = self.value.collection();
        if actual == expected {
            Ok(())
        } else {
            Err(StorageError::CollectionMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }

    /// Whether the value is younger than `max_age_ms` at `now`
    pub fn is_fresh(&self, now: i64, max_age_ms: i64) -> bool {
        now.saturating_sub(self.timestamp) < max_age_ms
    }
}
