use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::policy::{self, Remaining};

/// Reference to an already-stored media item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub id: Uuid,
    pub owner: Uuid,
    pub media: Vec<MediaRef>,
    pub liked_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
}

impl Story {
    pub fn is_liked_by(&self, user: Uuid) -> bool {
        self.liked_by.contains(&user)
    }
}

/// Insert payload; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub owner: Uuid,
    pub media: Vec<MediaRef>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// Internal DB representation (media as jsonb)
#[derive(Debug, FromRow)]
pub struct StoryRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub media: sqlx::types::Json<Vec<MediaRef>>,
    pub liked_by: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
}

impl From<StoryRow> for Story {
    fn from(r: StoryRow) -> Self {
        Story {
            id: r.id,
            owner: r.owner_id,
            media: r.media.0,
            liked_by: r.liked_by,
            created_at: r.created_at,
            expires_at: r.expires_at,
            is_expired: r.is_expired,
        }
    }
}

/// Store-level filter. `active_at` applies the effective-expiry predicate.
#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub owner: Option<Uuid>,
    pub liked_by: Option<Uuid>,
    pub active_at: Option<DateTime<Utc>>,
}

impl StoryFilter {
    pub fn matches(&self, story: &Story) -> bool {
        if self.owner.is_some_and(|o| o != story.owner) {
            return false;
        }
        if self.liked_by.is_some_and(|u| !story.is_liked_by(u)) {
            return false;
        }
        match self.active_at {
            Some(now) => !story.is_expired && story.expires_at > now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SweepCandidate {
    pub id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
pub struct StoryCreate {
    pub media: Vec<MediaRef>,
}

#[derive(Deserialize, Debug)]
pub struct StoryUpdate {
    pub media: Option<Vec<MediaRef>>,
}

#[derive(Deserialize, Debug)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LikeOutcome {
    pub is_liked: bool,
    pub likes_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteOutcome {
    pub deleted_ids: Vec<Uuid>,
    pub failed_ids: Vec<Uuid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoryDto {
    pub id: Uuid,
    pub owner: Uuid,
    pub media: Vec<MediaRef>,
    pub likes_count: usize,
    pub is_liked: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
    pub remaining: Remaining,
}

impl StoryDto {
    /// Renders `story` as seen by `viewer` at `now`.
    pub fn from_story(story: Story, viewer: Option<Uuid>, now: DateTime<Utc>) -> Self {
        let is_expired = policy::is_effectively_expired(&story, now);
        let remaining = policy::remaining(&story, now);
        let is_liked = viewer.is_some_and(|v| story.is_liked_by(v));
        StoryDto {
            id: story.id,
            owner: story.owner,
            likes_count: story.liked_by.len(),
            is_liked,
            media: story.media,
            created_at: story.created_at,
            expires_at: story.expires_at,
            is_expired,
            remaining,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BulkDeleteResponse {
    pub deleted_ids: Vec<Uuid>,
    pub failed_ids: Vec<Uuid>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CleanupResponse {
    pub found: usize,
    pub deleted: usize,
    pub failed_ids: Vec<Uuid>,
}
