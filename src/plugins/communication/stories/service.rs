use chrono::Duration;
use std::collections::HashSet;
use uuid::Uuid;

use crate::clock::DynClock;
use crate::rate_limit::{rate_limit_key, DynRateLimiter, RateLimitResult};

use super::error::StoryError;
use super::models::{BulkDeleteOutcome, LikeOutcome, MediaRef, NewStory, Story, StoryFilter};
use super::policy;
use super::store::DynStoryStore;

pub const CREATE_OPERATION: &str = "story.create";

#[derive(Debug, Clone)]
pub struct StoryLimits {
    pub max_media: usize,
    pub max_bulk_delete: usize,
    pub creates_per_window: u32,
    pub create_window: Duration,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for StoryLimits {
    fn default() -> Self {
        Self {
            max_media: 10,
            max_bulk_delete: 20,
            creates_per_window: 5,
            create_window: Duration::hours(1),
            default_page_size: 10,
            max_page_size: 50,
        }
    }
}

/// Offset window into a listing, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u64,
}

impl PageRequest {
    /// 1-based page number of the first item in this window.
    pub fn page(&self) -> u64 {
        (self.offset / u64::from(self.limit.max(1))).saturating_add(1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoryQuery {
    pub owner: Option<Uuid>,
    pub liked_by: Option<Uuid>,
    pub include_expired: bool,
}

#[derive(Debug, Clone)]
pub struct StoryPage {
    pub items: Vec<Story>,
    pub total: i64,
    pub page: PageRequest,
}

/// Create, read, like and delete stories while honouring the 24h window.
#[derive(Clone)]
pub struct StoryService {
    store: DynStoryStore,
    limiter: DynRateLimiter,
    clock: DynClock,
    limits: StoryLimits,
}

impl StoryService {
    pub fn new(store: DynStoryStore, limiter: DynRateLimiter, clock: DynClock, limits: StoryLimits) -> Self {
        Self { store, limiter, clock, limits }
    }

    pub fn limits(&self) -> &StoryLimits {
        &self.limits
    }

    pub fn clock(&self) -> &DynClock {
        &self.clock
    }

    /// Page/page-size form of pagination, clamped to the configured bounds.
    pub fn page_request(&self, page: Option<u32>, page_size: Option<u32>) -> PageRequest {
        let page = page.unwrap_or(1).max(1);
        let limit = self.clamp_page_size(page_size);
        PageRequest { limit, offset: u64::from(page - 1) * u64::from(limit) }
    }

    /// Limit/offset form of pagination, clamped the same way.
    pub fn window_request(&self, limit: Option<u32>, offset: Option<u64>) -> PageRequest {
        PageRequest { limit: self.clamp_page_size(limit), offset: offset.unwrap_or(0) }
    }

    fn clamp_page_size(&self, size: Option<u32>) -> u32 {
        size.unwrap_or(self.limits.default_page_size).clamp(1, self.limits.max_page_size)
    }

    fn validate_media(&self, media: &[MediaRef]) -> Result<(), StoryError> {
        if media.is_empty() {
            return Err(StoryError::Validation("Story must contain at least one file".into()));
        }
        if media.len() > self.limits.max_media {
            return Err(StoryError::Validation(format!(
                "Story cannot contain more than {} files",
                self.limits.max_media
            )));
        }
        if media.iter().any(|m| m.url.trim().is_empty()) {
            return Err(StoryError::Validation("Story media must have a url".into()));
        }
        Ok(())
    }

    pub async fn create(&self, owner: Uuid, media: Vec<MediaRef>) -> Result<Story, StoryError> {
        self.validate_media(&media)?;

        // Check and record are one atomic step in the limiter, so an attempt
        // that passes validation spends its slot even if the insert fails.
        let now = self.clock.now();
        let key = rate_limit_key(CREATE_OPERATION, &owner.to_string(), self.limits.create_window);
        let verdict = self
            .limiter
            .check(&key, self.limits.creates_per_window, self.limits.create_window, now)
            .await
            .map_err(|e| StoryError::Store(e.into()))?;
        if let RateLimitResult::Exceeded(count) = verdict {
            tracing::warn!(%owner, count, "story creation rate limited");
            return Err(StoryError::RateLimited {
                limit: self.limits.creates_per_window,
                window: self.limits.create_window,
            });
        }

        let story = self
            .store
            .insert(NewStory { owner, media, created_at: now, expires_at: policy::compute_deadline(now) })
            .await?;
        tracing::info!(story_id = %story.id, %owner, expires_at = %story.expires_at, "story created");
        Ok(story)
    }

    /// Unless `include_expired`, the effective-expiry filter is evaluated
    /// against the clock on every call.
    pub async fn list(&self, query: StoryQuery, page: PageRequest) -> Result<StoryPage, StoryError> {
        let filter = StoryFilter {
            owner: query.owner,
            liked_by: query.liked_by,
            active_at: if query.include_expired { None } else { Some(self.clock.now()) },
        };
        let offset = i64::try_from(page.offset).map_err(|_| StoryError::Validation("offset out of range".into()))?;
        let (items, total) = self.store.query(&filter, i64::from(page.limit), offset).await?;
        Ok(StoryPage { items, total, page })
    }

    pub async fn list_active(&self, page: PageRequest) -> Result<StoryPage, StoryError> {
        self.list(StoryQuery { include_expired: false, ..StoryQuery::default() }, page).await
    }

    /// Point lookups resolve expired stories too, so direct links keep working
    /// until the record is deleted.
    pub async fn get(&self, id: Uuid) -> Result<Story, StoryError> {
        self.store.get(id).await?.ok_or(StoryError::NotFound)
    }

    pub async fn toggle_like(&self, id: Uuid, user: Uuid) -> Result<LikeOutcome, StoryError> {
        let story = self.get(id).await?;
        let was_liked = story.is_liked_by(user);
        let updated = if was_liked {
            self.store.remove_like(id, user).await?
        } else {
            self.store.add_like(id, user).await?
        };
        let updated = updated.ok_or(StoryError::NotFound)?;
        Ok(LikeOutcome { is_liked: !was_liked, likes_count: updated.liked_by.len() })
    }

    pub async fn update(&self, id: Uuid, requester: Uuid, media: Option<Vec<MediaRef>>) -> Result<Story, StoryError> {
        let story = self.owned(id, requester).await?;
        let Some(media) = media else {
            return Ok(story);
        };
        self.validate_media(&media)?;
        let updated = self.store.replace_media(id, media).await?.ok_or(StoryError::NotFound)?;
        tracing::info!(story_id = %id, "story media replaced");
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid, requester: Uuid) -> Result<(), StoryError> {
        self.owned(id, requester).await?;
        if !self.store.delete(id).await? {
            tracing::debug!(story_id = %id, "story already gone at delete time");
        }
        tracing::info!(story_id = %id, %requester, "story deleted");
        Ok(())
    }

    /// Ownership of the whole batch is checked before anything is deleted;
    /// after that, per-record failures are collected instead of aborting.
    pub async fn bulk_delete(&self, ids: Vec<Uuid>, requester: Uuid) -> Result<BulkDeleteOutcome, StoryError> {
        if ids.is_empty() {
            return Err(StoryError::Validation("ids must contain at least one story id".into()));
        }
        if ids.len() > self.limits.max_bulk_delete {
            return Err(StoryError::Validation(format!(
                "cannot delete more than {} stories at once",
                self.limits.max_bulk_delete
            )));
        }

        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = ids.into_iter().filter(|id| seen.insert(*id)).collect();

        let stories = self.store.get_many(&ids).await?;
        if stories.iter().any(|s| s.owner != requester) {
            tracing::warn!(%requester, "bulk delete refused: batch contains foreign stories");
            return Err(StoryError::Forbidden);
        }

        let found: HashSet<Uuid> = stories.iter().map(|s| s.id).collect();
        let mut outcome = BulkDeleteOutcome::default();
        for id in ids {
            if !found.contains(&id) {
                outcome.failed_ids.push(id);
                continue;
            }
            match self.store.delete(id).await {
                Ok(_) => outcome.deleted_ids.push(id),
                Err(e) => {
                    tracing::error!(story_id = %id, error = %e, "bulk delete failed for story");
                    outcome.failed_ids.push(id);
                }
            }
        }
        tracing::info!(
            %requester,
            deleted = outcome.deleted_ids.len(),
            failed = outcome.failed_ids.len(),
            "bulk delete finished"
        );
        Ok(outcome)
    }

    async fn owned(&self, id: Uuid, requester: Uuid) -> Result<Story, StoryError> {
        let story = self.get(id).await?;
        if story.owner != requester {
            tracing::warn!(story_id = %id, %requester, "refused change to foreign story");
            return Err(StoryError::Forbidden);
        }
        Ok(story)
    }
}
