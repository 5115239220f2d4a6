use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::error::StoreError;
use super::models::{MediaRef, NewStory, Story, StoryFilter, SweepCandidate};

/// Persistent collection of stories.
///
/// Every method is atomic per record. Operations on a record that no longer
/// exists report that through their return value (`None`/`false`) rather than
/// an error, so overlapping sweeps and user deletes never fail on each other.
#[async_trait]
pub trait StoryStore: Send + Sync + 'static {
    fn backend(&self) -> &'static str;

    async fn insert(&self, story: NewStory) -> Result<Story, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Story>, StoreError>;

    /// Existing stories among `ids`, in no particular order.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Story>, StoreError>;

    /// Newest first, with the total number of matches.
    async fn query(&self, filter: &StoryFilter, limit: i64, offset: i64) -> Result<(Vec<Story>, i64), StoreError>;

    async fn replace_media(&self, id: Uuid, media: Vec<MediaRef>) -> Result<Option<Story>, StoreError>;

    async fn add_like(&self, id: Uuid, user: Uuid) -> Result<Option<Story>, StoreError>;

    async fn remove_like(&self, id: Uuid, user: Uuid) -> Result<Option<Story>, StoreError>;

    /// Sets the expired flag. `false` when already set or the story is gone.
    async fn mark_expired(&self, id: Uuid) -> Result<bool, StoreError>;

    /// `false` when there was nothing to delete.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// `expires_at <= now` and not yet flagged.
    async fn due_for_marking(&self, now: DateTime<Utc>) -> Result<Vec<SweepCandidate>, StoreError>;

    /// `expires_at <= now` or flagged.
    async fn due_for_deletion(&self, now: DateTime<Utc>) -> Result<Vec<SweepCandidate>, StoreError>;
}

pub type DynStoryStore = Arc<dyn StoryStore>;

mod inmem {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct InMemoryStoryStore {
        inner: RwLock<HashMap<Uuid, Story>>,
    }

    impl InMemoryStoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn into_arc(self) -> DynStoryStore {
            Arc::new(self)
        }

        pub fn len(&self) -> usize {
            self.inner.read().len()
        }

        pub fn is_empty(&self) -> bool {
            self.inner.read().is_empty()
        }

        fn update<F>(&self, id: Uuid, f: F) -> Option<Story>
        where
            F: FnOnce(&mut Story),
        {
            let mut guard = self.inner.write();
            let story = guard.get_mut(&id)?;
            f(story);
            Some(story.clone())
        }

        fn candidates<P>(&self, pred: P) -> Vec<SweepCandidate>
        where
            P: Fn(&Story) -> bool,
        {
            let guard = self.inner.read();
            let mut out: Vec<SweepCandidate> = guard
                .values()
                .filter(|s| pred(s))
                .map(|s| SweepCandidate { id: s.id, expires_at: s.expires_at })
                .collect();
            out.sort_by_key(|c| c.expires_at);
            out
        }
    }

    #[async_trait]
    impl StoryStore for InMemoryStoryStore {
        fn backend(&self) -> &'static str {
            "memory"
        }

        async fn insert(&self, new: NewStory) -> Result<Story, StoreError> {
            let story = Story {
                id: Uuid::new_v4(),
                owner: new.owner,
                media: new.media,
                liked_by: Vec::new(),
                created_at: new.created_at,
                expires_at: new.expires_at,
                is_expired: false,
            };
            self.inner.write().insert(story.id, story.clone());
            Ok(story)
        }

        async fn get(&self, id: Uuid) -> Result<Option<Story>, StoreError> {
            Ok(self.inner.read().get(&id).cloned())
        }

        async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Story>, StoreError> {
            let guard = self.inner.read();
            Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
        }

        async fn query(&self, filter: &StoryFilter, limit: i64, offset: i64) -> Result<(Vec<Story>, i64), StoreError> {
            let guard = self.inner.read();
            let mut matched: Vec<&Story> = guard.values().filter(|s| filter.matches(s)).collect();
            matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
            let total = matched.len() as i64;
            let items = matched
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .cloned()
                .collect();
            Ok((items, total))
        }

        async fn replace_media(&self, id: Uuid, media: Vec<MediaRef>) -> Result<Option<Story>, StoreError> {
            Ok(self.update(id, |s| s.media = media))
        }

        async fn add_like(&self, id: Uuid, user: Uuid) -> Result<Option<Story>, StoreError> {
            Ok(self.update(id, |s| {
                if !s.liked_by.contains(&user) {
                    s.liked_by.push(user);
                }
            }))
        }

        async fn remove_like(&self, id: Uuid, user: Uuid) -> Result<Option<Story>, StoreError> {
            Ok(self.update(id, |s| s.liked_by.retain(|u| *u != user)))
        }

        async fn mark_expired(&self, id: Uuid) -> Result<bool, StoreError> {
            let mut guard = self.inner.write();
            match guard.get_mut(&id) {
                Some(story) if !story.is_expired => {
                    story.is_expired = true;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
            Ok(self.inner.write().remove(&id).is_some())
        }

        async fn due_for_marking(&self, now: DateTime<Utc>) -> Result<Vec<SweepCandidate>, StoreError> {
            Ok(self.candidates(|s| s.expires_at <= now && !s.is_expired))
        }

        async fn due_for_deletion(&self, now: DateTime<Utc>) -> Result<Vec<SweepCandidate>, StoreError> {
            Ok(self.candidates(|s| s.expires_at <= now || s.is_expired))
        }
    }
}

pub use inmem::InMemoryStoryStore;
