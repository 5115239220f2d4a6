mod common;

use chrono::{Duration, DurationRound, Utc};
use std::sync::Arc;
use uuid::Uuid;

use common::{create_test_db_and_pool, test_database_url};
use cricket_story_kernel::clock::ManualClock;
use cricket_story_kernel::plugins::communication::stories::models::{MediaRef, NewStory, StoryFilter};
use cricket_story_kernel::plugins::communication::stories::policy::compute_deadline;
use cricket_story_kernel::plugins::communication::stories::{ExpirationSweeper, PgStoryStore, StoryStore};

fn media() -> Vec<MediaRef> {
    vec![MediaRef { url: "/uploads/pg.jpg".into(), name: Some("pg.jpg".into()), mime: None, size: Some(10) }]
}

#[tokio::test]
async fn pg_store_round_trip_and_sweeps() -> anyhow::Result<()> {
    let Some(test_db) = test_database_url() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return Ok(());
    };
    let (pool, _guard) = create_test_db_and_pool(&test_db).await?;
    let store = Arc::new(PgStoryStore::new(pool));
    assert_eq!(store.backend(), "postgres");

    let t0 = Utc::now().duration_trunc(Duration::seconds(1))?;
    let owner = Uuid::new_v4();
    let fan = Uuid::new_v4();
    let story = store
        .insert(NewStory { owner, media: media(), created_at: t0, expires_at: compute_deadline(t0) })
        .await?;
    assert_eq!(story.media, media());
    assert!(story.liked_by.is_empty());

    let liked = store.add_like(story.id, fan).await?.unwrap();
    assert_eq!(liked.liked_by, vec![fan]);
    // liking twice keeps a single entry
    let liked = store.add_like(story.id, fan).await?.unwrap();
    assert_eq!(liked.liked_by.len(), 1);

    let filter = StoryFilter { owner: Some(owner), liked_by: Some(fan), active_at: Some(t0) };
    let (items, total) = store.query(&filter, 10, 0).await?;
    assert_eq!(total, 1);
    assert_eq!(items[0].id, story.id);

    let unliked = store.remove_like(story.id, fan).await?.unwrap();
    assert!(unliked.liked_by.is_empty());

    let clock = Arc::new(ManualClock::new(t0 + Duration::hours(24)));
    let sweeper = ExpirationSweeper::new(store.clone(), clock.clone());
    let marked = sweeper.mark_expired().await?;
    assert_eq!(marked.processed, 1);
    assert!(store.get(story.id).await?.unwrap().is_expired);
    assert!(!store.mark_expired(story.id).await?);

    let (_, active) = store.query(&StoryFilter { active_at: Some(t0), ..StoryFilter::default() }, 10, 0).await?;
    assert_eq!(active, 0);

    let deleted = sweeper.delete_expired().await?;
    assert_eq!(deleted.processed, 1);
    assert!(store.get(story.id).await?.is_none());
    assert!(!store.delete(story.id).await?);
    Ok(())
}

#[tokio::test]
async fn pg_schema_enforces_the_24h_window() -> anyhow::Result<()> {
    let Some(test_db) = test_database_url() else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return Ok(());
    };
    let (pool, _guard) = create_test_db_and_pool(&test_db).await?;
    let store = PgStoryStore::new(pool);

    let t0 = Utc::now().duration_trunc(Duration::seconds(1))?;
    let bad = store
        .insert(NewStory { owner: Uuid::new_v4(), media: media(), created_at: t0, expires_at: t0 + Duration::hours(48) })
        .await;
    assert!(bad.is_err());

    let empty = store
        .insert(NewStory { owner: Uuid::new_v4(), media: vec![], created_at: t0, expires_at: compute_deadline(t0) })
        .await;
    assert!(empty.is_err());
    Ok(())
}
