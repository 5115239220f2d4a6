#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use cricket_story_kernel::clock::ManualClock;
use cricket_story_kernel::db;
use cricket_story_kernel::kernel::{build_app, Plugin};
use cricket_story_kernel::plugins::auth::{issue_token, IdentityVerifier};
use cricket_story_kernel::plugins::communication::stories::{
    DynStoryStore, ExpirationSweeper, InMemoryStoryStore, StoriesPlugin, StoryLimits, StoryService,
};
use cricket_story_kernel::plugins::health::HealthPlugin;
use cricket_story_kernel::rate_limit::InMemoryRateLimiter;
use std::process::Command;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const JWT_SECRET: &str = "cricket-test-secret";
pub const OPERATOR_TOKEN: &str = "cricket-operator";

pub struct TestApp {
    pub base: String,
    pub clock: Arc<ManualClock>,
    pub store: DynStoryStore,
    pub sweeper: Arc<ExpirationSweeper>,
    pub server: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

pub fn bearer(user: Uuid) -> String {
    format!("Bearer {}", issue_token(JWT_SECRET, user, chrono::Duration::hours(1)).unwrap())
}

/// Serves the stories and health plugins over a memory store on an ephemeral port.
pub async fn spawn_app() -> anyhow::Result<TestApp> {
    spawn_app_with_store(InMemoryStoryStore::new().into_arc()).await
}

pub async fn spawn_app_with_store(store: DynStoryStore) -> anyhow::Result<TestApp> {
    let clock = Arc::new(ManualClock::new(epoch()));
    let service = StoryService::new(
        store.clone(),
        InMemoryRateLimiter::new(1024).into_arc(),
        clock.clone(),
        StoryLimits::default(),
    );
    let sweeper = Arc::new(ExpirationSweeper::new(store.clone(), clock.clone()));
    let stories = StoriesPlugin::new(
        service,
        sweeper.clone(),
        IdentityVerifier::new(JWT_SECRET),
        Some(OPERATOR_TOKEN.to_string()),
    );
    let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(HealthPlugin::new(store.backend())), Box::new(stories)];
    let app = build_app(&plugins, None).await;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server error");
    });
    Ok(TestApp { base: format!("http://{}", addr), clock, store, sweeper, server })
}

pub struct TestDbGuard {
    maintenance_url: String,
    unique_db: String,
}

impl Drop for TestDbGuard {
    fn drop(&mut self) {
        let _ = Command::new("psql")
            .arg(&self.maintenance_url)
            .arg("-c")
            .arg(format!(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}' AND pid <> pg_backend_pid();",
                self.unique_db
            ))
            .status();
        let _ = Command::new("psql")
            .arg(&self.maintenance_url)
            .arg("-c")
            .arg(format!("DROP DATABASE IF EXISTS \"{}\"", self.unique_db))
            .status();
    }
}

/// Creates a throwaway database next to `test_db` and runs migrations on it.
pub async fn create_test_db_and_pool(test_db: &str) -> anyhow::Result<(sqlx::PgPool, TestDbGuard)> {
    let mut maintenance_url = test_db.to_string();
    if let Some(idx) = maintenance_url.rfind('/') {
        maintenance_url.replace_range(idx + 1.., "postgres");
    }
    let base_db_name = test_db.rsplit('/').next().unwrap().split('?').next().unwrap();
    let unique_db = format!("{}_{}", base_db_name, Uuid::new_v4().simple());
    let mut unique_db_url = test_db.to_string();
    if let Some(idx) = unique_db_url.rfind('/') {
        unique_db_url.replace_range(idx + 1.., &unique_db);
    }

    let _ = Command::new("psql").arg(&maintenance_url).arg("-c").arg(format!("CREATE DATABASE \"{}\"", unique_db)).status();
    let guard = TestDbGuard { maintenance_url, unique_db };
    let pool = db::init_db(&unique_db_url).await?;
    Ok((pool, guard))
}

/// `None` when no database is configured, so Postgres suites skip cleanly.
pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok().filter(|v| !v.is_empty())
}
