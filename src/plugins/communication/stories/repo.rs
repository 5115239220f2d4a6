use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::error::StoreError;
use super::models::{MediaRef, NewStory, Story, StoryFilter, StoryRow, SweepCandidate};
use super::store::StoryStore;

const STORY_COLUMNS: &str = "id, owner_id, media, liked_by, created_at, expires_at, is_expired";

#[derive(Clone)]
pub struct PgStoryStore {
    pool: PgPool,
}

impl PgStoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

enum Param {
    Id(Uuid),
    Time(DateTime<Utc>),
}

/// WHERE clause and bind values for `filter`, numbered from `$1`.
fn where_clause(filter: &StoryFilter) -> (String, Vec<Param>) {
    let mut where_clauses: Vec<String> = Vec::new();
    let mut params: Vec<Param> = Vec::new();
    if let Some(owner) = filter.owner {
        params.push(Param::Id(owner));
        where_clauses.push(format!("owner_id = ${}", params.len()));
    }
    if let Some(user) = filter.liked_by {
        params.push(Param::Id(user));
        where_clauses.push(format!("${} = ANY(liked_by)", params.len()));
    }
    if let Some(now) = filter.active_at {
        params.push(Param::Time(now));
        where_clauses.push(format!("is_expired = FALSE AND expires_at > ${}", params.len()));
    }
    let where_sql = if where_clauses.is_empty() { "1=1".to_string() } else { where_clauses.join(" AND ") };
    (where_sql, params)
}

#[async_trait]
impl StoryStore for PgStoryStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, new: NewStory) -> Result<Story, StoreError> {
        let row = sqlx::query_as::<_, StoryRow>(&format!(
            "INSERT INTO stories (owner_id, media, created_at, expires_at) VALUES ($1,$2,$3,$4) RETURNING {}",
            STORY_COLUMNS
        ))
        .bind(new.owner)
        .bind(sqlx::types::Json(&new.media))
        .bind(new.created_at)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Story>, StoreError> {
        let row = sqlx::query_as::<_, StoryRow>(&format!("SELECT {} FROM stories WHERE id = $1", STORY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Story::from))
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Story>, StoreError> {
        let rows = sqlx::query_as::<_, StoryRow>(&format!("SELECT {} FROM stories WHERE id = ANY($1)", STORY_COLUMNS))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Story::from).collect())
    }

    async fn query(&self, filter: &StoryFilter, limit: i64, offset: i64) -> Result<(Vec<Story>, i64), StoreError> {
        let (where_sql, params) = where_clause(filter);

        let items_sql = format!(
            "SELECT {} FROM stories WHERE {} ORDER BY created_at DESC, id DESC LIMIT ${} OFFSET ${}",
            STORY_COLUMNS,
            where_sql,
            params.len() + 1,
            params.len() + 2
        );
        let mut items_q = sqlx::query_as::<_, StoryRow>(&items_sql);
        for p in &params {
            match p {
                Param::Id(id) => { items_q = items_q.bind(*id); }
                Param::Time(t) => { items_q = items_q.bind(*t); }
            }
        }
        items_q = items_q.bind(limit).bind(offset);
        let rows: Vec<StoryRow> = items_q.fetch_all(&self.pool).await?;

        let count_sql = format!("SELECT COUNT(*) FROM stories WHERE {}", where_sql);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for p in &params {
            match p {
                Param::Id(id) => { count_q = count_q.bind(*id); }
                Param::Time(t) => { count_q = count_q.bind(*t); }
            }
        }
        let total: i64 = count_q.fetch_one(&self.pool).await?;

        Ok((rows.into_iter().map(Story::from).collect(), total))
    }

    async fn replace_media(&self, id: Uuid, media: Vec<MediaRef>) -> Result<Option<Story>, StoreError> {
        let row = sqlx::query_as::<_, StoryRow>(&format!(
            "UPDATE stories SET media = $1 WHERE id = $2 RETURNING {}",
            STORY_COLUMNS
        ))
        .bind(sqlx::types::Json(&media))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Story::from))
    }

    async fn add_like(&self, id: Uuid, user: Uuid) -> Result<Option<Story>, StoreError> {
        let row = sqlx::query_as::<_, StoryRow>(&format!(
            "UPDATE stories SET liked_by = CASE WHEN $1 = ANY(liked_by) THEN liked_by ELSE array_append(liked_by, $1) END WHERE id = $2 RETURNING {}",
            STORY_COLUMNS
        ))
        .bind(user)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Story::from))
    }

    async fn remove_like(&self, id: Uuid, user: Uuid) -> Result<Option<Story>, StoreError> {
        let row = sqlx::query_as::<_, StoryRow>(&format!(
            "UPDATE stories SET liked_by = array_remove(liked_by, $1) WHERE id = $2 RETURNING {}",
            STORY_COLUMNS
        ))
        .bind(user)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Story::from))
    }

    async fn mark_expired(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE stories SET is_expired = TRUE WHERE id = $1 AND is_expired = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM stories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_for_marking(&self, now: DateTime<Utc>) -> Result<Vec<SweepCandidate>, StoreError> {
        let rows = sqlx::query_as::<_, SweepCandidate>(
            "SELECT id, expires_at FROM stories WHERE expires_at <= $1 AND is_expired = FALSE ORDER BY expires_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn due_for_deletion(&self, now: DateTime<Utc>) -> Result<Vec<SweepCandidate>, StoreError> {
        let rows = sqlx::query_as::<_, SweepCandidate>(
            "SELECT id, expires_at FROM stories WHERE expires_at <= $1 OR is_expired = TRUE ORDER BY expires_at",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
