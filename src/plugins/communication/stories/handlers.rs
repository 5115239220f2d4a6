use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::http_error::AppError;
use crate::plugins::auth::{AuthUser, MaybeAuthUser};
use crate::plugins::communication::shared::ListResponse;
use crate::plugins::communication::stories::models::{
    BulkDeleteRequest, BulkDeleteResponse, CleanupResponse, DeletedResponse, LikeOutcome, StoryCreate, StoryDto,
    StoryUpdate,
};
use crate::plugins::communication::stories::plugin::StoriesState;
use crate::plugins::communication::stories::service::{StoryPage, StoryQuery};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    #[serde(default)]
    pub include_expired: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WhereQuery {
    pub user_id: Option<Uuid>,
    pub liked: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    #[serde(default)]
    pub include_expired: bool,
}

fn render_page(state: &StoriesState, page: StoryPage, viewer: Option<Uuid>) -> ListResponse<StoryDto> {
    let now = state.service.clock().now();
    let items = page.items.into_iter().map(|s| StoryDto::from_story(s, viewer, now)).collect();
    ListResponse::new(items, page.page, page.total)
}

pub async fn create_story(
    Extension(state): Extension<StoriesState>,
    auth: AuthUser,
    payload: Result<Json<StoryCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<StoryDto>), AppError> {
    let Json(payload) = payload?;
    let story = state.service.create(auth.user_id, payload.media).await?;
    let now = state.service.clock().now();
    Ok((StatusCode::CREATED, Json(StoryDto::from_story(story, Some(auth.user_id), now))))
}

pub async fn list_stories(
    Extension(state): Extension<StoriesState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    q: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ListResponse<StoryDto>>, AppError> {
    let Query(q) = q?;
    let window = state.service.page_request(q.page, q.page_size);
    let query = StoryQuery { include_expired: q.include_expired, ..StoryQuery::default() };
    let page = state.service.list(query, window).await?;
    Ok(Json(render_page(&state, page, viewer)))
}

pub async fn list_active_stories(
    Extension(state): Extension<StoriesState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    q: Result<Query<ActiveQuery>, QueryRejection>,
) -> Result<Json<ListResponse<StoryDto>>, AppError> {
    let Query(q) = q?;
    let window = state.service.page_request(q.page, q.page_size);
    let page = state.service.list_active(window).await?;
    Ok(Json(render_page(&state, page, viewer)))
}

pub async fn find_stories_where(
    Extension(state): Extension<StoriesState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    q: Result<Query<WhereQuery>, QueryRejection>,
) -> Result<Json<ListResponse<StoryDto>>, AppError> {
    let Query(q) = q?;
    // liked=true only narrows the result for a known viewer
    let liked_by = match (q.liked, viewer) {
        (Some(true), Some(v)) => Some(v),
        _ => None,
    };
    let query = StoryQuery { owner: q.user_id, liked_by, include_expired: q.include_expired };
    let window = state.service.window_request(q.limit, q.offset);
    let page = state.service.list(query, window).await?;
    Ok(Json(render_page(&state, page, viewer)))
}

pub async fn get_story(
    Extension(state): Extension<StoriesState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StoryDto>, AppError> {
    let story = state.service.get(id).await?;
    let now = state.service.clock().now();
    Ok(Json(StoryDto::from_story(story, viewer, now)))
}

pub async fn update_story(
    Extension(state): Extension<StoriesState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    payload: Result<Json<StoryUpdate>, JsonRejection>,
) -> Result<Json<StoryDto>, AppError> {
    let Json(payload) = payload?;
    let story = state.service.update(id, auth.user_id, payload.media).await?;
    let now = state.service.clock().now();
    Ok(Json(StoryDto::from_story(story, Some(auth.user_id), now)))
}

pub async fn delete_story(
    Extension(state): Extension<StoriesState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    state.service.delete(id, auth.user_id).await?;
    Ok(Json(DeletedResponse { id, message: "Story deleted successfully".to_string() }))
}

pub async fn bulk_delete_stories(
    Extension(state): Extension<StoriesState>,
    auth: AuthUser,
    payload: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    let Json(payload) = payload?;
    let outcome = state.service.bulk_delete(payload.ids, auth.user_id).await?;
    let message = format!("{} stories deleted successfully", outcome.deleted_ids.len());
    Ok(Json(BulkDeleteResponse { deleted_ids: outcome.deleted_ids, failed_ids: outcome.failed_ids, message }))
}

pub async fn toggle_like(
    Extension(state): Extension<StoriesState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeOutcome>, AppError> {
    let outcome = state.service.toggle_like(id, auth.user_id).await?;
    Ok(Json(outcome))
}

pub async fn cleanup_expired(Extension(state): Extension<StoriesState>) -> Result<Json<CleanupResponse>, AppError> {
    let report = state.sweeper.delete_expired().await.map_err(AppError::internal)?;
    Ok(Json(CleanupResponse { found: report.found, deleted: report.processed, failed_ids: report.failed_ids }))
}
