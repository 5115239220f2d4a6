use axum::{middleware, Extension, Router, routing::delete, routing::get, routing::post};
use std::sync::Arc;

use crate::kernel::Plugin;
use crate::plugins::auth::middleware::require_operator;
use crate::plugins::auth::IdentityVerifier;
use crate::plugins::communication::stories::handlers::*;
use crate::plugins::communication::stories::service::StoryService;
use crate::plugins::communication::stories::sweeper::ExpirationSweeper;

#[derive(Clone)]
pub struct StoriesState {
    pub service: StoryService,
    pub sweeper: Arc<ExpirationSweeper>,
}

pub struct StoriesPlugin {
    state: StoriesState,
    verifier: IdentityVerifier,
    operator_token: Option<Arc<str>>,
}

impl StoriesPlugin {
    pub fn new(
        service: StoryService,
        sweeper: Arc<ExpirationSweeper>,
        verifier: IdentityVerifier,
        operator_token: Option<String>,
    ) -> Self {
        Self {
            state: StoriesState { service, sweeper },
            verifier,
            operator_token: operator_token.map(Arc::from),
        }
    }
}

#[async_trait::async_trait]
impl Plugin for StoriesPlugin {
    async fn router(&self) -> Router {
        let operator = Router::new()
            .route("/cleanup-expired", post(cleanup_expired))
            .route_layer(middleware::from_fn_with_state(self.operator_token.clone(), require_operator));

        Router::new()
            .route("/", post(create_story).get(list_stories))
            .route("/active", get(list_active_stories))
            .route("/where", get(find_stories_where))
            .route("/bulk-delete", delete(bulk_delete_stories))
            .route("/:id", get(get_story).put(update_story).delete(delete_story))
            .route("/:id/like", post(toggle_like))
            .merge(operator)
            .layer(Extension(self.state.clone()))
            .layer(Extension(self.verifier.clone()))
    }

    fn name(&self) -> &'static str { "stories" }

    async fn on_start(&self) {
        if self.operator_token.is_none() {
            tracing::warn!("OPERATOR_TOKEN not set; manual story cleanup endpoint is disabled");
        }
    }
}
