use crate::kernel::Plugin;
use axum::{Extension, Json, Router, routing::get};
use serde::Serialize;

#[derive(Serialize)]
struct Health {
    status: &'static str,
    store: &'static str,
}

/// Liveness check; reports which story store backend is mounted.
pub struct HealthPlugin {
    store: &'static str,
}

impl HealthPlugin {
    pub fn new(store: &'static str) -> Self {
        Self { store }
    }
}

async fn health_handler(Extension(store): Extension<&'static str>) -> Json<Health> {
    Json(Health { status: "ok", store })
}

#[async_trait::async_trait]
impl Plugin for HealthPlugin {
    async fn router(&self) -> Router {
        Router::new()
            .route("/", get(health_handler))
            .layer(Extension(self.store))
    }

    fn name(&self) -> &'static str {
        "health"
    }

    async fn on_start(&self) {
        tracing::info!(store = self.store, "health plugin started");
    }
}
