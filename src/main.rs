use axum::Router;
use cricket_story_kernel::clock::{DynClock, SystemClock};
use cricket_story_kernel::config::{Config, StoreBackend};
use cricket_story_kernel::db;
use cricket_story_kernel::kernel::{build_app, Plugin};
use cricket_story_kernel::plugins::auth::IdentityVerifier;
use cricket_story_kernel::plugins::communication::stories::scheduler::{register_sweeps, CronScheduler, Scheduler};
use cricket_story_kernel::plugins::communication::stories::{
    DynStoryStore, ExpirationSweeper, InMemoryStoryStore, PgStoryStore, StoriesPlugin, StoryLimits, StoryService,
};
use cricket_story_kernel::plugins::health::HealthPlugin;
use cricket_story_kernel::plugins::metrics::MetricsPlugin;
use cricket_story_kernel::rate_limit::{DynRateLimiter, InMemoryRateLimiter, RedisRateLimiter};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const RATE_LIMIT_KEYS: usize = 10_000;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(config.is_json_logging());

    let clock: DynClock = Arc::new(SystemClock);

    let store: DynStoryStore = match config.store {
        StoreBackend::Postgres => {
            let pool = db::init_db(&config.database_url).await?;
            Arc::new(PgStoryStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory story store; data is lost on restart");
            InMemoryStoryStore::new().into_arc()
        }
    };

    let limiter: DynRateLimiter = match &config.redis_url {
        Some(url) => RedisRateLimiter::new(url).await?.into_arc(),
        None => InMemoryRateLimiter::new(RATE_LIMIT_KEYS).into_arc(),
    };

    let metrics_plugin = MetricsPlugin::new()?;

    let limits = StoryLimits {
        default_page_size: config.default_page_size,
        max_page_size: config.max_page_size,
        ..StoryLimits::default()
    };
    let service = StoryService::new(store.clone(), limiter, clock.clone(), limits);
    let sweeper = Arc::new(ExpirationSweeper::new(store.clone(), clock).with_metrics(metrics_plugin.clone()));

    let scheduler = if config.sweeps_enabled {
        let scheduler = CronScheduler::new().await?;
        register_sweeps(&scheduler, sweeper.clone(), &config.mark_rule, &config.delete_rule).await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("story sweeps disabled");
        None
    };

    let stories_plugin = StoriesPlugin::new(
        service,
        sweeper,
        IdentityVerifier::new(&config.jwt_secret),
        config.operator_token.clone(),
    );
    let plugins_vec: Vec<Box<dyn Plugin>> = vec![
        Box::new(HealthPlugin::new(store.backend())),
        Box::new(stories_plugin),
    ];

    let plugin_names: Vec<&'static str> = plugins_vec.iter().map(|p| p.name()).collect();
    tracing::info!("mounting plugins: {:?}", plugin_names);

    let mut app: Router = build_app(&plugins_vec, Some(metrics_plugin.clone())).await;
    // not instrumented to avoid double-counting
    app = app.nest("/metrics", metrics_plugin.router());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            for p in plugins_vec.iter() {
                p.on_shutdown().await;
            }
        })
        .await?;

    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::error!("scheduler shutdown failed: {}", e);
        }
    }

    Ok(())
}
