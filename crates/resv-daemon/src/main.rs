//! resv-daemon entry point.
//!
//! Thin on purpose: load config, pick the store backend, build the shared
//! state, wire middleware, serve. Handlers live in `routes.rs`.
//!
//! Config layers come from `RESV_CONFIG` (comma-separated YAML paths); with
//! none set, defaults apply (in-memory store on 127.0.0.1:8899).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use resv_config::{
    load_layered_yaml, report_unused_keys, secrets::resolve_store_secrets, ConfigConsumer,
    LoadedConfig, Settings, StoreBackend, UnusedKeyPolicy,
};
use resv_daemon::{routes, state};
use resv_engine::{EngineConfig, ReservationService};
use resv_store::{DocumentStore, MemoryStore};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_CONFIG_PATHS: &str = "RESV_CONFIG";
const ENV_DAEMON_ADDR: &str = "RESV_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    let settings = match &loaded {
        Some(cfg) => cfg.settings()?,
        None => Settings::default(),
    };

    let store = open_store(&settings, loaded.as_ref()).await?;
    let service = ReservationService::with_config(
        store,
        EngineConfig {
            max_commit_attempts: settings.engine.max_commit_attempts,
        },
    );

    let mut app_state = state::AppState::new(service);
    if let Some(cfg) = &loaded {
        app_state = app_state.with_config_hash(cfg.config_hash.clone());
    }
    let shared = Arc::new(app_state);

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    // Held for the life of the process; dropping it stops the stream.
    let _live = state::spawn_live_view(&shared)
        .await
        .context("failed to start live view")?;

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr(&settings)?;
    info!(
        backend = shared.service.store().backend(),
        "resv-daemon listening on http://{}", addr
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config() -> anyhow::Result<Option<LoadedConfig>> {
    let Ok(raw) = std::env::var(ENV_CONFIG_PATHS) else {
        info!("{ENV_CONFIG_PATHS} not set; using default settings");
        return Ok(None);
    };
    let paths: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if paths.is_empty() {
        return Ok(None);
    }

    let loaded = load_layered_yaml(&paths)?;
    let report = report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config has unused keys");
    }
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");
    Ok(Some(loaded))
}

async fn open_store(
    settings: &Settings,
    loaded: Option<&LoadedConfig>,
) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match settings.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::with_channel_capacity(
            settings.live_view.channel_capacity,
        ))),
        StoreBackend::Postgres => {
            let config_json = loaded
                .map(|c| c.config_json.clone())
                .unwrap_or_default();
            let secrets = resolve_store_secrets(&config_json)?;
            let url = secrets
                .database_url
                .as_deref()
                .with_context(|| format!("env var {} is empty", secrets.database_url_env))?;
            let pool = resv_db::connect(url).await?;
            resv_db::migrate(&pool).await?;
            Ok(Arc::new(resv_db::PgStore::with_channel_capacity(
                pool,
                settings.live_view.channel_capacity,
            )))
        }
    }
}

fn bind_addr(settings: &Settings) -> anyhow::Result<SocketAddr> {
    let raw = std::env::var(ENV_DAEMON_ADDR).unwrap_or_else(|_| settings.daemon.addr.clone());
    raw.parse()
        .with_context(|| format!("invalid daemon address {raw:?}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
