//! Evolution Town Back binary entrypoint wiring REST routes, the agent client and the progress store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use evolution_town_back::{
    config::AppConfig,
    dao::progress_store::memory::MemoryProgressStore,
    routes,
    services::task_validator::{CozeClient, CozeConfig},
    state::{AppState, SharedState},
};

const DEFAULT_PORT: u16 = 3000;

/// Where accounts and progress are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageBackend {
    Memory,
    Mongo,
}

impl StorageBackend {
    fn from_env() -> anyhow::Result<Self> {
        match env::var("STORAGE_BACKEND").as_deref() {
            Err(_) | Ok("mongo") | Ok("mongodb") => Ok(StorageBackend::Mongo),
            Ok("memory") => Ok(StorageBackend::Memory),
            Ok(other) => bail!("unknown STORAGE_BACKEND `{other}` (expected `mongo` or `memory`)"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let coze = Arc::new(CozeClient::new(CozeConfig::from_env()).context("building Coze client")?);
    let app_state = AppState::new(config, coze.clone(), coze);

    let backend = StorageBackend::from_env()?;
    start_storage(&app_state, backend).await?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, ?backend, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the in-memory store right away, or hand MongoDB over to the storage supervisor.
async fn start_storage(state: &SharedState, backend: StorageBackend) -> anyhow::Result<()> {
    match backend {
        StorageBackend::Memory => {
            info!("using in-memory progress store; data is lost on restart");
            state
                .install_progress_store(Arc::new(MemoryProgressStore::new()))
                .await;
            Ok(())
        }
        StorageBackend::Mongo => start_mongo(state),
    }
}

#[cfg(feature = "mongo-store")]
fn start_mongo(state: &SharedState) -> anyhow::Result<()> {
    use evolution_town_back::{
        dao::{
            progress_store::{
                ProgressStore,
                mongodb::{MongoConfig, MongoProgressStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    async fn connect() -> Result<Arc<dyn ProgressStore>, StorageError> {
        let config = MongoConfig::from_env().await?;
        let store = MongoProgressStore::connect(config).await?;
        Ok(Arc::new(store))
    }

    tokio::spawn(storage_supervisor::run(state.clone(), connect));
    Ok(())
}

#[cfg(not(feature = "mongo-store"))]
fn start_mongo(_state: &SharedState) -> anyhow::Result<()> {
    bail!("built without the `mongo-store` feature; set STORAGE_BACKEND=memory")
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
