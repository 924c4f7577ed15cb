//! Counting game backend entrypoint wiring the Slack webhooks, REST, SSE and storage layers.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use counting_back::{
    config::{AppConfig, StoreConfig},
    dao::game_store::InMemoryGameStore,
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    if config.slack.verification_token.is_none() {
        warn!("no Slack verification token configured; webhook requests are not authenticated");
    }
    let port = config.port;
    let store = config.store.clone();
    let app_state = AppState::new(config);

    match store {
        StoreConfig::Memory => {
            info!("using in-memory store; state is lost on restart");
            app_state
                .install_game_store(Arc::new(InMemoryGameStore::new()))
                .await;
        }
        StoreConfig::Mongo { uri, database } => {
            spawn_mongo_supervisor(app_state.clone(), uri, database).await;
        }
    }

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the storage supervisor against MongoDB; the server stays degraded until it connects.
#[cfg(feature = "mongo-store")]
async fn spawn_mongo_supervisor(state: SharedState, uri: String, database: Option<String>) {
    use counting_back::{
        dao::{
            game_store::{
                GameStore,
                mongodb::{MongoConfig, MongoGameStore},
            },
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    info!(database = ?database, "using MongoDB store");
    tokio::spawn(storage_supervisor::run(state, move || {
        let uri = uri.clone();
        let database = database.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, database.as_deref()).await?;
            let store = MongoGameStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
        }
    }));
}

#[cfg(not(feature = "mongo-store"))]
async fn spawn_mongo_supervisor(state: SharedState, _uri: String, _database: Option<String>) {
    warn!("built without the mongo-store feature; falling back to the in-memory store");
    state
        .install_game_store(Arc::new(InMemoryGameStore::new()))
        .await;
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
                warn!(error = %err, "could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
