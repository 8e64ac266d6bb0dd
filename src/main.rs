use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reenact::api::{routes::create_router, state::AppState};
use reenact::browser::{CdpActuator, CdpEventSource, PageManager};
use reenact::config::Config;
use reenact::session::Engine;
use reenact::store::{MemoryStore, SqliteStore, StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Persistence failures degrade to in-memory operation, never a refusal
    // to start.
    let store = match SqliteStore::new(config.store_path.as_deref()) {
        Ok(store) => StateStore::new(Arc::new(store)),
        Err(err) => {
            tracing::warn!("SQLite store unavailable ({}), running in-memory", err);
            StateStore::new(Arc::new(MemoryStore::new()))
        }
    };

    let manager = Arc::new(PageManager::new(config.clone()));
    manager.launch().await?;

    let source = Arc::new(CdpEventSource::new(Arc::clone(&manager)));
    let actuator = Arc::new(CdpActuator::new(Arc::clone(&manager)));
    let engine = Engine::new(config.clone(), store, source, actuator);

    // Every main-document load gets a recovery pass, which is also how
    // playback crosses navigations.
    let mut load_events = manager.load_events().await?;
    let recovery_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        while load_events.next().await.is_some() {
            tracing::debug!("Document load fired");
            recovery_engine.recover().await;
        }
    });

    // Startup pass picks up state left by a previous process.
    engine.recover().await;

    let state = AppState::new(Arc::clone(&engine));
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("reenact listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
