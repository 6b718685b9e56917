mod auth;
mod config;
mod error;
mod firebase;
mod live;
mod memory;
mod model;
mod permissions;
mod session;
mod store;
mod ui;
mod web;

use crate::auth::AuthProvider;
use crate::config::{AppConfig, Backend};
use crate::firebase::{IdentityToolkit, RealtimeDatabase};
use crate::live::ViewRenderer;
use crate::memory::{MemoryAuth, MemoryStore, Seed};
use crate::permissions::PermissionWriter;
use crate::session::SessionGate;
use crate::store::LiveStore;
use crate::web::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Arc::new(AppConfig::from_env()?);

    tracing::info!(
        "Starting alarm console on {} ({:?} backend, devices: {})",
        config.http_bind,
        config.backend,
        config.permission_devices.join(", ")
    );

    let (store, auth) = connect_backend(&config)?;
    let gate = Arc::new(SessionGate::new(
        auth,
        Arc::clone(&store),
        config.admin_role.clone(),
        config.session_ttl,
    ));

    let state = AppState {
        config: config.clone(),
        gate,
        renderer: ViewRenderer::new(config.permission_devices.clone()),
        writer: PermissionWriter::new(Arc::clone(&store)),
        store,
    };

    web::serve(state).await
}

fn connect_backend(config: &AppConfig) -> Result<(Arc<dyn LiveStore>, Arc<dyn AuthProvider>)> {
    match config.backend {
        Backend::Memory => {
            let seed = Seed::load(config.seed_file.as_deref())?;
            tracing::info!(
                "Using in-memory store with {} account(s){}",
                seed.accounts.len(),
                config
                    .seed_file
                    .as_deref()
                    .map(|path| format!(" from {path}"))
                    .unwrap_or_default()
            );
            let store: Arc<dyn LiveStore> = Arc::new(MemoryStore::new(seed.data));
            let auth: Arc<dyn AuthProvider> = Arc::new(MemoryAuth::new(seed.accounts));
            Ok((store, auth))
        }
        Backend::Firebase => {
            let firebase = config
                .firebase
                .as_ref()
                .context("Firebase settings missing")?;
            tracing::info!("Using Realtime Database at {}", firebase.database_url);
            let store: Arc<dyn LiveStore> =
                Arc::new(RealtimeDatabase::new(firebase, config.stream_retry));
            let auth: Arc<dyn AuthProvider> = Arc::new(IdentityToolkit::new(firebase));
            Ok((store, auth))
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = fmt().with_env_filter(env_filter).try_init();
}
