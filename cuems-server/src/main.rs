//! Cuems collaboration server: accepts editor WebSocket connections,
//! mediates concurrent project/media edits against the on-disk library,
//! and forwards playback commands to the sibling playback engine.
//!
//! Grounded on `ferrex-server/src/main.rs`'s bootstrap shape (CLI parse,
//! tracing init, service construction, `AppState`, router, serve), with
//! the Postgres/Redis/auth stack replaced by this system's
//! `MetadataStore`/`ProjectService`/`MediaService`/`EngineBridge`.

mod actions;
mod app_state;
mod config;
mod errors;
mod upload_session;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use cuems_core::engine_bridge::EngineBridge;
use cuems_core::script::{OpaqueScriptCodec, StructuralReferenceScanner};
use cuems_core::{LibraryLayout, MediaService, MetadataStore, ProjectService};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use app_state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = config::Cli::parse();
    let settings = config::Settings::load(&cli)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuems_server=info,cuems_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(library = %settings.library_path.display(), "starting cuems-server");

    let layout = LibraryLayout::new(&settings.library_path);
    layout.ensure_created()?;
    tokio::fs::create_dir_all(&settings.tmp_upload_path).await?;

    let store = MetadataStore::connect(&settings.database_path).await?;

    let project_service = Arc::new(ProjectService::new(
        store.clone(),
        layout.clone(),
        Arc::new(OpaqueScriptCodec),
        Arc::new(StructuralReferenceScanner),
    ));
    let media_service = Arc::new(MediaService::new(store, layout));

    // The sibling playback engine's wire transport is an external
    // interface contract, not something this server owns; until it is
    // wired to a real process, drain requests so the bridge's internal
    // queue never backs up, and keep the response sender alive so
    // in-flight calls wait out their timeout rather than erroring
    // immediately on a closed channel.
    let (engine_responses_tx, engine_responses_rx) =
        tokio::sync::mpsc::channel(settings.engine_response_queue_capacity);
    let (engine, mut engine_requests_rx) = EngineBridge::spawn(
        settings.engine_request_queue_capacity,
        engine_responses_rx,
        Duration::from_millis(settings.engine_rpc_poll_interval_ms),
        Duration::from_millis(settings.engine_rpc_timeout_ms),
    );
    tokio::spawn(async move {
        let _keep_responses_channel_open = engine_responses_tx;
        while let Some(request) = engine_requests_rx.recv().await {
            tracing::debug!(action = %request.action, uuid = %request.action_uuid, "engine request queued, no transport attached");
        }
    });

    let state = AppState {
        project_service,
        media_service,
        engine: Arc::new(engine),
        registry: Arc::new(ws::registry::Registry::new()),
        dispatcher_workers_per_session: settings.dispatcher_workers_per_session,
        tmp_upload_path: settings.tmp_upload_path.clone(),
    };

    let app = Router::new()
        .route("/", get(ws::handler::project_manager_handler))
        .route("/upload", get(ws::handler::upload_handler))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", settings.bind_host, settings.bind_port).parse()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
