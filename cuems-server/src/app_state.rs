//! Shared, cloneable application state handed to every connection task.
//! Grounded on `ferrex-server/src/main.rs`'s `AppState` (an `Arc`-wrapped
//! bag of services cloned per request), retargeted to this server's
//! three core services plus the cross-session `Registry`.

use std::sync::Arc;

use cuems_core::engine_bridge::EngineBridge;
use cuems_core::{MediaService, ProjectService};

use crate::ws::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub project_service: Arc<ProjectService>,
    pub media_service: Arc<MediaService>,
    pub engine: Arc<EngineBridge>,
    pub registry: Arc<Registry>,
    pub dispatcher_workers_per_session: usize,
    pub tmp_upload_path: std::path::PathBuf,
}
