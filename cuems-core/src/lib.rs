//! Library store, media/project services, upload pipeline, and engine RPC
//! bridge for the Cuems cueing platform's collaboration core.

pub mod engine_bridge;
pub mod error;
pub mod layout;
pub mod media_service;
pub mod project_service;
pub mod sanitize;
pub mod script;
pub mod store;
pub mod upload;
pub mod versioned_move;

pub use error::{CoreError, Result};
pub use layout::LibraryLayout;
pub use media_service::MediaService;
pub use project_service::ProjectService;
pub use store::MetadataStore;
