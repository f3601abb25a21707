//! Shared data model for the Cuems cueing platform.
//!
//! These types carry no behavior beyond what's needed to move data between
//! the metadata store, the session server, and the wire protocol. Feature
//! `sqlx` enables direct row decoding via `sqlx::FromRow`.

mod ids;
mod media;
mod project;
mod project_media;

pub use ids::{MediaId, ProjectId};
pub use media::{Media, MediaType};
pub use project::Project;
pub use project_media::ProjectMedia;
