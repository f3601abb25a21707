//! Session-facing error type and its translation to the wire error frame.
//! Mirrors the teacher's `AppError`/`From` layering in
//! `ferrex-server/src/errors.rs`, retargeted from an HTTP response body to
//! the JSON WS error frame `notify_error_to_user` builds in
//! `original_source/CuemsWsServer.py`.

use cuems_core::CoreError;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("could not decode message: {0}")]
    Decode(String),

    #[error("unsupported action: {0}")]
    UnknownAction(String),
}

impl SessionError {
    /// `{type: "error", action?, uuid?, value: <message>}`, per
    /// `notify_error_to_user`'s three call shapes.
    pub fn to_frame(&self, action: Option<&str>, uuid: Option<&str>) -> Value {
        let mut frame = json!({
            "type": "error",
            "value": self.to_string(),
        });
        if let Some(action) = action {
            frame["action"] = json!(action);
        }
        if let Some(uuid) = uuid {
            frame["uuid"] = json!(uuid);
        }
        frame
    }
}
