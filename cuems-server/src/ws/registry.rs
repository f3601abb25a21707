//! Cross-connection state shared by every session on this server: which
//! project each connected user has loaded, which session ids have been
//! seen before (so reconnecting to the same browser tab's `?session=`
//! reopens the same project), and the counter broadcast to all.
//!
//! Grounded on `CuemsWsServer`'s `self.users`/`self.sessions`/`self.state`
//! dicts and the `notify_*` methods in
//! `original_source/CuemsWsServer.py`. The Python holds one asyncio queue
//! per user and `put`s messages onto it; here each connection instead
//! owns an `mpsc::Sender` registered here, and broadcasting is just a
//! fan-out `send` over the registered senders.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::ws::session::WsOutbound;

/// A locally-administered, pseudo-random node id for minting v1 session
/// uuids — there is no stable MAC to read inside a container, so this
/// follows the same fallback `cuems-model::ids` uses for entity ids.
fn session_node_id() -> [u8; 6] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let bytes = nanos.to_le_bytes();
    let mut node = [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]];
    node[0] |= 0b0000_0010;
    node
}

#[derive(Debug, Clone, Default)]
struct SessionInfo {
    loaded_project: Option<String>,
}

struct UserEntry {
    outgoing: mpsc::Sender<WsOutbound>,
    loaded_project: Option<String>,
}

/// `original_source/CuemsWsServer.py`'s `re.search` pattern for a v1 uuid
/// carried on the `?session=` query parameter.
fn is_v1_uuid(candidate: &str) -> bool {
    match Uuid::parse_str(candidate) {
        Ok(uuid) => uuid.get_version_num() == 1,
        Err(_) => false,
    }
}

pub struct Registry {
    users: Mutex<HashMap<Uuid, UserEntry>>,
    sessions: Mutex<HashMap<String, SessionInfo>>,
    counter: Mutex<i64>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            counter: Mutex::new(0),
        }
    }

    pub async fn register(&self, conn_id: Uuid, outgoing: mpsc::Sender<WsOutbound>) {
        self.users.lock().await.insert(
            conn_id,
            UserEntry {
                outgoing,
                loaded_project: None,
            },
        );
        self.notify_users().await;
    }

    pub async fn unregister(&self, conn_id: Uuid) {
        self.users.lock().await.remove(&conn_id);
        self.notify_users().await;
    }

    /// Reuses an existing session id carried on the connection's query
    /// string if it names a v1 uuid this server has already seen,
    /// otherwise mints a fresh one. Matches `check_session`.
    pub async fn resolve_session_id(&self, requested: Option<&str>) -> String {
        let mut sessions = self.sessions.lock().await;

        let session_id = match requested {
            Some(candidate) if is_v1_uuid(candidate) && sessions.contains_key(candidate) => {
                candidate.to_string()
            }
            _ => Uuid::now_v1(&session_node_id()).to_string(),
        };

        sessions.entry(session_id.clone()).or_default();
        session_id
    }

    /// The project previously loaded under this session id, if any, so a
    /// reconnecting client can have it reopened automatically. Matches
    /// `load_session`.
    pub async fn previously_loaded_project(&self, session_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .and_then(|s| s.loaded_project.clone())
    }

    pub async fn set_loaded_project(&self, conn_id: Uuid, session_id: &str, project_uuid: &str) {
        if let Some(entry) = self.users.lock().await.get_mut(&conn_id) {
            entry.loaded_project = Some(project_uuid.to_string());
        }
        if let Some(session) = self.sessions.lock().await.get_mut(session_id) {
            session.loaded_project = Some(project_uuid.to_string());
        }
    }

    async fn send_to(&self, conn_id: Uuid, value: Value) {
        let users = self.users.lock().await;
        if let Some(entry) = users.get(&conn_id) {
            let _ = entry.outgoing.send(WsOutbound::Json(value)).await;
        }
    }

    pub async fn notify_session(&self, conn_id: Uuid, session_id: &str) {
        self.send_to(conn_id, json!({"type": "session_id", "value": session_id}))
            .await;
    }

    /// The second frame of the connect handshake (`spec.md` §6): a small
    /// config object the editor needs before issuing any requests.
    pub async fn notify_initial_mappings(&self, conn_id: Uuid, mappings: Value) {
        self.send_to(conn_id, json!({"type": "initial_mappings", "value": mappings}))
            .await;
    }

    pub async fn notify_counter(&self, conn_id: Uuid) {
        let value = *self.counter.lock().await;
        self.send_to(conn_id, json!({"type": "counter", "value": value}))
            .await;
    }

    async fn notify_users(&self) {
        let users = self.users.lock().await;
        let count = users.len();
        let message = json!({"type": "users", "value": count});
        for entry in users.values() {
            let _ = entry.outgoing.send(WsOutbound::Json(message.clone())).await;
        }
    }

    /// Broadcasts to every connected user except `calling_conn`, telling
    /// them a list they might be displaying has changed. Matches
    /// `notify_others_list_changes`.
    pub async fn notify_others_list_changes(&self, calling_conn: Uuid, list_type: &str) {
        let users = self.users.lock().await;
        let message = json!({"type": "list_update", "value": list_type});
        for (&conn_id, entry) in users.iter() {
            if conn_id != calling_conn {
                let _ = entry.outgoing.send(WsOutbound::Json(message.clone())).await;
            }
        }
    }

    /// Broadcasts a list-changed notice to every connected user with no
    /// exclusion — the upload session has no registered `conn_id` of its
    /// own, matching `notify_others_list_changes(None, "file_list")`'s
    /// call from `CuemsUpload.upload_done`.
    pub async fn notify_list_changes(&self, list_type: &str) {
        let users = self.users.lock().await;
        let message = json!({"type": "list_update", "value": list_type});
        for entry in users.values() {
            let _ = entry.outgoing.send(WsOutbound::Json(message.clone())).await;
        }
    }

    /// Broadcasts to every other user who has the same project loaded.
    /// Matches `notify_others_same_project`.
    pub async fn notify_others_same_project(&self, calling_conn: Uuid, project_uuid: &str) {
        let users = self.users.lock().await;
        let message = json!({"type": "project_update", "value": project_uuid});
        for (&conn_id, entry) in users.iter() {
            if conn_id == calling_conn {
                continue;
            }
            if entry.loaded_project.as_deref() == Some(project_uuid) {
                let _ = entry.outgoing.send(WsOutbound::Json(message.clone())).await;
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseen_session_id_is_replaced_with_a_fresh_one() {
        let registry = Registry::new();
        let resolved = registry.resolve_session_id(Some("not-a-uuid")).await;
        assert!(Uuid::parse_str(&resolved).is_ok());
    }

    #[tokio::test]
    async fn known_session_id_is_reused() {
        let registry = Registry::new();
        let first = registry.resolve_session_id(None).await;
        let second = registry.resolve_session_id(Some(&first)).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn notify_list_changes_reaches_every_registered_user() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(Uuid::new_v4(), tx).await;

        // drain the `users` count broadcast `register` itself sends
        let _ = rx.recv().await;

        registry.notify_list_changes("file_list").await;

        let WsOutbound::Json(frame) = rx.recv().await.unwrap() else {
            panic!("expected a json frame");
        };
        assert_eq!(frame["type"], "list_update");
        assert_eq!(frame["value"], "file_list");
    }

    #[tokio::test]
    async fn notify_others_list_changes_excludes_the_caller() {
        let registry = Registry::new();
        let caller = Uuid::new_v4();
        let (caller_tx, mut caller_rx) = mpsc::channel(8);
        let (other_tx, mut other_rx) = mpsc::channel(8);
        registry.register(caller, caller_tx).await;
        registry.register(Uuid::new_v4(), other_tx).await;

        // drain the two `users` count broadcasts each registration sends
        let _ = caller_rx.recv().await;
        let _ = caller_rx.recv().await;
        let _ = other_rx.recv().await;

        registry.notify_others_list_changes(caller, "project_list").await;

        let WsOutbound::Json(frame) = other_rx.recv().await.unwrap() else {
            panic!("expected a json frame");
        };
        assert_eq!(frame["value"], "project_list");
        assert!(caller_rx.try_recv().is_err());
    }
}
