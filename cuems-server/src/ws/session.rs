//! Per-connection WebSocket pipeline: one reader task, one writer task,
//! and a fixed pool of dispatcher tasks pulling decoded actions off a
//! shared queue. Grounded on `project_manager_session`'s
//! `consumer_handler`/`producer_handler`/`consumer` tasks in
//! `original_source/CuemsWsServer.py`, which starts exactly 3 `consumer`
//! tasks "so a load or any other time consuming action still leaves
//! with 2 tasks running and interface feels responsive" — the dispatcher
//! pool count here is `dispatcher_workers_per_session` (default 3) for
//! the same reason. The Python's `asyncio.wait(..., FIRST_COMPLETED)` +
//! cancel-the-rest shutdown is reproduced with `futures::future::select_all`
//! over `JoinHandle`s.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use cuems_model::{MediaId, ProjectId};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::actions::{self, Action};
use crate::errors::SessionError;
use crate::AppState;

/// An outbound frame queued for a connection's writer task: either a JSON
/// text frame or a binary payload (thumbnails/waveforms, prefixed with
/// their 36-byte ascii uuid header by the media service).
#[derive(Debug, Clone)]
pub enum WsOutbound {
    Json(Value),
    Binary(Vec<u8>),
}

pub async fn run_project_manager_session(
    socket: WebSocket,
    state: AppState,
    session_param: Option<String>,
) {
    let conn_id = Uuid::new_v4();
    let (ws_sender, ws_receiver) = socket.split();

    let (outgoing_tx, outgoing_rx) = mpsc::channel::<WsOutbound>(128);
    let (incoming_tx, incoming_rx) = mpsc::channel::<String>(128);
    let incoming_rx = Arc::new(Mutex::new(incoming_rx));

    state.registry.register(conn_id, outgoing_tx.clone()).await;

    let session_id = state.registry.resolve_session_id(session_param.as_deref()).await;
    state.registry.notify_session(conn_id, &session_id).await;
    state
        .registry
        .notify_initial_mappings(
            conn_id,
            json!({"dispatcher_workers_per_session": state.dispatcher_workers_per_session}),
        )
        .await;

    if let Some(project_uuid) = state.registry.previously_loaded_project(&session_id).await {
        send_project(&state, &outgoing_tx, conn_id, &session_id, &project_uuid).await;
    }
    state.registry.notify_counter(conn_id).await;

    let writer = tokio::spawn(writer_task(ws_sender, outgoing_rx));
    let reader = tokio::spawn(reader_task(ws_receiver, incoming_tx));

    let mut tasks = vec![writer, reader];
    for _ in 0..state.dispatcher_workers_per_session {
        tasks.push(tokio::spawn(dispatcher_task(
            incoming_rx.clone(),
            state.clone(),
            conn_id,
            session_id.clone(),
            outgoing_tx.clone(),
        )));
    }

    let (_finished, _index, remaining) = futures_util::future::select_all(tasks).await;
    for task in remaining {
        task.abort();
    }

    state.registry.unregister(conn_id).await;
}

/// The `/upload` path's session: no registry, no dispatcher pool — just a
/// single sequential message loop against one `UploadSession`, matching
/// `upload_session`/`CuemsUpload.message_handler`.
pub async fn run_upload_session(socket: WebSocket, state: AppState) {
    crate::upload_session::drive(socket, state).await;
}

async fn reader_task(
    mut ws_receiver: SplitStream<WebSocket>,
    incoming_tx: mpsc::Sender<String>,
) {
    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if incoming_tx.send(text.to_string()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!("websocket read error: {err}");
                break;
            }
        }
    }
}

async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<WsOutbound>,
) {
    while let Some(frame) = outgoing_rx.recv().await {
        let message = match frame {
            WsOutbound::Json(value) => Message::Text(value.to_string().into()),
            WsOutbound::Binary(bytes) => Message::Binary(bytes.into()),
        };
        if ws_sender.send(message).await.is_err() {
            break;
        }
    }
}

async fn dispatcher_task(
    incoming_rx: Arc<Mutex<mpsc::Receiver<String>>>,
    state: AppState,
    conn_id: Uuid,
    session_id: String,
    outgoing_tx: mpsc::Sender<WsOutbound>,
) {
    loop {
        let text = {
            let mut rx = incoming_rx.lock().await;
            rx.recv().await
        };
        let Some(text) = text else { break };

        let envelope: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => {
                let frame = SessionError::Decode("invalid json".into()).to_frame(None, None);
                let _ = outgoing_tx.send(WsOutbound::Json(frame)).await;
                continue;
            }
        };

        let action = match actions::decode(&envelope) {
            Ok(action) => action,
            Err(err) => {
                let frame = err.to_frame(None, None);
                let _ = outgoing_tx.send(WsOutbound::Json(frame)).await;
                continue;
            }
        };

        dispatch(&state, conn_id, &session_id, &outgoing_tx, action).await;
    }
}

async fn reply(outgoing_tx: &mpsc::Sender<WsOutbound>, frame: Value) {
    let _ = outgoing_tx.send(WsOutbound::Json(frame)).await;
}

async fn reply_error(
    outgoing_tx: &mpsc::Sender<WsOutbound>,
    err: &SessionError,
    action: &str,
    uuid: Option<&str>,
) {
    let frame = err.to_frame(Some(action), uuid);
    reply(outgoing_tx, frame).await;
}

/// Reopens a session's previously loaded project on reconnect, mirroring
/// `load_session`'s `send_project(..., 'project_load')` call. Failures are
/// logged, not surfaced as an error frame — the original silently `pass`es
/// on a `KeyError` here.
async fn send_project(
    state: &AppState,
    outgoing_tx: &mpsc::Sender<WsOutbound>,
    conn_id: Uuid,
    session_id: &str,
    project_uuid: &str,
) {
    let Ok(id) = ProjectId::from_str(project_uuid) else {
        return;
    };
    match state.project_service.load(id).await {
        Ok((project, _script)) => {
            state
                .registry
                .set_loaded_project(conn_id, session_id, project_uuid)
                .await;
            reply(outgoing_tx, json!({"type": "project", "value": project})).await;
        }
        Err(err) => {
            tracing::info!("could not reload previous project {project_uuid}: {err}");
        }
    }
}

fn parse_project_id(uuid: &str) -> Result<ProjectId, SessionError> {
    ProjectId::from_str(uuid).map_err(|_| SessionError::Decode(format!("not a uuid: {uuid}")))
}

fn parse_media_id(uuid: &str) -> Result<MediaId, SessionError> {
    MediaId::from_str(uuid).map_err(|_| SessionError::Decode(format!("not a uuid: {uuid}")))
}

/// Pulls `name`/`description` out of a saved script's `CuemsScript`
/// envelope, defaulting both — the cue-script grammar itself is out of
/// scope, so this core only needs what the project row stores.
fn project_fields(data: &Value) -> (String, String) {
    let script = data.get("CuemsScript");
    let name = script
        .and_then(|s| s.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("Untitled project")
        .to_string();
    let description = script
        .and_then(|s| s.get("description"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    (name, description)
}

/// `CuemsScript.unix_name` drives the on-disk project directory name for a
/// new project (`spec.md` §4.6/§8 Scenario 2); required, matching
/// `CuemsDBProject.new`'s `KeyError` on a missing `unix_name`.
fn project_unix_name_hint(data: &Value) -> Result<String, SessionError> {
    data.get("CuemsScript")
        .and_then(|s| s.get("unix_name"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| SessionError::Decode("missing CuemsScript.unix_name".into()))
}

fn script_from_value(data: &Value) -> cuems_core::script::CueScript {
    cuems_core::script::CueScript {
        raw: serde_json::to_vec(data).unwrap_or_default(),
    }
}

/// Dispatches one decoded action to the relevant service and queues the
/// reply/broadcast frames its Python counterpart in `CuemsWsUser` sends.
async fn dispatch(
    state: &AppState,
    conn_id: Uuid,
    session_id: &str,
    outgoing_tx: &mpsc::Sender<WsOutbound>,
    action: Action,
) {
    let tag = action.tag().to_string();
    match action {
        Action::ProjectList => match state.project_service.list(false).await {
            Ok(list) => reply(outgoing_tx, json!({"type": tag, "value": list})).await,
            Err(e) => reply_error(outgoing_tx, &e.into(), &tag, None).await,
        },
        Action::ProjectTrashList => match state.project_service.list(true).await {
            Ok(list) => reply(outgoing_tx, json!({"type": tag, "value": list})).await,
            Err(e) => reply_error(outgoing_tx, &e.into(), &tag, None).await,
        },
        Action::ProjectLoad { uuid } => match parse_project_id(&uuid) {
            Ok(id) => match state.project_service.load(id).await {
                Ok((project, _script)) => {
                    state.registry.set_loaded_project(conn_id, session_id, &uuid).await;
                    reply(outgoing_tx, json!({"type": "project", "value": project})).await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::ProjectSave { data } => {
            let existing_uuid = data
                .get("CuemsScript")
                .and_then(|s| s.get("uuid"))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let (name, description) = project_fields(&data);
            let script = script_from_value(&data);

            let result: Result<String, SessionError> = match &existing_uuid {
                Some(uuid) => match parse_project_id(uuid) {
                    Ok(id) => state
                        .project_service
                        .update(id, &name, &description, script)
                        .await
                        .map(|p| p.id.to_string())
                        .map_err(SessionError::from),
                    Err(e) => Err(e),
                },
                None => match project_unix_name_hint(&data) {
                    Ok(unix_name_hint) => state
                        .project_service
                        .new_project(&name, &description, &unix_name_hint, script)
                        .await
                        .map(|p| p.id.to_string())
                        .map_err(SessionError::from),
                    Err(e) => Err(e),
                },
            };

            match result {
                Ok(project_uuid) => {
                    state.registry.set_loaded_project(conn_id, session_id, &project_uuid).await;
                    reply(outgoing_tx, json!({"type": tag, "value": project_uuid})).await;
                    state.registry.notify_others_list_changes(conn_id, "project_list").await;
                    state.registry.notify_others_same_project(conn_id, &project_uuid).await;
                }
                Err(e) => reply_error(outgoing_tx, &e, "project_save", existing_uuid.as_deref()).await,
            }
        }
        Action::ProjectDuplicate { uuid } => match parse_project_id(&uuid) {
            Ok(id) => match state.project_service.duplicate(id).await {
                Ok(_new_project) => {
                    reply(outgoing_tx, json!({"type": tag, "value": uuid})).await;
                    state.registry.notify_others_list_changes(conn_id, "project_list").await;
                    state.registry.notify_others_list_changes(conn_id, "file_list").await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::ProjectDelete { uuid } => match parse_project_id(&uuid) {
            Ok(id) => match state.project_service.delete(id).await {
                Ok(()) => {
                    reply(outgoing_tx, json!({"type": tag, "value": uuid})).await;
                    state.registry.notify_others_same_project(conn_id, &uuid).await;
                    state.registry.notify_others_list_changes(conn_id, "project_list").await;
                    state.registry.notify_others_list_changes(conn_id, "project_trash_list").await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::ProjectRestore { uuid } => match parse_project_id(&uuid) {
            Ok(id) => match state.project_service.restore(id).await {
                Ok(()) => {
                    reply(outgoing_tx, json!({"type": tag, "value": uuid})).await;
                    state.registry.notify_others_list_changes(conn_id, "project_list").await;
                    state.registry.notify_others_list_changes(conn_id, "project_trash_list").await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::ProjectTrashDelete { uuid } => match parse_project_id(&uuid) {
            Ok(id) => match state.project_service.purge(id).await {
                Ok(()) => {
                    reply(outgoing_tx, json!({"type": tag, "value": uuid})).await;
                    state.registry.notify_others_list_changes(conn_id, "project_trash_list").await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::FileList => match state.media_service.list(false).await {
            Ok(list) => reply(outgoing_tx, json!({"type": tag, "value": list})).await,
            Err(e) => reply_error(outgoing_tx, &e.into(), &tag, None).await,
        },
        Action::FileTrashList => match state.media_service.list(true).await {
            Ok(list) => reply(outgoing_tx, json!({"type": tag, "value": list})).await,
            Err(e) => reply_error(outgoing_tx, &e.into(), &tag, None).await,
        },
        Action::FileSave { uuid, data } => match parse_media_id(&uuid) {
            Ok(id) => {
                let name = data.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                let description = data.get("description").and_then(|v| v.as_str()).unwrap_or_default();
                match state.media_service.update_metadata(id, name, description).await {
                    Ok(_media) => reply(outgoing_tx, json!({"type": tag, "value": uuid})).await,
                    Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
                }
            }
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::FileLoadMeta { uuid } => match parse_media_id(&uuid) {
            Ok(id) => match state.media_service.load_meta(id).await {
                Ok((media, projects)) => {
                    reply(outgoing_tx, json!({"type": tag, "value": {"media": media, "projects": projects}})).await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::FileLoadThumbnail { uuid } => match parse_media_id(&uuid) {
            Ok(id) => match state.media_service.load_thumbnail(id).await {
                Ok(bytes) => {
                    let _ = outgoing_tx.send(WsOutbound::Binary(bytes)).await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::FileLoadWaveform { uuid } => match parse_media_id(&uuid) {
            Ok(id) => match state.media_service.load_waveform(id).await {
                Ok(bytes) => {
                    let _ = outgoing_tx.send(WsOutbound::Binary(bytes)).await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::FileDelete { uuid } => match parse_media_id(&uuid) {
            Ok(id) => match state.media_service.delete(id).await {
                Ok(()) => {
                    reply(outgoing_tx, json!({"type": tag, "value": uuid})).await;
                    state.registry.notify_others_list_changes(conn_id, "file_list").await;
                    state.registry.notify_others_list_changes(conn_id, "file_trash_list").await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::FileRestore { uuid } => match parse_media_id(&uuid) {
            Ok(id) => match state.media_service.restore(id).await {
                Ok(()) => {
                    reply(outgoing_tx, json!({"type": tag, "value": uuid})).await;
                    state.registry.notify_others_list_changes(conn_id, "file_list").await;
                    state.registry.notify_others_list_changes(conn_id, "file_trash_list").await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::FileTrashDelete { uuid } => match parse_media_id(&uuid) {
            Ok(id) => match state.media_service.purge(id).await {
                Ok(()) => {
                    reply(outgoing_tx, json!({"type": tag, "value": uuid})).await;
                    state.registry.notify_others_list_changes(conn_id, "file_trash_list").await;
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::ProjectReady { uuid } => match parse_project_id(&uuid) {
            Ok(id) => match state.project_service.load(id).await {
                Ok((project, _script)) => {
                    match state.engine.call("load_project", Some(json!(project.unix_name))).await {
                        Ok(_value) => {
                            reply(outgoing_tx, json!({"type": tag, "value": format!("project_ready:{uuid}")})).await;
                        }
                        Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
                    }
                }
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            },
            Err(e) => reply_error(outgoing_tx, &e, &tag, Some(&uuid)).await,
        },
        Action::ProjectDeploy { uuid } => {
            match state.engine.call("project_deploy", Some(json!(uuid))).await {
                Ok(value) => reply(outgoing_tx, json!({"type": tag, "value": value})).await,
                Err(e) => reply_error(outgoing_tx, &e.into(), &tag, Some(&uuid)).await,
            }
        }
        Action::HwDiscovery => match state.engine.call("hw_discovery", None).await {
            Ok(value) => reply(outgoing_tx, json!({"type": tag, "value": value})).await,
            Err(e) => reply_error(outgoing_tx, &e.into(), &tag, None).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_project_id_rejects_non_uuid() {
        assert!(matches!(parse_project_id("not-a-uuid"), Err(SessionError::Decode(_))));
    }

    #[test]
    fn parse_media_id_accepts_a_real_uuid() {
        let uuid = Uuid::new_v4().to_string();
        assert!(parse_media_id(&uuid).is_ok());
    }

    #[test]
    fn project_fields_reads_name_and_description_from_the_script_envelope() {
        let data = json!({"CuemsScript": {"name": "My Show", "description": "opening night"}});
        let (name, description) = project_fields(&data);
        assert_eq!(name, "My Show");
        assert_eq!(description, "opening night");
    }

    #[test]
    fn project_fields_defaults_when_the_script_envelope_is_absent() {
        let (name, description) = project_fields(&json!({}));
        assert_eq!(name, "Untitled project");
        assert_eq!(description, "");
    }

    #[test]
    fn script_from_value_round_trips_through_json_bytes() {
        let data = json!({"CuemsScript": {"name": "x"}});
        let script = script_from_value(&data);
        let decoded: Value = serde_json::from_slice(&script.raw).unwrap();
        assert_eq!(decoded, data);
    }
}
