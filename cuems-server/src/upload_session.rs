//! The `/upload` path's message loop: a single connection streams one
//! file in, chunk by chunk, verified by MD5 on completion. Grounded on
//! `original_source/CuemsUpload.py`'s `message_handler`/
//! `process_upload_message`/`process_upload_packet`/`upload_done` — the
//! `{"ready": true}` / `{"close": true}` / `{"error", "fatal"}` frame
//! shapes are carried over verbatim since the upload client already
//! speaks this protocol.

use axum::extract::ws::{Message, WebSocket};
use cuems_core::upload::UploadSession;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};

use crate::AppState;

pub async fn drive(mut socket: WebSocket, state: AppState) {
    let mut upload = UploadSession::new(state.tmp_upload_path.clone());

    loop {
        let message = match socket.next().await {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                tracing::debug!("upload socket read error: {err}");
                break;
            }
            None => break,
        };

        match message {
            Message::Text(text) => {
                let Ok(envelope) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                let Some(action) = envelope.get("action").and_then(|v| v.as_str()) else {
                    continue;
                };

                match action {
                    "upload" => {
                        let Some(file_info) = envelope.get("value") else { continue };
                        let name = file_info.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                        let size = file_info.get("size").and_then(|v| v.as_u64()).unwrap_or(0);

                        match upload.announce(name, size).await {
                            Ok(()) => send_json(&mut socket, json!({"ready": true})).await,
                            Err(err) => {
                                send_json(&mut socket, json!({"error": err.to_string(), "fatal": true})).await;
                            }
                        }
                    }
                    "finished" => {
                        let md5 = envelope.get("value").and_then(|v| v.as_str()).unwrap_or_default();
                        match upload.finish(md5).await {
                            Ok((path, original_name)) => {
                                match state.media_service.ingest(&path, &original_name).await {
                                    Ok(_media) => {
                                        send_json(&mut socket, json!({"close": true})).await;
                                        state.registry.notify_list_changes("file_list").await;
                                    }
                                    Err(err) => {
                                        tracing::warn!("upload ingest failed: {err}");
                                        send_json(&mut socket, json!({"error": "error saving file", "fatal": true})).await;
                                    }
                                }
                            }
                            Err(err) => {
                                tracing::warn!("upload finish failed: {err}");
                                send_json(&mut socket, json!({"error": "error saving file", "fatal": true})).await;
                            }
                        }
                        break;
                    }
                    _ => {}
                }
            }
            Message::Binary(chunk) => match upload.write_chunk(&chunk).await {
                Ok(()) => send_json(&mut socket, json!({"ready": true})).await,
                Err(err) => {
                    send_json(&mut socket, json!({"error": err.to_string(), "fatal": true})).await;
                    break;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
}

async fn send_json(socket: &mut WebSocket, value: Value) {
    let _ = socket.send(Message::Text(value.to_string().into())).await;
}
