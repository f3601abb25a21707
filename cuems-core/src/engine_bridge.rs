//! Request/response correlation with the external playback engine over two
//! queues. Has no `original_source` counterpart — the original system has
//! no engine RPC layer at all — so this is built directly from the
//! request/response shape, polling cadence, and timeout described for the
//! external interface, using the teacher's tokio channel/task idioms.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct EngineRequest {
    pub action: String,
    pub action_uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineResponse {
    pub action_uuid: Uuid,
    pub status: String,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Correlates outbound requests to the engine with its responses. A
/// single background task drains the response channel into a shared map;
/// callers poll that map for their `action_uuid` at a fixed interval up
/// to a timeout. `outstanding` tracks which `action_uuid`s a caller is
/// still actively waiting on, so the drain task can drop a response that
/// arrives after its caller has already timed out instead of letting
/// `pending` grow unbounded with orphaned entries (`spec.md` §8 Scenario
/// 4: "the orphan response, if it arrives later, is drained and
/// ignored").
pub struct EngineBridge {
    requests_tx: mpsc::Sender<EngineRequest>,
    pending: Arc<Mutex<HashMap<Uuid, EngineResponse>>>,
    outstanding: Arc<Mutex<HashSet<Uuid>>>,
    poll_interval: Duration,
    timeout: Duration,
}

impl EngineBridge {
    /// Spawns the drain task and returns the bridge handle plus the
    /// request-sending half the caller wires to the engine's inbound
    /// queue.
    pub fn spawn(
        request_queue_capacity: usize,
        mut responses_rx: mpsc::Receiver<EngineResponse>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> (Self, mpsc::Receiver<EngineRequest>) {
        let (requests_tx, requests_rx) = mpsc::channel(request_queue_capacity);
        let pending = Arc::new(Mutex::new(HashMap::new()));
        let outstanding = Arc::new(Mutex::new(HashSet::new()));

        let pending_for_task = pending.clone();
        let outstanding_for_task = outstanding.clone();
        tokio::spawn(async move {
            while let Some(response) = responses_rx.recv().await {
                let still_outstanding = outstanding_for_task.lock().await.remove(&response.action_uuid);
                if still_outstanding {
                    pending_for_task.lock().await.insert(response.action_uuid, response);
                }
            }
        });

        (
            Self {
                requests_tx,
                pending,
                outstanding,
                poll_interval,
                timeout,
            },
            requests_rx,
        )
    }

    /// Sends a request and polls for its matching response, returning the
    /// response's `value` on an `"OK"` status. Any other status, or no
    /// response within the timeout, is an `Engine`/`EngineTimeout` error.
    pub async fn call(&self, action: &str, value: Option<Value>) -> Result<Option<Value>> {
        let action_uuid = Uuid::new_v4();
        let request = EngineRequest {
            action: action.to_string(),
            action_uuid,
            value,
        };

        self.outstanding.lock().await.insert(action_uuid);

        if self.requests_tx.send(request).await.is_err() {
            self.outstanding.lock().await.remove(&action_uuid);
            return Err(CoreError::Engine("engine request queue closed".into()));
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if let Some(response) = self.pending.lock().await.remove(&action_uuid) {
                return if response.status.eq_ignore_ascii_case("ok") {
                    Ok(response.value)
                } else {
                    Err(CoreError::Engine(format!(
                        "engine returned status {:?} for action {action}",
                        response.status
                    )))
                };
            }

            if tokio::time::Instant::now() >= deadline {
                self.outstanding.lock().await.remove(&action_uuid);
                return Err(CoreError::EngineTimeout(self.timeout));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_returns_value_on_ok_response() {
        let (responses_tx, responses_rx) = mpsc::channel(8);
        let (bridge, mut requests_rx) =
            EngineBridge::spawn(8, responses_rx, Duration::from_millis(5), Duration::from_secs(1));

        tokio::spawn(async move {
            let req = requests_rx.recv().await.unwrap();
            responses_tx
                .send(EngineResponse {
                    action_uuid: req.action_uuid,
                    status: "OK".into(),
                    value: Some(serde_json::json!({"ready": true})),
                })
                .await
                .unwrap();
        });

        let value = bridge.call("project_ready", None).await.unwrap();
        assert_eq!(value, Some(serde_json::json!({"ready": true})));
    }

    #[tokio::test]
    async fn call_times_out_without_a_response() {
        let (_responses_tx, responses_rx) = mpsc::channel(8);
        let (bridge, _requests_rx) = EngineBridge::spawn(
            8,
            responses_rx,
            Duration::from_millis(5),
            Duration::from_millis(30),
        );

        let err = bridge.call("project_deploy", None).await.unwrap_err();
        assert!(matches!(err, CoreError::EngineTimeout(_)));
    }

    #[tokio::test]
    async fn non_ok_status_is_an_engine_error() {
        let (responses_tx, responses_rx) = mpsc::channel(8);
        let (bridge, mut requests_rx) =
            EngineBridge::spawn(8, responses_rx, Duration::from_millis(5), Duration::from_secs(1));

        tokio::spawn(async move {
            let req = requests_rx.recv().await.unwrap();
            responses_tx
                .send(EngineResponse {
                    action_uuid: req.action_uuid,
                    status: "ERROR".into(),
                    value: None,
                })
                .await
                .unwrap();
        });

        let err = bridge.call("hw_discovery", None).await.unwrap_err();
        assert!(matches!(err, CoreError::Engine(_)));
    }

    #[tokio::test]
    async fn a_late_response_after_timeout_does_not_accumulate_in_pending() {
        let (responses_tx, responses_rx) = mpsc::channel(8);
        let (bridge, mut requests_rx) = EngineBridge::spawn(
            8,
            responses_rx,
            Duration::from_millis(5),
            Duration::from_millis(20),
        );

        let err = bridge.call("project_deploy", None).await.unwrap_err();
        assert!(matches!(err, CoreError::EngineTimeout(_)));

        let req = requests_rx.recv().await.unwrap();
        responses_tx
            .send(EngineResponse {
                action_uuid: req.action_uuid,
                status: "OK".into(),
                value: None,
            })
            .await
            .unwrap();

        // give the drain task a chance to process the orphaned response
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(bridge.pending.lock().await.is_empty());
    }
}
