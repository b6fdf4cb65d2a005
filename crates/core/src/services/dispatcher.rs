//! Upload dispatcher.
//!
//! Turns inbound upload events into forward requests. Events of different
//! users are processed in parallel; events of one user are processed in the
//! order they arrived.

use std::collections::HashMap;
use std::sync::Arc;

use reelcap_common::{AppResult, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::forward::ForwardService;
use super::progression::{ForwardRequest, ProgressionEngine};

/// An uploaded file waiting to be captioned and forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEvent {
    pub user_id: UserId,
    /// Opaque media handle from the transport.
    pub file_ref: String,
}

/// The latest dispatched upload of one user.
struct Pending {
    /// Fires once the upload has passed through the engine.
    applied: oneshot::Receiver<()>,
    /// Completes once the upload has also been forwarded or rejected.
    task: JoinHandle<()>,
}

/// Runs the engine for each upload and hands the result to the sink.
///
/// A user's next upload enters the engine as soon as the previous one has
/// been applied. Sends are still made in arrival order, but a slow send
/// does not hold back progression.
pub struct UploadDispatcher {
    engine: Arc<ProgressionEngine>,
    sink: ForwardService,
    pending: HashMap<UserId, Pending>,
}

impl UploadDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(engine: Arc<ProgressionEngine>, sink: ForwardService) -> Self {
        Self {
            engine,
            sink,
            pending: HashMap::new(),
        }
    }

    /// Start processing `event` after the user's earlier uploads.
    pub fn dispatch(&mut self, event: UploadEvent) {
        self.pending.retain(|_, pending| !pending.task.is_finished());

        let previous = self.pending.remove(&event.user_id);
        let user_id = event.user_id;
        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);
        let (applied_tx, applied) = oneshot::channel();

        let task = tokio::spawn(async move {
            let previous_task = match previous {
                Some(Pending { applied, task }) => {
                    // A dropped sender means the previous task ended early.
                    let _ = applied.await;
                    Some(task)
                }
                None => None,
            };

            let outcome = engine
                .handle_upload(event.user_id, event.file_ref.clone())
                .await;
            let _ = applied_tx.send(());

            if let Some(previous_task) = previous_task {
                if let Err(e) = previous_task.await {
                    tracing::error!(user_id = %user_id, error = %e, "Previous upload task failed");
                }
            }
            deliver(&sink, event, outcome).await;
        });
        self.pending.insert(user_id, Pending { applied, task });
    }

    /// Dispatch events until the channel closes, then wait for in-flight uploads.
    pub async fn run(mut self, mut events: mpsc::Receiver<UploadEvent>) {
        tracing::info!("Upload dispatcher started");
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        self.drain().await;
        tracing::info!("Upload dispatcher stopped");
    }

    /// Wait for every dispatched upload to finish.
    pub async fn drain(&mut self) {
        for (user_id, pending) in self.pending.drain() {
            if let Err(e) = pending.task.await {
                tracing::error!(user_id = %user_id, error = %e, "Upload task failed");
            }
        }
    }

    /// Number of users with uploads that may still be running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

async fn deliver(sink: &ForwardService, event: UploadEvent, outcome: AppResult<ForwardRequest>) {
    match outcome {
        Ok(request) => {
            if let Err(e) = sink.forward(&request).await {
                tracing::warn!(
                    user_id = %request.user_id,
                    target = %request.target_channel_id,
                    error = %e,
                    "Failed to forward upload"
                );
            }
        }
        Err(error) => {
            tracing::info!(
                user_id = %event.user_id,
                code = error.error_code(),
                error = %error,
                "Upload denied"
            );
            if let Err(e) = sink.reject(&event, &error).await {
                tracing::warn!(user_id = %event.user_id, error = %e, "Failed to report denied upload");
            }
        }
    }
}
