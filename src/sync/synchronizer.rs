use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ServerEvent, TextOperation};
use crate::store::DocumentStore;
use crate::sync::access;
use crate::sync::broadcast::OperationBroadcaster;
use crate::sync::error::SyncError;

const APPLY_QUEUE_CAPACITY: usize = 64;

/// Authoritative outcome of a successfully applied operation.
#[derive(Debug, Clone)]
pub struct AppliedOperation {
    pub content: String,
    /// Server-assigned sequence number; equals the resulting document version.
    pub version: u64,
}

struct ApplyJob {
    user_id: String,
    user_name: String,
    connection_id: Uuid,
    op: TextOperation,
    timestamp: Option<DateTime<Utc>>,
    reply: oneshot::Sender<Result<AppliedOperation, SyncError>>,
}

/// Owns canonical content and version for every active document.
///
/// One apply worker per document, created lazily on first use and retired
/// when the room empties. All mutations of a document flow through its
/// worker's FIFO queue, so concurrent submissions for the same document are
/// applied strictly in server-arrival order while unrelated documents proceed
/// in parallel. The worker broadcasts each applied operation before replying,
/// which makes per-recipient delivery order match apply order.
pub struct DocSynchronizer {
    store: Arc<dyn DocumentStore>,
    broadcaster: Arc<OperationBroadcaster>,
    workers: Mutex<HashMap<String, mpsc::Sender<ApplyJob>>>,
}

impl DocSynchronizer {
    pub fn new(store: Arc<dyn DocumentStore>, broadcaster: Arc<OperationBroadcaster>) -> Self {
        Self {
            store,
            broadcaster,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Queue an operation for a document and await its authoritative outcome.
    ///
    /// May suspend while waiting for the queue position and the store write;
    /// callers must not block their accept path on it. A caller that goes
    /// away mid-apply does not abort the apply: the operation completes and
    /// is broadcast, only the reply is dropped.
    pub async fn apply_operation(
        &self,
        document_id: &str,
        user_id: &str,
        user_name: &str,
        connection_id: Uuid,
        op: TextOperation,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<AppliedOperation, SyncError> {
        op.validate()?;

        let tx = self.worker_for(document_id).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = ApplyJob {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            connection_id,
            op,
            timestamp,
            reply: reply_tx,
        };
        tx.send(job).await.map_err(|_| SyncError::Closed)?;
        reply_rx.await.map_err(|_| SyncError::Closed)?
    }

    /// Retire a document's worker once its room has emptied. Jobs already
    /// queued still drain; the worker exits when the last sender is gone.
    pub async fn retire(&self, document_id: &str) {
        let mut workers = self.workers.lock().await;
        if workers.remove(document_id).is_some() {
            debug!("retired apply worker for document {}", document_id);
        }
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    async fn worker_for(&self, document_id: &str) -> mpsc::Sender<ApplyJob> {
        let mut workers = self.workers.lock().await;
        if let Some(tx) = workers.get(document_id) {
            if !tx.is_closed() {
                return tx.clone();
            }
        }

        let (tx, rx) = mpsc::channel(APPLY_QUEUE_CAPACITY);
        let store = self.store.clone();
        let broadcaster = self.broadcaster.clone();
        let doc_id = document_id.to_string();
        tokio::spawn(run_apply_worker(doc_id, store, broadcaster, rx));
        workers.insert(document_id.to_string(), tx.clone());
        tx
    }
}

async fn run_apply_worker(
    document_id: String,
    store: Arc<dyn DocumentStore>,
    broadcaster: Arc<OperationBroadcaster>,
    mut rx: mpsc::Receiver<ApplyJob>,
) {
    debug!("apply worker started for document {}", document_id);
    while let Some(job) = rx.recv().await {
        let result = apply_one(store.as_ref(), &document_id, &job).await;
        if let Ok(applied) = &result {
            // Broadcast before replying: room delivery order tracks apply
            // order. The originating connection is excluded from the echo.
            broadcaster
                .relay(
                    &document_id,
                    Some(job.connection_id),
                    ServerEvent::DocumentUpdated {
                        document_id: document_id.clone(),
                        operation: job.op.clone(),
                        user_id: job.user_id.clone(),
                        user_name: job.user_name.clone(),
                        version: applied.version,
                        timestamp: job.timestamp,
                    },
                )
                .await;
        }
        if job.reply.send(result).is_err() {
            // Caller disconnected mid-apply; the effect above stands.
            warn!(
                "dropping apply reply for document {}: caller went away",
                document_id
            );
        }
    }
    debug!("apply worker stopped for document {}", document_id);
}

async fn apply_one(
    store: &dyn DocumentStore,
    document_id: &str,
    job: &ApplyJob,
) -> Result<AppliedOperation, SyncError> {
    let mut document = store
        .find_document(document_id)
        .await
        .map_err(|e| SyncError::Persistence(e.to_string()))?
        .ok_or_else(|| SyncError::NotFound(format!("document '{}' not found", document_id)))?;

    if !access::can_edit(&document, &job.user_id) {
        return Err(SyncError::Permission(
            "you do not have permission to edit this document".to_string(),
        ));
    }

    // Positions resolve against current canonical content at dequeue time.
    document.content = job.op.apply_to(&document.content)?;
    document.version += 1;
    document.last_modified = Utc::now();

    // The version advances only once the store confirms the write.
    let saved = store
        .save_document(&document)
        .await
        .map_err(|e| SyncError::Persistence(e.to_string()))?;

    Ok(AppliedOperation {
        content: saved.content,
        version: saved.version,
    })
}
