use std::sync::Arc;
use uuid::Uuid;

use crate::models::ServerEvent;
use crate::sync::registry::{Outbound, SessionRegistry};

/// Fans an event out to every session registered in a document's room,
/// optionally excluding the originating connection.
///
/// Delivery is best-effort and at-most-once. Per-recipient ordering follows
/// emission order: operation broadcasts are emitted synchronously inside the
/// per-document apply worker, so every recipient observes them in apply
/// order.
pub struct OperationBroadcaster {
    registry: Arc<SessionRegistry>,
}

impl OperationBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn relay(
        &self,
        document_id: &str,
        exclude_connection: Option<Uuid>,
        event: ServerEvent,
    ) {
        self.registry
            .publish(
                document_id,
                Outbound {
                    exclude: exclude_connection,
                    event,
                },
            )
            .await;
    }
}
