use std::fmt;

/// Failure taxonomy for the collaborative editing core.
///
/// Nothing here is fatal to the process; every variant is scoped to the
/// request (and connection) that produced it.
#[derive(Debug)]
pub enum SyncError {
    /// View/edit denied for an otherwise well-formed request. Reported to the
    /// sender only; no state change.
    Permission(String),
    /// Document no longer exists; the requester's session for it is torn down.
    NotFound(String),
    /// Malformed operation (out-of-range position, empty payload). Rejected
    /// before or at the head of the apply queue, never silently dropped.
    Validation(String),
    /// External store failure during apply. The version is not advanced and
    /// nothing is broadcast; reported to the sender as transient.
    Persistence(String),
    /// The per-document apply queue went away mid-request. Transient.
    Closed,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Permission(msg) => write!(f, "permission denied: {}", msg),
            SyncError::NotFound(msg) => write!(f, "not found: {}", msg),
            SyncError::Validation(msg) => write!(f, "invalid operation: {}", msg),
            SyncError::Persistence(msg) => write!(f, "persistence failure: {}", msg),
            SyncError::Closed => write!(f, "document apply queue closed"),
        }
    }
}

impl std::error::Error for SyncError {}
