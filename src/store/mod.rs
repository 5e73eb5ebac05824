pub mod memory;

use async_trait::async_trait;
use std::fmt;

use crate::models::Document;

pub use memory::InMemoryDocumentStore;

/// Failure of the external document store.
#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "document store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Narrow seam to the external persistence collaborator.
///
/// Assumed strongly consistent for a single document within this process:
/// a `find_document` after a confirmed `save_document` observes the saved
/// state. The core never talks to storage through any other interface.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_document(&self, id: &str) -> Result<Option<Document>, StoreError>;
    async fn save_document(&self, document: &Document) -> Result<Document, StoreError>;
}
