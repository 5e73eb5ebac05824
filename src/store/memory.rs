use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::Document;
use crate::store::{DocumentStore, StoreError};

/// In-memory document store, used as the composition-root default and by
/// tests. Real deployments substitute their own `DocumentStore`.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document. Metadata CRUD is outside the editing core; this is
    /// the hook composition and tests use to get documents into the store.
    pub async fn insert(&self, document: Document) {
        let mut documents = self.documents.write().await;
        documents.insert(document.id.clone(), document);
    }

    pub async fn remove(&self, id: &str) -> Option<Document> {
        let mut documents = self.documents.write().await;
        documents.remove(id)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.get(id).cloned())
    }

    async fn save_document(&self, document: &Document) -> Result<Document, StoreError> {
        let mut documents = self.documents.write().await;
        documents.insert(document.id.clone(), document.clone());
        Ok(document.clone())
    }
}
