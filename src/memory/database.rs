//! In-memory document database.

use crate::documents::DocumentStore;
use crate::error::{ProbeError, Result};
use crate::ids::{IdGenerator, RandomIds};
use crate::types::{DocumentId, DocumentRef, FieldFilter, Fields, Snapshot};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

type Collection = BTreeMap<DocumentId, Fields>;

/// Collections of JSON documents held in memory.
pub struct MemoryDatabase {
    /// Documents by collection name, then by id.
    collections: RwLock<BTreeMap<String, Collection>>,
    /// Source of document ids.
    ids: Arc<dyn IdGenerator>,
}

impl MemoryDatabase {
    /// Create an empty database with random document ids.
    pub fn new() -> Self {
        Self::with_ids(Arc::new(RandomIds))
    }

    /// Create an empty database drawing document ids from `ids`.
    pub fn with_ids(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            ids,
        }
    }

    /// Ids of the documents in `collection` that satisfy `filter`.
    pub fn matching(&self, collection: &str, filter: &FieldFilter) -> Snapshot {
        self.collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| filter.matches(fields))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fields of one document, if it exists.
    pub fn get(&self, doc: &DocumentRef) -> Option<Fields> {
        self.collections
            .read()
            .get(&doc.collection)
            .and_then(|docs| docs.get(&doc.id))
            .cloned()
    }

    /// Number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryDatabase {
    fn create_documents(
        &self,
        collection: &str,
        count: usize,
        fields: &Fields,
    ) -> Result<Vec<DocumentRef>> {
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let id = DocumentId(self.ids.next_id());
            if docs.contains_key(&id) {
                return Err(ProbeError::Store(format!(
                    "document already exists: {}/{}",
                    collection, id
                )));
            }
            docs.insert(id.clone(), fields.clone());
            created.push(DocumentRef::new(collection, id));
        }

        debug!(collection, count, "created documents");
        Ok(created)
    }

    fn delete_documents(&self, refs: &[DocumentRef]) -> Result<()> {
        let mut collections = self.collections.write();

        // Validate first so a bad reference deletes nothing.
        for doc in refs {
            let exists = collections
                .get(&doc.collection)
                .is_some_and(|docs| docs.contains_key(&doc.id));
            if !exists {
                return Err(ProbeError::Store(format!(
                    "document not found: {}",
                    doc.path()
                )));
            }
        }

        for doc in refs {
            if let Some(docs) = collections.get_mut(&doc.collection) {
                docs.remove(&doc.id);
            }
        }

        debug!(count = refs.len(), "deleted documents");
        Ok(())
    }
}
