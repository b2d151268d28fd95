//! The document store collaborator.

use crate::error::Result;
use crate::types::{DocumentRef, Fields};

/// Creates and deletes documents on the backend the watch channel observes.
pub trait DocumentStore: Send + Sync {
    /// Create `count` documents in `collection`, each with `fields`.
    ///
    /// Returns the new documents' references in creation order.
    fn create_documents(
        &self,
        collection: &str,
        count: usize,
        fields: &Fields,
    ) -> Result<Vec<DocumentRef>>;

    /// Delete the given documents.
    fn delete_documents(&self, refs: &[DocumentRef]) -> Result<()>;
}
