//! Read and delete access to the documents held by the engine.

use crate::engine::{EngineHandle, HolderDocument};
use crate::error::HolderKitError;

/// Read and delete access to the documents held by the engine.
#[derive(Debug, Clone)]
pub struct DocumentCatalog {
    engine: EngineHandle,
}

impl DocumentCatalog {
    /// Creates a catalog over `engine`.
    #[must_use]
    pub const fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    /// Documents that finished issuance. Unsigned and deferred ones are left out.
    #[must_use]
    pub fn issued_documents(&self) -> Vec<HolderDocument> {
        self.engine
            .documents()
            .into_iter()
            .filter(HolderDocument::is_issued)
            .collect()
    }

    /// Looks up a document.
    ///
    /// # Errors
    ///
    /// [`HolderKitError::DocumentNotFound`] if the engine has no such document.
    pub fn document(&self, document_id: &str) -> Result<HolderDocument, HolderKitError> {
        self.engine
            .get_document_by_id(document_id)
            .ok_or_else(|| HolderKitError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    /// Deletes a document.
    ///
    /// # Errors
    ///
    /// - [`HolderKitError::DocumentNotFound`] if the engine has no such document.
    /// - [`HolderKitError::Engine`] if the engine failed to delete it.
    pub fn delete(&self, document_id: &str) -> Result<(), HolderKitError> {
        self.document(document_id)?;
        self.engine
            .delete_document_by_id(document_id)
            .map_err(|e| HolderKitError::engine("delete document", e))?;
        tracing::info!(document_id, "document deleted");
        Ok(())
    }
}
