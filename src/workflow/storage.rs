/// File persistence layer for the workflow document
///
/// Stores the flat `{nodes, edges, metadata}` blob as pretty-printed JSON.
/// Writes go to a sibling temp file first and are renamed into place.

use crate::workflow::document::WorkflowDocument;
use anyhow::Result;
use std::path::PathBuf;

/// JSON-file backed document storage
#[derive(Debug, Clone)]
pub struct DocumentStorage {
    /// Location of the document file
    path: PathBuf,
}

impl DocumentStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Persist the document, creating parent directories as needed
    pub async fn save(&self, document: &WorkflowDocument) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow::anyhow!("Failed to create document directory '{}': {}", parent.display(), e)
            })?;
        }

        let encoded = serde_json::to_vec_pretty(document)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, encoded).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        tracing::debug!("💾 Saved workflow document to {}", self.path.display());
        Ok(())
    }

    /// Load and validate the stored document; `None` if nothing was saved yet
    pub async fn load(&self) -> Result<Option<WorkflowDocument>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document = WorkflowDocument::import_str(&raw)
            .map_err(|e| anyhow::anyhow!("Stored document '{}' is invalid: {}", self.path.display(), e))?;

        tracing::info!("📥 Loaded workflow document with {} nodes and {} edges",
            document.nodes.len(), document.edges.len());
        Ok(Some(document))
    }
}
