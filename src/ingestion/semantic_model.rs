//! Loading and canonical rendering of YAML semantic models.
//!
//! The knowledge base is built from YAML files describing a warehouse schema
//! (tables, joins, measures). Parsing and re-dumping through a YAML value
//! gives every ingestion run the same canonical text regardless of the
//! source file's formatting quirks, which keeps chunking reproducible.

use std::path::Path;

use crate::types::QuerysmithError;

/// A parsed semantic model ready for chunking.
#[derive(Clone, Debug, PartialEq)]
pub struct SemanticModel {
    document_id: String,
    value: serde_yaml_ng::Value,
}

impl SemanticModel {
    /// Parses YAML text under the given document id.
    pub fn from_yaml_str(
        document_id: impl Into<String>,
        yaml: &str,
    ) -> Result<Self, QuerysmithError> {
        let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(yaml)
            .map_err(|err| QuerysmithError::InvalidDocument(err.to_string()))?;
        if value.is_null() {
            return Err(QuerysmithError::InvalidDocument(
                "semantic model document is empty".into(),
            ));
        }
        Ok(Self {
            document_id: document_id.into(),
            value,
        })
    }

    /// Reads and parses a semantic model file. The document id is the file
    /// stem (`payments.yaml` → `payments`).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, QuerysmithError> {
        let path = path.as_ref();
        let document_id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                QuerysmithError::InvalidDocument(format!(
                    "cannot derive a document id from path '{}'",
                    path.display()
                ))
            })?
            .to_string();
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_yaml_str(document_id, &raw)
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Renders the model back to YAML in canonical form.
    pub fn canonical_text(&self) -> Result<String, QuerysmithError> {
        serde_yaml_ng::to_string(&self.value)
            .map_err(|err| QuerysmithError::InvalidDocument(err.to_string()))
    }
}
