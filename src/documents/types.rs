//! Records, status machine, and error taxonomy for the document lifecycle.

use thiserror::Error;

use crate::documents::chunking::ChunkingError;
use crate::embedding::EmbeddingClientError;
use crate::extraction::ExtractionError;
use crate::qdrant::QdrantError;
use crate::storage::{BlobError, StoreError};

/// Processing state of one uploaded document.
///
/// The set of legal transitions is closed; anything outside
/// [`DocumentStatus::can_transition_to`] is rejected with a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Stored, not yet processed.
    Uploaded,
    /// A processing run currently owns the document.
    Processing,
    /// Extraction artifact indexed; searchable.
    Processed,
    /// The last processing run failed; retry allowed.
    ProcessingFailed,
}

impl DocumentStatus {
    /// Stable string form persisted in the relational store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "UPLOADED",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::ProcessingFailed => "PROCESSING_FAILED",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UPLOADED" => Some(Self::Uploaded),
            "PROCESSING" => Some(Self::Processing),
            "PROCESSED" => Some(Self::Processed),
            "PROCESSING_FAILED" => Some(Self::ProcessingFailed),
            _ => None,
        }
    }

    /// Whether the transition `self -> next` is in the lifecycle table.
    ///
    /// `Processed -> Processing` re-embeds from the cached report;
    /// `ProcessingFailed -> Processing` retries from scratch.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uploaded, Self::Processing)
                | (Self::Processing, Self::Processed)
                | (Self::Processing, Self::ProcessingFailed)
                | (Self::Processed, Self::Processing)
                | (Self::ProcessingFailed, Self::Processing)
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded document as persisted in the relational store.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Row identifier.
    pub id: i64,
    /// Identifier of the owning user; never changes after creation.
    pub owner_id: i64,
    /// Display name, extension stripped.
    pub name: String,
    /// Current lifecycle status.
    pub status: DocumentStatus,
    /// System-wide unique blob key fragment (UUID).
    pub storage_key: String,
    /// Mime subtype recorded at upload (for example `pdf`).
    pub content_type: String,
    /// Linked extraction artifact, if one has been produced.
    pub report_id: Option<i64>,
}

/// The extraction artifact record linked 1:1 to a document.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    /// Row identifier.
    pub id: i64,
    /// Owning document.
    pub document_id: i64,
    /// System-wide unique blob key fragment (UUID).
    pub storage_key: String,
}

/// Authenticated caller identity attached to every request.
///
/// Session issuance is an external collaborator; the identity arrives fully
/// resolved and doubles as the tenant for vector-index isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    /// Relational identifier of the user.
    pub user_id: i64,
}

impl UserIdentity {
    /// Tenant key stored in and required by every vector-index operation.
    pub fn tenant(&self) -> String {
        self.user_id.to_string()
    }
}

/// Caller-facing failure taxonomy for document operations.
///
/// Internal detail behind [`DocumentError::ProcessingFailed`] and
/// [`DocumentError::Internal`] is logged, never returned.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The request payload is unusable; rejected before any state mutation.
    #[error("invalid upload: {0}")]
    Validation(String),
    /// The caller does not own the target document.
    #[error("document does not belong to the caller")]
    Forbidden,
    /// No document with the given identifier exists.
    #[error("document not found")]
    NotFound,
    /// The requested mutation conflicts with the document's current state.
    #[error("{0}")]
    Conflict(&'static str),
    /// A processing run failed after it had started.
    #[error("document processing failed")]
    ProcessingFailed,
    /// A storage or index backend failed outside a processing run.
    #[error("internal storage failure")]
    Internal,
}

/// Everything that can interrupt an in-flight processing run.
///
/// Converted to [`DocumentError::ProcessingFailed`] at the lifecycle boundary;
/// the variant detail exists for logs only.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Layout-analysis call failed.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Chunk geometry was rejected.
    #[error("chunking failed: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding runtime failed or returned malformed output.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding did not complete within the configured budget.
    #[error("embedding timed out after {0} seconds")]
    EmbeddingTimeout(u64),
    /// Vector index interaction failed.
    #[error("vector index request failed: {0}")]
    Index(#[from] QdrantError),
    /// Blob store interaction failed.
    #[error("blob store failure: {0}")]
    Blob(#[from] BlobError),
    /// Relational store interaction failed.
    #[error("record store failure: {0}")]
    Records(#[from] StoreError),
    /// Stored state contradicts itself, e.g. a linked report with no artifact.
    #[error("consistency failure: {0}")]
    Consistency(String),
}

/// Result of one completed processing run.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOutcome {
    /// Number of chunks embedded and indexed for the document.
    pub chunks_indexed: usize,
}

/// One entry of a paged document listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentSummary {
    /// Document identifier.
    pub id: i64,
    /// Download file name (`<name>.<subtype>`).
    pub key: String,
    /// Current lifecycle status.
    pub status: DocumentStatus,
    /// Time-limited download URL.
    pub url: String,
}

/// Paged listing of a caller's documents.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentPage {
    /// Requested page, 1-based.
    pub page: usize,
    /// Requested page size.
    pub page_size: usize,
    /// Total documents owned by the caller.
    pub total_items: usize,
    /// Entries of this page.
    pub documents: Vec<DocumentSummary>,
}

/// Best match for one distinct document returned by a search.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchMatch {
    /// Identifier of the matched document.
    pub document_id: i64,
    /// Similarity score of the document's best-scoring chunk.
    pub score: f32,
    /// Text of the best-scoring chunk.
    pub text: Option<String>,
    /// Region label the chunk was indexed under, if any.
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_is_closed() {
        use DocumentStatus::*;
        let allowed = [
            (Uploaded, Processing),
            (Processing, Processed),
            (Processing, ProcessingFailed),
            (Processed, Processing),
            (ProcessingFailed, Processing),
        ];
        for from in [Uploaded, Processing, Processed, ProcessingFailed] {
            for to in [Uploaded, Processing, Processed, ProcessingFailed] {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn status_round_trips_through_persisted_form() {
        use DocumentStatus::*;
        for status in [Uploaded, Processing, Processed, ProcessingFailed] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn tenant_is_derived_from_user_id() {
        let identity = UserIdentity { user_id: 42 };
        assert_eq!(identity.tenant(), "42");
    }
}
