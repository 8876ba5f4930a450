//! The document processing and retrieval core.

/// Text normalization and sliding-window chunking.
pub mod chunking;
mod service;
mod types;

pub use chunking::{ChunkingError, chunk_text, normalize_text};
pub use service::{DocumentApi, DocumentService};
pub use types::{
    DocumentError, DocumentPage, DocumentRecord, DocumentStatus, DocumentSummary, PipelineError,
    ProcessOutcome, ReportRecord, SearchMatch, UserIdentity,
};
