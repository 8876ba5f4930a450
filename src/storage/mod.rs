//! Storage backends: blob objects and relational records.

mod blob;
mod records;

pub use blob::{BlobError, BlobStore, FsBlobStore, document_key, report_key};
pub use records::{RecordStore, StoreError};
