//! Tenant-scoped adapter over the Qdrant vector index.

mod client;
mod filters;
mod payload;
mod types;

pub use client::QdrantIndex;
pub use filters::PointFilter;
pub use types::{ChunkPoint, DocumentGroup, QdrantError, ScoredPoint};
