#![deny(missing_docs)]

//! Core library for the docshelf document ingestion and retrieval server.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Document lifecycle, chunking, and retrieval.
pub mod documents;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Layout-analysis extraction client and report model.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and search metrics helpers.
pub mod metrics;
/// Qdrant vector index integration.
pub mod qdrant;
/// Blob and relational record storage.
pub mod storage;
