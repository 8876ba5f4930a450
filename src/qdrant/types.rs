//! Shared types used by the vector index adapter.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with the vector index.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// An operation was attempted without a tenant identifier.
    ///
    /// Tenant isolation is enforced here, not by callers; a blank tenant is
    /// a programming error, never an implicit "all tenants" query.
    #[error("vector index operation requires a tenant identifier")]
    MissingTenant,
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The index responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Prepared chunk ready for indexing: text, optional region label, vector.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Chunk text stored in the point payload.
    pub text: String,
    /// Region label the chunk was derived from, if any.
    pub label: Option<String>,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
}

/// Scored payload returned by index queries.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Identifier assigned to the point.
    pub id: String,
    /// Similarity score computed by the index.
    pub score: f32,
    /// Payload stored alongside the point, if requested.
    pub payload: Option<Map<String, Value>>,
}

/// Best hits for one distinct document returned by a grouped query.
#[derive(Debug, Clone)]
pub struct DocumentGroup {
    /// The `document_id` payload value the group was keyed on.
    pub document_id: i64,
    /// Up to `group_size` best-scoring points of this document.
    pub hits: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

impl QueryResponseResult {
    pub(crate) fn into_points(self) -> Vec<QueryPoint> {
        match self {
            Self::Points(points) => points,
            Self::Object { points } => points,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    #[serde(default)]
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct GroupsResponse {
    pub(crate) result: GroupsResult,
}

#[derive(Deserialize)]
pub(crate) struct GroupsResult {
    #[serde(default)]
    pub(crate) groups: Vec<GroupEntry>,
}

#[derive(Deserialize)]
pub(crate) struct GroupEntry {
    pub(crate) id: Value,
    #[serde(default)]
    pub(crate) hits: Vec<QueryPoint>,
}
