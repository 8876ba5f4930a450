//! HTTP surface for docshelf.
//!
//! A compact Axum router over the document service:
//!
//! - `POST /documents` – multipart upload of one PDF file.
//! - `GET /documents` – paged listing with presigned download URLs.
//! - `POST /documents/:id/process` – drive the processing pipeline.
//! - `DELETE /documents/:id` – cascade delete (points, report, blobs, record).
//! - `GET /search` – grouped semantic search over the caller's documents.
//! - `GET /blobs/*key` – presigned blob reads.
//! - `GET /metrics` – pipeline counters.
//!
//! Authentication is an external collaborator: callers arrive with a resolved
//! `x-user-id` header, which doubles as the vector-index tenant. Callers only
//! ever see coarse outcomes; failure detail stays in the logs.

use crate::config::get_config;
use crate::documents::{DocumentApi, DocumentError, DocumentPage, SearchMatch, UserIdentity};
use crate::metrics::MetricsSnapshot;
use axum::{
    Json, Router, async_trait,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the document API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DocumentApi + 'static,
{
    // Multipart framing adds overhead on top of the configured file cap.
    let body_limit = get_config().max_upload_bytes + 64 * 1024;
    Router::new()
        .route(
            "/documents",
            post(upload_document::<S>).get(list_documents::<S>),
        )
        .route("/documents/:id/process", post(process_document::<S>))
        .route("/documents/:id", delete(delete_document::<S>))
        .route("/search", get(search_documents::<S>))
        .route("/blobs/*key", get(read_blob::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

/// Resolved caller identity extracted from the `x-user-id` header.
struct Identity(UserIdentity);

#[async_trait]
impl<S> axum::extract::FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<i64>().ok())
            .map(|user_id| Identity(UserIdentity { user_id }))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": "missing or invalid caller identity" })),
                )
                    .into_response()
            })
    }
}

/// Success response for the upload endpoint.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    document_id: i64,
}

/// Accept one multipart PDF upload and create its document record.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Identity(user): Identity,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        AppError(DocumentError::Validation(format!(
            "malformed multipart body: {err}"
        )))
    })? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("document").to_string();
            let bytes = field.bytes().await.map_err(|err| {
                AppError(DocumentError::Validation(format!(
                    "could not read uploaded file: {err}"
                )))
            })?;
            upload = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) =
        upload.ok_or(AppError(DocumentError::Validation("no file was provided".into())))?;
    let document = service.upload(user, &filename, bytes).await?;
    Ok(Json(UploadResponse {
        message: "file uploaded successfully",
        document_id: document.id,
    }))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    page_size: Option<usize>,
}

/// Page through the caller's documents.
async fn list_documents<S>(
    State(service): State<Arc<S>>,
    Identity(user): Identity,
    Query(query): Query<ListQuery>,
) -> Result<Json<DocumentPage>, AppError>
where
    S: DocumentApi,
{
    let page = service
        .list(user, query.page.unwrap_or(1), query.page_size)
        .await?;
    Ok(Json(page))
}

/// Success response for the process endpoint.
#[derive(Serialize)]
struct ProcessResponse {
    message: &'static str,
    chunks_indexed: usize,
}

/// Run the processing pipeline for one document.
async fn process_document<S>(
    State(service): State<Arc<S>>,
    Identity(user): Identity,
    Path(id): Path<i64>,
) -> Result<Json<ProcessResponse>, AppError>
where
    S: DocumentApi,
{
    let outcome = service.process(user, id).await?;
    Ok(Json(ProcessResponse {
        message: "document processed successfully",
        chunks_indexed: outcome.chunks_indexed,
    }))
}

/// Delete one document and everything derived from it.
async fn delete_document<S>(
    State(service): State<Arc<S>>,
    Identity(user): Identity,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError>
where
    S: DocumentApi,
{
    service.delete(user, id).await?;
    Ok(Json(json!({ "message": "file successfully deleted" })))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    #[serde(default)]
    label: Option<String>,
}

/// Response body for the search endpoint.
#[derive(Serialize)]
struct SearchResponse {
    matches: Vec<SearchMatch>,
}

/// Grouped semantic search over the caller's documents.
async fn search_documents<S>(
    State(service): State<Arc<S>>,
    Identity(user): Identity,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError>
where
    S: DocumentApi,
{
    let matches = service.search(user, query.q, query.label).await?;
    Ok(Json(SearchResponse { matches }))
}

#[derive(Deserialize)]
struct BlobQuery {
    expires: i64,
    signature: String,
}

/// Serve a blob referenced by a presigned URL.
async fn read_blob<S>(
    State(service): State<Arc<S>>,
    Path(key): Path<String>,
    Query(query): Query<BlobQuery>,
) -> Result<Response, AppError>
where
    S: DocumentApi,
{
    let bytes = service
        .read_blob(&key, query.expires, &query.signature)
        .await?;
    let content_type = content_type_for(&key);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext) {
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Return the current pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot())
}

struct AppError(DocumentError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DocumentError::Validation(_) => StatusCode::BAD_REQUEST,
            DocumentError::Forbidden => StatusCode::FORBIDDEN,
            DocumentError::NotFound => StatusCode::NOT_FOUND,
            DocumentError::Conflict(_) => StatusCode::CONFLICT,
            DocumentError::ProcessingFailed | DocumentError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

impl From<DocumentError> for AppError {
    fn from(inner: DocumentError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::content_type_for;

    #[test]
    fn content_type_follows_key_extension() {
        assert_eq!(content_type_for("documents/a.pdf"), "application/pdf");
        assert_eq!(content_type_for("reports/a.json"), "application/json");
        assert_eq!(content_type_for("misc/raw"), "application/octet-stream");
    }
}
