//! Document lifecycle orchestration and retrieval.
//!
//! `DocumentService` drives every document through the
//! `UPLOADED -> PROCESSING -> {PROCESSED, PROCESSING_FAILED}` machine,
//! owning the consistency contract between the relational store, the blob
//! store, and the vector index. Each step of the saga is idempotent so a
//! retry after a partial failure converges instead of compounding.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::get_config;
use crate::documents::chunking::{chunk_text, normalize_text};
use crate::documents::types::{
    DocumentError, DocumentPage, DocumentRecord, DocumentStatus, DocumentSummary, PipelineError,
    ProcessOutcome, SearchMatch, UserIdentity,
};
use crate::embedding::EmbeddingClient;
use crate::extraction::{ExtractedDocument, ExtractionClient};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::qdrant::{ChunkPoint, PointFilter, QdrantIndex};
use crate::storage::{BlobError, BlobStore, RecordStore, document_key, report_key};

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

/// Abstraction over document operations consumed by the HTTP surface.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Validate and store an uploaded file, creating its document record.
    async fn upload(
        &self,
        user: UserIdentity,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentRecord, DocumentError>;

    /// Run (or re-run) the processing pipeline for one document.
    async fn process(
        &self,
        user: UserIdentity,
        document_id: i64,
    ) -> Result<ProcessOutcome, DocumentError>;

    /// Delete a document, cascading to its report and vector points.
    async fn delete(&self, user: UserIdentity, document_id: i64) -> Result<(), DocumentError>;

    /// Page through the caller's documents with presigned download URLs.
    async fn list(
        &self,
        user: UserIdentity,
        page: usize,
        page_size: Option<usize>,
    ) -> Result<DocumentPage, DocumentError>;

    /// Semantic search returning one best match per distinct document.
    async fn search(
        &self,
        user: UserIdentity,
        query: String,
        label: Option<String>,
    ) -> Result<Vec<SearchMatch>, DocumentError>;

    /// Serve a blob referenced by a presigned URL.
    async fn read_blob(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<Vec<u8>, DocumentError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Coordinates uploads, the processing saga, deletion, and retrieval.
///
/// All collaborators are injected at construction so tests can substitute
/// stubs; the service itself is shared through an `Arc` by the router.
pub struct DocumentService {
    records: RecordStore,
    blobs: Arc<dyn BlobStore>,
    index: QdrantIndex,
    embedder: Arc<dyn EmbeddingClient>,
    extractor: ExtractionClient,
    metrics: Arc<PipelineMetrics>,
}

impl DocumentService {
    /// Assemble the service from its collaborators.
    pub fn new(
        records: RecordStore,
        blobs: Arc<dyn BlobStore>,
        index: QdrantIndex,
        embedder: Arc<dyn EmbeddingClient>,
        extractor: ExtractionClient,
    ) -> Self {
        Self {
            records,
            blobs,
            index,
            embedder,
            extractor,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    fn fetch_owned(
        &self,
        user: UserIdentity,
        document_id: i64,
    ) -> Result<DocumentRecord, DocumentError> {
        let document = self
            .records
            .fetch_document(document_id)
            .map_err(log_internal("fetch document"))?
            .ok_or(DocumentError::NotFound)?;
        if document.owner_id != user.user_id {
            return Err(DocumentError::Forbidden);
        }
        Ok(document)
    }

    /// Produce the extraction artifact, either by invoking the extractor or
    /// by replaying the cached report.
    async fn load_artifact(
        &self,
        document: &DocumentRecord,
    ) -> Result<ExtractedDocument, PipelineError> {
        match document.report_id {
            None => {
                let source_key = document_key(&document.storage_key, &document.content_type);
                let bytes = self.blobs.get(&source_key).await.map_err(missing_is_consistency)?;

                let outcome = self
                    .extractor
                    .extract(&document.storage_key, &document.content_type, bytes)
                    .await?;

                // Artifact bytes land in the blob store before the relational
                // link exists, so a crash between the two leaves an orphaned
                // blob, never a dangling reference.
                let report_storage_key = Uuid::new_v4().to_string();
                self.blobs
                    .put(&report_key(&report_storage_key), &outcome.raw)
                    .await?;
                let report = self.records.create_report(document.id, &report_storage_key)?;
                tracing::info!(
                    document_id = document.id,
                    report_id = report.id,
                    "Extraction artifact persisted"
                );
                Ok(outcome.document)
            }
            Some(report_id) => {
                let report = self.records.fetch_report(report_id)?.ok_or_else(|| {
                    PipelineError::Consistency(format!(
                        "document {} references missing report {report_id}",
                        document.id
                    ))
                })?;
                let raw = self
                    .blobs
                    .get(&report_key(&report.storage_key))
                    .await
                    .map_err(missing_is_consistency)?;
                let parsed = serde_json::from_slice(&raw).map_err(|err| {
                    PipelineError::Consistency(format!(
                        "stored report {report_id} is not a structured document: {err}"
                    ))
                })?;
                tracing::debug!(
                    document_id = document.id,
                    report_id,
                    "Reusing cached extraction artifact"
                );
                Ok(parsed)
            }
        }
    }

    /// The in-flight part of a processing run, entered only after the
    /// transition to `Processing` has been committed.
    async fn run_pipeline(
        &self,
        user: UserIdentity,
        document: &DocumentRecord,
    ) -> Result<ProcessOutcome, PipelineError> {
        let config = get_config();
        let artifact = self.load_artifact(document).await?;

        let mut chunks: Vec<String> = Vec::new();
        let mut labels: Vec<Option<String>> = Vec::new();
        for (label, text) in artifact.labeled_text() {
            let normalized = normalize_text(&text);
            let windows = chunk_text(&normalized, config.chunk_size, config.chunk_overlap)?;
            let label = Some(label).filter(|value| !value.trim().is_empty());
            for window in windows {
                chunks.push(window);
                labels.push(label.clone());
            }
        }

        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            tokio::time::timeout(
                Duration::from_secs(config.embedding_timeout_secs),
                self.embedder.embed_batch(chunks.clone()),
            )
            .await
            .map_err(|_| PipelineError::EmbeddingTimeout(config.embedding_timeout_secs))??
        };
        debug_assert_eq!(chunks.len(), embeddings.len());

        let points: Vec<ChunkPoint> = chunks
            .into_iter()
            .zip(labels)
            .zip(embeddings)
            .map(|((text, label), vector)| ChunkPoint {
                text,
                label,
                vector,
            })
            .collect();

        let indexed = self
            .index
            .upsert_points(
                &config.qdrant_collection_name,
                &user.tenant(),
                document.id,
                points,
            )
            .await?;

        Ok(ProcessOutcome {
            chunks_indexed: indexed,
        })
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn upload(
        &self,
        user: UserIdentity,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentRecord, DocumentError> {
        let config = get_config();
        if bytes.is_empty() {
            return Err(DocumentError::Validation("no file was provided".into()));
        }
        if bytes.len() > config.max_upload_bytes {
            return Err(DocumentError::Validation(format!(
                "file exceeds the maximum size of {} bytes",
                config.max_upload_bytes
            )));
        }
        if !bytes.starts_with(b"%PDF") {
            return Err(DocumentError::Validation(
                "unsupported file type; only PDF documents are accepted".into(),
            ));
        }

        let name = Path::new(filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.trim().is_empty())
            .unwrap_or("document")
            .to_string();
        let storage_key = Uuid::new_v4().to_string();
        let content_type = "pdf";

        self.blobs
            .put(&document_key(&storage_key, content_type), &bytes)
            .await
            .map_err(log_internal("store uploaded blob"))?;
        let document = self
            .records
            .insert_document(user.user_id, &name, &storage_key, content_type)
            .map_err(log_internal("insert document record"))?;

        tracing::info!(
            document_id = document.id,
            owner_id = user.user_id,
            name = %document.name,
            "Document uploaded"
        );
        Ok(document)
    }

    async fn process(
        &self,
        user: UserIdentity,
        document_id: i64,
    ) -> Result<ProcessOutcome, DocumentError> {
        let document = self.fetch_owned(user, document_id)?;

        if !document
            .status
            .can_transition_to(DocumentStatus::Processing)
        {
            return Err(DocumentError::Conflict(
                "document is already being processed",
            ));
        }

        // Commit the transition before any external call; a crash during
        // extraction is then observable as a stuck Processing run rather
        // than silently lost work.
        let claimed = self
            .records
            .transition_status(document.id, document.status, DocumentStatus::Processing)
            .map_err(log_internal("begin processing"))?;
        if !claimed {
            return Err(DocumentError::Conflict(
                "document is already being processed",
            ));
        }

        tracing::info!(document_id = document.id, owner_id = user.user_id, "Processing started");
        match self.run_pipeline(user, &document).await {
            Ok(outcome) => {
                let committed = self
                    .records
                    .transition_status(
                        document.id,
                        DocumentStatus::Processing,
                        DocumentStatus::Processed,
                    )
                    .map_err(log_internal("commit processed status"))?;
                if !committed {
                    tracing::warn!(
                        document_id = document.id,
                        "Document left Processing before completion could be recorded"
                    );
                }
                self.metrics.record_processed(outcome.chunks_indexed as u64);
                tracing::info!(
                    document_id = document.id,
                    chunks = outcome.chunks_indexed,
                    "Processing completed"
                );
                Ok(outcome)
            }
            Err(error) => {
                tracing::error!(
                    document_id = document.id,
                    owner_id = user.user_id,
                    error = %error,
                    "Processing run failed"
                );
                if let Err(record_error) = self.records.transition_status(
                    document.id,
                    DocumentStatus::Processing,
                    DocumentStatus::ProcessingFailed,
                ) {
                    tracing::error!(
                        document_id = document.id,
                        error = %record_error,
                        "Failed to record processing failure"
                    );
                }
                Err(DocumentError::ProcessingFailed)
            }
        }
    }

    async fn delete(&self, user: UserIdentity, document_id: i64) -> Result<(), DocumentError> {
        let document = self.fetch_owned(user, document_id)?;
        if document.status == DocumentStatus::Processing {
            return Err(DocumentError::Conflict("document is being processed"));
        }

        let config = get_config();
        let tenant = user.tenant();

        if let Some(report_id) = document.report_id {
            let filter = PointFilter::for_document(tenant.clone(), document.id);
            let indexed = self
                .index
                .has_points(&config.qdrant_collection_name, &filter)
                .await
                .map_err(log_internal("probe vector points"))?;
            if indexed {
                tracing::info!(document_id = document.id, "Deleting vector points");
                self.index
                    .delete_points(&config.qdrant_collection_name, &filter)
                    .await
                    .map_err(log_internal("delete vector points"))?;
            }

            match self
                .records
                .fetch_report(report_id)
                .map_err(log_internal("fetch report record"))?
            {
                Some(report) => {
                    self.blobs
                        .delete(&report_key(&report.storage_key))
                        .await
                        .map_err(log_internal("delete report blob"))?;
                }
                None => {
                    tracing::warn!(
                        document_id = document.id,
                        report_id,
                        "Linked report record missing during delete"
                    );
                }
            }
            self.records
                .clear_report(document.id)
                .map_err(log_internal("clear report record"))?;
        }

        self.blobs
            .delete(&document_key(&document.storage_key, &document.content_type))
            .await
            .map_err(log_internal("delete document blob"))?;
        self.records
            .delete_document(document.id)
            .map_err(log_internal("delete document record"))?;

        tracing::info!(document_id = document.id, owner_id = user.user_id, "Document deleted");
        Ok(())
    }

    async fn list(
        &self,
        user: UserIdentity,
        page: usize,
        page_size: Option<usize>,
    ) -> Result<DocumentPage, DocumentError> {
        let page = page.max(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let (total_items, records) = self
            .records
            .list_documents(user.user_id, page, page_size)
            .map_err(log_internal("list documents"))?;

        let mut documents = Vec::with_capacity(records.len());
        for record in records {
            let url = self
                .blobs
                .presign_get(&document_key(&record.storage_key, &record.content_type))
                .map_err(log_internal("presign document url"))?;
            documents.push(DocumentSummary {
                id: record.id,
                key: format!("{}.{}", record.name, record.content_type),
                status: record.status,
                url,
            });
        }

        Ok(DocumentPage {
            page,
            page_size,
            total_items,
            documents,
        })
    }

    async fn search(
        &self,
        user: UserIdentity,
        query: String,
        label: Option<String>,
    ) -> Result<Vec<SearchMatch>, DocumentError> {
        let config = get_config();
        let normalized = normalize_text(&query);

        let mut vectors = self
            .embedder
            .embed_batch(vec![normalized])
            .await
            .map_err(log_internal("embed query"))?;
        let vector = vectors.pop().ok_or_else(|| {
            tracing::error!("Embedding runtime returned no vector for the query");
            DocumentError::Internal
        })?;
        if vector.len() != config.embedding_dimension {
            tracing::error!(
                expected = config.embedding_dimension,
                actual = vector.len(),
                "Query embedding has the wrong dimension"
            );
            return Err(DocumentError::Internal);
        }

        let filter = PointFilter::for_tenant(user.tenant()).with_label(label);
        let groups = self
            .index
            .query_groups(
                &config.qdrant_collection_name,
                &filter,
                vector,
                1,
                config.search_result_limit,
                config.search_score_threshold,
            )
            .await
            .map_err(log_internal("grouped similarity query"))?;

        let mut matches: Vec<SearchMatch> = groups
            .into_iter()
            .filter_map(|group| {
                let hit = group.hits.into_iter().next()?;
                let (text, hit_label) = match hit.payload {
                    Some(mut payload) => (
                        take_string(&mut payload, "text"),
                        take_string(&mut payload, "label"),
                    ),
                    None => (None, None),
                };
                Some(SearchMatch {
                    document_id: group.document_id,
                    score: hit.score,
                    text,
                    label: hit_label,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));

        self.metrics.record_search();
        Ok(matches)
    }

    async fn read_blob(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<Vec<u8>, DocumentError> {
        self.blobs
            .verify_get(key, expires, signature)
            .map_err(|err| match err {
                BlobError::SignatureMismatch | BlobError::Expired | BlobError::InvalidKey(_) => {
                    DocumentError::Forbidden
                }
                other => log_internal("verify blob url")(other),
            })?;
        self.blobs.get(key).await.map_err(|err| match err {
            BlobError::NotFound(_) => DocumentError::NotFound,
            other => log_internal("read blob")(other),
        })
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn take_string(payload: &mut serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    match payload.remove(key) {
        Some(serde_json::Value::String(value)) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn missing_is_consistency(error: BlobError) -> PipelineError {
    match error {
        BlobError::NotFound(key) => {
            PipelineError::Consistency(format!("blob '{key}' is missing from the store"))
        }
        other => other.into(),
    }
}

fn log_internal<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> DocumentError {
    move |error| {
        tracing::error!(context, error = %error, "Storage backend failure");
        DocumentError::Internal
    }
}
