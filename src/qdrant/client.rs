//! HTTP client wrapper for the Qdrant vector index.

use crate::qdrant::{
    filters::{PointFilter, build_point_filter},
    payload::{build_point_payload, derive_point_id},
    types::{ChunkPoint, DocumentGroup, GroupsResponse, QdrantError, QueryResponse, ScoredPoint},
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Tenant-scoped client for the Qdrant HTTP API.
///
/// Every read and write is filtered by tenant; the adapter rejects calls
/// lacking one before any request leaves the process.
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantIndex {
    /// Construct a new client for the index at `base_url`.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("docshelf/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().map(|value| !value.is_empty()).unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create the collection if missing and ensure its payload indexes.
    ///
    /// The collection uses a single cosine vector space of `vector_size`;
    /// `tenant_id` is indexed as the tenant partition key and `document_id`
    /// as an integer field, matching the two mandatory filter dimensions.
    pub async fn ensure_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if !self.collection_exists(collection_name).await? {
            tracing::debug!(
                collection = collection_name,
                vector_size,
                "Creating collection"
            );
            let body = json!({
                "vectors": {
                    "size": vector_size,
                    "distance": "Cosine"
                }
            });
            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}"))
                .json(&body)
                .send()
                .await?;
            self.ensure_success(response, || {
                tracing::debug!(collection = collection_name, "Collection created");
            })
            .await?;
        }

        self.ensure_payload_indexes(collection_name).await
    }

    /// Upload chunk vectors for one document, waiting for acknowledgement.
    ///
    /// Point identifiers are derived from `(tenant, document, position)`, so
    /// re-running an upsert after a partial failure overwrites the same
    /// points instead of accumulating duplicates. Returns the number of
    /// points written.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        tenant_id: &str,
        document_id: i64,
        points: Vec<ChunkPoint>,
    ) -> Result<usize, QdrantError> {
        if tenant_id.trim().is_empty() {
            return Err(QdrantError::MissingTenant);
        }
        if points.is_empty() {
            return Ok(0);
        }

        let serialized: Vec<_> = points
            .into_iter()
            .enumerate()
            .map(|(position, point)| {
                let payload = build_point_payload(
                    tenant_id,
                    document_id,
                    point.label.as_deref(),
                    &point.text,
                );
                json!({
                    "id": derive_point_id(tenant_id, document_id, position),
                    "vector": point.vector,
                    "payload": payload,
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                document_id,
                points = point_count,
                "Points indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Check whether any point matches the filter.
    ///
    /// Used as the probe of the query-then-conditional-delete sequence so a
    /// document without indexed points never triggers a delete call.
    pub async fn has_points(
        &self,
        collection_name: &str,
        filter: &PointFilter,
    ) -> Result<bool, QdrantError> {
        let filter_body = build_point_filter(filter)?;
        let body = json!({
            "filter": filter_body,
            "limit": 1,
            "with_payload": false,
            "with_vector": false,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Point probe failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        Ok(!payload.result.into_points().is_empty())
    }

    /// Remove every point matching the filter in one acknowledged call.
    pub async fn delete_points(
        &self,
        collection_name: &str,
        filter: &PointFilter,
    ) -> Result<(), QdrantError> {
        let filter_body = build_point_filter(filter)?;
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/delete"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter_body }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                document_id = ?filter.document_id,
                "Points deleted"
            );
        })
        .await
    }

    /// Grouped similarity search: the best `group_size` hits per distinct
    /// document, at most `limit` documents, scores below `score_threshold`
    /// excluded.
    pub async fn query_groups(
        &self,
        collection_name: &str,
        filter: &PointFilter,
        vector: Vec<f32>,
        group_size: usize,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<DocumentGroup>, QdrantError> {
        let filter_body = build_point_filter(filter)?;
        let body = json!({
            "query": vector,
            "filter": filter_body,
            "group_by": "document_id",
            "group_size": group_size,
            "limit": limit,
            "score_threshold": score_threshold,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query/groups"),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Grouped query failed");
            return Err(error);
        }

        let payload: GroupsResponse = response.json().await?;
        let groups = payload
            .result
            .groups
            .into_iter()
            .filter_map(|group| {
                let Some(document_id) = group.id.as_i64() else {
                    tracing::warn!(group_id = %group.id, "Skipping group with non-integer id");
                    return None;
                };
                let hits = group
                    .hits
                    .into_iter()
                    .map(|point| ScoredPoint {
                        id: stringify_point_id(point.id),
                        score: point.score,
                        payload: point.payload,
                    })
                    .collect();
                Some(DocumentGroup { document_id, hits })
            })
            .collect();

        Ok(groups)
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn ensure_payload_indexes(&self, collection_name: &str) -> Result<(), QdrantError> {
        let fields: [(&str, Value); 2] = [
            (
                "tenant_id",
                json!({ "type": "keyword", "is_tenant": true }),
            ),
            ("document_id", json!("integer")),
        ];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = collection_name, field, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection = collection_name, field, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
