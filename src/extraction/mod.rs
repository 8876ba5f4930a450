//! HTTP client for the external layout-analysis service.

mod report;

pub use report::{ExtractedDocument, Page, Region};

use reqwest::{Client, StatusCode, multipart};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors returned while invoking the extraction service.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Client construction or the HTTP round-trip failed.
    #[error("extraction request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("unexpected extraction response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The response body was not a parsable structured document.
    #[error("extraction response was not a structured document: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

/// Successful extraction: the raw response bytes and their parsed form.
///
/// The raw bytes are persisted verbatim as the report artifact so later
/// reprocessing runs replay exactly what the service produced.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Raw JSON body as returned by the service.
    pub raw: Vec<u8>,
    /// Parsed structured document.
    pub document: ExtractedDocument,
}

/// Client for the layout-analysis extraction service.
pub struct ExtractionClient {
    client: Client,
    base_url: String,
}

impl ExtractionClient {
    /// Build a client for the service at `base_url`.
    ///
    /// `timeout` bounds the whole round-trip; extraction is not
    /// latency-sensitive, so the caller passes a generous but finite value.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .user_agent("docshelf/0.1")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Submit document bytes for layout analysis.
    ///
    /// Non-success responses are hard failures for the processing run.
    pub async fn extract(
        &self,
        file_name: &str,
        mime_subtype: &str,
        bytes: Vec<u8>,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(format!("{file_name}.{mime_subtype}"))
            .mime_str(&format!("application/{mime_subtype}"))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("process", json!({ "detect_tables": true }).to_string());

        tracing::debug!(file = file_name, "Submitting document for extraction");
        let response = self
            .client
            .post(format!("{}/", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ExtractionError::UnexpectedStatus { status, body };
            tracing::error!(file = file_name, error = %error, "Extraction call failed");
            return Err(error);
        }

        let raw = response.bytes().await?.to_vec();
        let document: ExtractedDocument = serde_json::from_slice(&raw)?;
        tracing::debug!(
            file = file_name,
            pages = document.pages.len(),
            "Extraction completed"
        );
        Ok(ExtractionOutcome { raw, document })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn extract_parses_structured_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(200).json_body(serde_json::json!({
                    "pages": [{
                        "number": 1,
                        "regions": [{ "text": "Hello", "label": "text" }]
                    }]
                }));
            })
            .await;

        let client = ExtractionClient::new(&server.base_url(), Duration::from_secs(5))
            .expect("client");
        let outcome = client
            .extract("doc", "pdf", b"%PDF-1.4".to_vec())
            .await
            .expect("extraction succeeds");

        mock.assert();
        assert_eq!(outcome.document.pages.len(), 1);
        assert_eq!(outcome.document.pages[0].regions[0].text, "Hello");
        assert!(!outcome.raw.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_a_hard_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(502).body("upstream exploded");
            })
            .await;

        let client = ExtractionClient::new(&server.base_url(), Duration::from_secs(5))
            .expect("client");
        let error = client
            .extract("doc", "pdf", b"%PDF-1.4".to_vec())
            .await
            .unwrap_err();

        match error {
            ExtractionError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert!(body.contains("exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
