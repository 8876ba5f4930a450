//! Blob storage: opaque put/get/delete plus signed, time-limited read URLs.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::PathBuf;
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Errors returned by blob store operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// No object exists under the requested key.
    #[error("no blob stored under key '{0}'")]
    NotFound(String),
    /// The key contains path traversal or characters outside the namespace.
    #[error("invalid blob key '{0}'")]
    InvalidKey(String),
    /// Underlying filesystem operation failed.
    #[error("blob I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// A presigned URL carried a signature that does not match its key.
    #[error("blob URL signature mismatch")]
    SignatureMismatch,
    /// A presigned URL's validity window has passed.
    #[error("blob URL expired")]
    Expired,
}

/// Opaque content store keyed by namespaced name.
///
/// Keys are flat names like `documents/<uuid>.pdf`; writes are whole-object
/// puts and reads are whole-object gets or pre-signed time-limited URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError>;

    /// Fetch the object under `key`; a missing object is an error, never
    /// empty content.
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Remove the object under `key`. Deleting a missing object succeeds so
    /// cleanup retries converge.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Produce a time-limited URL from which `key` can be read.
    fn presign_get(&self, key: &str) -> Result<String, BlobError>;

    /// Validate a presigned read: signature must match and the expiry must
    /// still be in the future.
    fn verify_get(&self, key: &str, expires: i64, signature: &str) -> Result<(), BlobError>;
}

/// Filesystem-backed blob store with HMAC-signed read URLs.
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
    signing_key: Vec<u8>,
    expiry_secs: u64,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, signing URLs with `signing_key`.
    pub fn new(root: impl Into<PathBuf>, base_url: &str, signing_key: &str, expiry_secs: u64) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            signing_key: signing_key.as_bytes().to_vec(),
            expiry_secs,
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn sign(&self, key: &str, expires: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .expect("HMAC accepts keys of any size");
        mac.update(format!("{key}:{expires}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn validate_key(key: &str) -> Result<(), BlobError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        });
    if valid {
        Ok(())
    } else {
        Err(BlobError::InvalidKey(key.to_string()))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(key, bytes = bytes.len(), "Blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key, "Blob deleted");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key, "Blob already absent");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn presign_get(&self, key: &str) -> Result<String, BlobError> {
        validate_key(key)?;
        let expires = OffsetDateTime::now_utc().unix_timestamp() + self.expiry_secs as i64;
        let signature = self.sign(key, expires);
        Ok(format!(
            "{}/{key}?expires={expires}&signature={signature}",
            self.base_url
        ))
    }

    fn verify_get(&self, key: &str, expires: i64, signature: &str) -> Result<(), BlobError> {
        validate_key(key)?;
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .expect("HMAC accepts keys of any size");
        mac.update(format!("{key}:{expires}").as_bytes());
        let decoded = hex::decode(signature).map_err(|_| BlobError::SignatureMismatch)?;
        mac.verify_slice(&decoded)
            .map_err(|_| BlobError::SignatureMismatch)?;
        if OffsetDateTime::now_utc().unix_timestamp() > expires {
            return Err(BlobError::Expired);
        }
        Ok(())
    }
}

/// Blob key for an uploaded document's original bytes.
pub fn document_key(storage_key: &str, mime_subtype: &str) -> String {
    format!("documents/{storage_key}.{mime_subtype}")
}

/// Blob key for an extraction report artifact.
pub fn report_key(storage_key: &str) -> String {
    format!("reports/{storage_key}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn store(root: &Path) -> FsBlobStore {
        FsBlobStore::new(root, "http://localhost:8080/blobs", "test-secret", 3600)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        store
            .put("documents/abc.pdf", b"%PDF-1.4 body")
            .await
            .expect("put");
        let bytes = store.get("documents/abc.pdf").await.expect("get");
        assert_eq!(bytes, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn get_of_missing_key_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let error = store.get("reports/nope.json").await.unwrap_err();
        assert!(matches!(error, BlobError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        store.put("documents/abc.pdf", b"x").await.expect("put");
        store.delete("documents/abc.pdf").await.expect("delete");
        store.delete("documents/abc.pdf").await.expect("second delete");
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        for key in ["../etc/passwd", "/absolute", "a//b", "documents/../x"] {
            assert!(
                matches!(store.get(key).await.unwrap_err(), BlobError::InvalidKey(_)),
                "{key} should be invalid"
            );
        }
    }

    #[test]
    fn presigned_url_verifies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let url = store.presign_get("documents/abc.pdf").expect("presign");
        let query = url.split_once('?').expect("query string").1;
        let mut expires = 0_i64;
        let mut signature = String::new();
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", value)) => expires = value.parse().expect("expiry"),
                Some(("signature", value)) => signature = value.to_string(),
                _ => {}
            }
        }
        store
            .verify_get("documents/abc.pdf", expires, &signature)
            .expect("valid signature");
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let expires = OffsetDateTime::now_utc().unix_timestamp() + 100;
        let signature = store.sign("documents/abc.pdf", expires);
        let error = store
            .verify_get("documents/other.pdf", expires, &signature)
            .unwrap_err();
        assert!(matches!(error, BlobError::SignatureMismatch));
    }

    #[test]
    fn expired_url_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let expires = OffsetDateTime::now_utc().unix_timestamp() - 10;
        let signature = store.sign("documents/abc.pdf", expires);
        let error = store
            .verify_get("documents/abc.pdf", expires, &signature)
            .unwrap_err();
        assert!(matches!(error, BlobError::Expired));
    }

    #[test]
    fn keys_are_namespaced_by_purpose() {
        assert_eq!(document_key("abc", "pdf"), "documents/abc.pdf");
        assert_eq!(report_key("abc"), "reports/abc.json");
    }
}
