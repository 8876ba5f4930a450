//! Helpers for constructing point identifiers and payloads.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
///
/// `tenant_id` and `document_id` are the filterable partition keys; `label`
/// is attached only when the chunk came from a labeled region.
pub(crate) fn build_point_payload(
    tenant_id: &str,
    document_id: i64,
    label: Option<&str>,
    text: &str,
) -> Value {
    let mut payload = Map::new();
    payload.insert("tenant_id".into(), Value::String(tenant_id.to_string()));
    payload.insert("document_id".into(), Value::from(document_id));
    if let Some(label) = label.filter(|value| !value.trim().is_empty()) {
        payload.insert("label".into(), Value::String(label.to_string()));
    }
    payload.insert("text".into(), Value::String(text.to_string()));
    Value::Object(payload)
}

/// Derive the point identifier for one chunk position of one document.
///
/// The id is a UUID built from a digest of `(tenant, document, chunk index)`,
/// so re-running an upsert for the same document overwrites the same points
/// instead of accumulating duplicates.
pub(crate) fn derive_point_id(tenant_id: &str, document_id: i64, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(b":");
    hasher.update(document_id.to_be_bytes());
    hasher.update(b":");
    hasher.update((chunk_index as u64).to_be_bytes());
    let digest = hasher.finalize();
    Uuid::from_slice(&digest[..16])
        .expect("a 16-byte digest prefix always forms a uuid")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_tenant_document_and_text() {
        let payload = build_point_payload("7", 42, None, "sample");
        assert_eq!(payload["tenant_id"], "7");
        assert_eq!(payload["document_id"], 42);
        assert_eq!(payload["text"], "sample");
        assert!(payload.get("label").is_none());
    }

    #[test]
    fn payload_includes_label_when_present() {
        let payload = build_point_payload("7", 42, Some("header"), "sample");
        assert_eq!(payload["label"], "header");
    }

    #[test]
    fn blank_label_is_omitted() {
        let payload = build_point_payload("7", 42, Some("  "), "sample");
        assert!(payload.get("label").is_none());
    }

    #[test]
    fn point_ids_are_stable_per_position() {
        assert_eq!(derive_point_id("7", 42, 0), derive_point_id("7", 42, 0));
        assert_ne!(derive_point_id("7", 42, 0), derive_point_id("7", 42, 1));
        assert_ne!(derive_point_id("7", 42, 0), derive_point_id("7", 43, 0));
        assert_ne!(derive_point_id("7", 42, 0), derive_point_id("8", 42, 0));
    }

    #[test]
    fn point_ids_are_well_formed_uuids() {
        let id = derive_point_id("7", 42, 3);
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
