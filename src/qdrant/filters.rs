//! Filter construction for tenant-scoped index operations.

use serde_json::{Value, json};

use super::types::QdrantError;

/// Constraints applied to index reads and deletes.
///
/// The tenant is mandatory; document and label constraints are optional
/// refinements within the tenant's partition.
#[derive(Debug, Clone)]
pub struct PointFilter {
    /// Owning tenant; every operation is scoped to exactly one.
    pub tenant_id: String,
    /// Restrict to points of one document.
    pub document_id: Option<i64>,
    /// Restrict to points carrying this region label.
    pub label: Option<String>,
}

impl PointFilter {
    /// Filter matching everything a tenant owns.
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            document_id: None,
            label: None,
        }
    }

    /// Filter matching one document within a tenant's partition.
    pub fn for_document(tenant_id: impl Into<String>, document_id: i64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            document_id: Some(document_id),
            label: None,
        }
    }

    /// Add a label constraint, dropping blank values.
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label.filter(|value| !value.trim().is_empty());
        self
    }
}

/// Compose the Qdrant filter body, rejecting filters without a tenant.
pub(crate) fn build_point_filter(filter: &PointFilter) -> Result<Value, QdrantError> {
    let tenant = filter.tenant_id.trim();
    if tenant.is_empty() {
        return Err(QdrantError::MissingTenant);
    }

    let mut must: Vec<Value> = vec![json!({
        "key": "tenant_id",
        "match": { "value": tenant }
    })];

    if let Some(document_id) = filter.document_id {
        must.push(json!({
            "key": "document_id",
            "match": { "value": document_id }
        }));
    }

    if let Some(label) = filter.label.as_ref() {
        must.push(json!({
            "key": "label",
            "match": { "value": label }
        }));
    }

    Ok(json!({ "must": must }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_filter_always_carries_the_tenant_condition() {
        let filter = build_point_filter(&PointFilter::for_tenant("7")).expect("filter");
        assert_eq!(
            filter,
            json!({
                "must": [
                    { "key": "tenant_id", "match": { "value": "7" } }
                ]
            })
        );
    }

    #[test]
    fn document_filter_combines_tenant_and_document() {
        let filter = build_point_filter(&PointFilter::for_document("7", 42)).expect("filter");
        assert_eq!(
            filter,
            json!({
                "must": [
                    { "key": "tenant_id", "match": { "value": "7" } },
                    { "key": "document_id", "match": { "value": 42 } }
                ]
            })
        );
    }

    #[test]
    fn label_constraint_is_appended_when_present() {
        let filter = build_point_filter(
            &PointFilter::for_tenant("7").with_label(Some("header".into())),
        )
        .expect("filter");
        assert_eq!(
            filter,
            json!({
                "must": [
                    { "key": "tenant_id", "match": { "value": "7" } },
                    { "key": "label", "match": { "value": "header" } }
                ]
            })
        );
    }

    #[test]
    fn blank_label_is_dropped() {
        let filter = PointFilter::for_tenant("7").with_label(Some("  ".into()));
        assert!(filter.label.is_none());
    }

    #[test]
    fn blank_tenant_is_rejected() {
        let error = build_point_filter(&PointFilter::for_tenant("  ")).unwrap_err();
        assert!(matches!(error, QdrantError::MissingTenant));
    }
}
