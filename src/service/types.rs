use crate::filter::Attributes;
use serde_derive::Serialize;
use serde_json::Value;
use std::borrow::Cow;

/// Cluster identity as reported by the root document (`GET /`).
///
/// Every field is optional on the wire; missing or oddly typed values fall
/// back to empty strings and `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceIdentity {
    pub service_name: String,
    pub cluster_name: String,
    pub cluster_id: String,
    pub version_number: String,
    pub build_flavor: String,
    pub build_type: String,
    pub build_hash: String,
    pub build_date: String,
    pub is_snapshot_build: bool,
    pub engine_version: String,
    pub min_wire_compat_version: String,
    pub min_index_compat_version: String,
    pub tagline: String,
}

fn text_at(document: &Value, pointer: &str) -> String {
    document
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

impl ServiceIdentity {
    pub fn from_document(document: &Value) -> Self {
        Self {
            service_name: text_at(document, "/name"),
            cluster_name: text_at(document, "/cluster_name"),
            cluster_id: text_at(document, "/cluster_uuid"),
            version_number: text_at(document, "/version/number"),
            build_flavor: text_at(document, "/version/build_flavor"),
            build_type: text_at(document, "/version/build_type"),
            build_hash: text_at(document, "/version/build_hash"),
            build_date: text_at(document, "/version/build_date"),
            is_snapshot_build: document
                .pointer("/version/build_snapshot")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            engine_version: text_at(document, "/version/lucene_version"),
            min_wire_compat_version: text_at(
                document,
                "/version/minimum_wire_compatibility_version",
            ),
            min_index_compat_version: text_at(
                document,
                "/version/minimum_index_compatibility_version",
            ),
            tagline: text_at(document, "/tagline"),
        }
    }
}

impl Attributes for ServiceIdentity {
    fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        let value = match name {
            "name" | "service_name" => &self.service_name,
            "cluster_name" => &self.cluster_name,
            "cluster_uuid" | "cluster_id" => &self.cluster_id,
            "version_number" => &self.version_number,
            "build_flavor" => &self.build_flavor,
            "build_type" => &self.build_type,
            "build_hash" => &self.build_hash,
            "build_date" => &self.build_date,
            "build_snapshot" | "is_snapshot_build" => {
                return Some(Cow::Owned(self.is_snapshot_build.to_string()))
            }
            "lucene_version" | "engine_version" => &self.engine_version,
            "minimum_wire_compatibility_version" => &self.min_wire_compat_version,
            "minimum_index_compatibility_version" => &self.min_index_compat_version,
            "tagline" => &self.tagline,
            _ => return None,
        };
        Some(Cow::Borrowed(value))
    }
}

/// One row of the index catalog (`GET /_cat/indices?format=json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub health: String,
    pub status: String,
    pub name: String,
    pub uuid: String,
    pub primary_shards: String,
    pub replica_shards: String,
    pub doc_count: String,
    pub deleted_doc_count: String,
    pub store_size: String,
    pub primary_store_size: String,
}

impl CollectionSummary {
    /// Builds a summary from one catalog entry, or `None` if any column is
    /// missing or has a shape other than string, number or null.
    ///
    /// Null columns (closed indices report no counts) become empty strings.
    pub fn from_catalog_entry(entry: &Value) -> Option<Self> {
        let column = |key: &str| -> Option<String> {
            match entry.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Null => Some(String::new()),
                _ => None,
            }
        };

        let summary = Self {
            health: column("health")?,
            status: column("status")?,
            name: column("index")?,
            uuid: column("uuid")?,
            primary_shards: column("pri")?,
            replica_shards: column("rep")?,
            doc_count: column("docs.count")?,
            deleted_doc_count: column("docs.deleted")?,
            store_size: column("store.size")?,
            primary_store_size: column("pri.store.size")?,
        };

        (!summary.name.is_empty()).then_some(summary)
    }

    /// Whether `name` is something [`Attributes::attribute`] can answer.
    pub fn has_attribute(name: &str) -> bool {
        Self::default().attribute(name).is_some()
    }
}

impl Attributes for CollectionSummary {
    fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        let value = match name {
            "health" => &self.health,
            "status" => &self.status,
            "name" | "index" => &self.name,
            "uuid" => &self.uuid,
            "primary_shards" | "pri" => &self.primary_shards,
            "replica_shards" | "rep" => &self.replica_shards,
            "doc_count" | "docs.count" | "docs_count" => &self.doc_count,
            "deleted_doc_count" | "docs.deleted" | "docs_deleted" => &self.deleted_doc_count,
            "store_size" | "store.size" => &self.store_size,
            "primary_store_size" | "pri.store.size" | "pri_store_size" => {
                &self.primary_store_size
            }
            _ => return None,
        };
        Some(Cow::Borrowed(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_defaults_missing_fields() {
        let identity = ServiceIdentity::from_document(&json!({
            "name": "node-1",
            "version": { "number": "7.17.9", "build_snapshot": "not a bool" }
        }));

        assert_eq!(identity.service_name, "node-1");
        assert_eq!(identity.version_number, "7.17.9");
        assert_eq!(identity.cluster_name, "");
        assert!(!identity.is_snapshot_build);
        assert_eq!(identity.tagline, "");
    }

    #[test]
    fn identity_from_non_object_is_default() {
        assert_eq!(
            ServiceIdentity::from_document(&json!([1, 2, 3])),
            ServiceIdentity::default()
        );
    }

    #[test]
    fn identity_reads_full_document() {
        let identity = ServiceIdentity::from_document(&json!({
            "name": "es01",
            "cluster_name": "docker-cluster",
            "cluster_uuid": "x1y2",
            "version": {
                "number": "8.11.1",
                "build_flavor": "default",
                "build_type": "docker",
                "build_hash": "6f9ff581",
                "build_date": "2023-11-11T10:05:59.421038163Z",
                "build_snapshot": true,
                "lucene_version": "9.8.0",
                "minimum_wire_compatibility_version": "7.17.0",
                "minimum_index_compatibility_version": "7.0.0"
            },
            "tagline": "You Know, for Search"
        }));

        assert_eq!(identity.cluster_id, "x1y2");
        assert_eq!(identity.engine_version, "9.8.0");
        assert_eq!(identity.min_wire_compat_version, "7.17.0");
        assert!(identity.is_snapshot_build);
        assert_eq!(identity.attribute("Cn").as_deref(), None);
        assert_eq!(
            identity.attribute("cluster_name").as_deref(),
            Some("docker-cluster")
        );
    }

    #[test]
    fn catalog_entry_with_nulls() {
        let summary = CollectionSummary::from_catalog_entry(&json!({
            "health": "red", "status": "close", "index": "archive", "uuid": "u1",
            "pri": "1", "rep": "0", "docs.count": null, "docs.deleted": null,
            "store.size": null, "pri.store.size": null
        }))
        .unwrap();

        assert_eq!(summary.name, "archive");
        assert_eq!(summary.doc_count, "");
    }

    #[test]
    fn malformed_catalog_entries_are_rejected() {
        let missing = json!({ "health": "green", "index": "x" });
        let nested = json!({
            "health": "green", "status": "open", "index": {"a": 1}, "uuid": "u",
            "pri": "1", "rep": "1", "docs.count": "1", "docs.deleted": "0",
            "store.size": "1kb", "pri.store.size": "1kb"
        });
        assert!(CollectionSummary::from_catalog_entry(&missing).is_none());
        assert!(CollectionSummary::from_catalog_entry(&nested).is_none());
        assert!(CollectionSummary::from_catalog_entry(&json!("index")).is_none());
    }

    #[test]
    fn attribute_aliases() {
        assert!(CollectionSummary::has_attribute("docs.count"));
        assert!(CollectionSummary::has_attribute("doc_count"));
        assert!(!CollectionSummary::has_attribute("owner"));
    }
}
