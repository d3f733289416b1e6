//! Fingerprinting of candidates and retrieval of cluster metadata.
//!
//! A [`ServiceClient`] talks to one candidate. Detection is a plain yes/no
//! and never fails; metadata retrieval degrades to partial knowledge
//! instead of failing the candidate.
mod mapping;
mod types;

pub use mapping::{discover_fields, flatten_properties};
pub use types::{CollectionSummary, ServiceIdentity};

use crate::error::{Error, Result};
use crate::scanner::Candidate;
use log::{debug, warn};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

/// Marker that the `_cat` diagnostic endpoint prints.
pub const SENTINEL: &str = "=^.^=";
pub const DIAGNOSTIC_PATH: &str = "/_cat";
pub const CATALOG_PATH: &str = "/_cat/indices?format=json";

/// What we learned about a confirmed service.
#[derive(Debug, Clone, Default)]
pub struct ServiceMetadata {
    pub identity: ServiceIdentity,
    pub collections: Vec<CollectionSummary>,
}

#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ServiceClient {
    /// `base_url` is the scheme and authority, e.g. `http://10.0.0.1:9200`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        // Hosts are probed directly, so HTTP must not detour through a proxy.
        let http = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(timeout)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn for_candidate(candidate: &Candidate, timeout: Duration) -> Result<Self> {
        Self::new(candidate.base_url(), timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `<base_url>/<collection>/<endpoint>` with the collection name
    /// percent-encoded as one path segment.
    pub(crate) fn collection_url(&self, collection: &str, endpoint: &str) -> Result<Url> {
        let invalid = |reason: String| Error::Metadata {
            url: self.base_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid(String::from("address cannot carry a path")))?
            .pop_if_empty()
            .push(collection)
            .push(endpoint);
        Ok(url)
    }

    /// Whether the candidate is the target service: the diagnostic
    /// endpoint's body must contain [`SENTINEL`]. Errors count as "no".
    pub async fn is_service(&self) -> bool {
        let url = self.url(DIAGNOSTIC_PATH);
        let body = async {
            self.http
                .get(&url)
                .timeout(self.timeout)
                .send()
                .await?
                .text()
                .await
        };

        match body.await {
            Ok(text) => text.contains(SENTINEL),
            Err(e) => {
                debug!("Detection probe {url} failed: {e}");
                false
            }
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        self.fetch_json(self.url(path)).await
    }

    async fn fetch_json(&self, url: String) -> Result<Value> {
        let metadata_error = |e: reqwest::Error| Error::Metadata {
            url: url.clone(),
            reason: e.to_string(),
        };

        self.http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(metadata_error)?
            .json::<Value>()
            .await
            .map_err(metadata_error)
    }

    /// Reads the root document. Only transport failures and non-JSON bodies
    /// are errors; missing fields just stay empty.
    pub async fn identity(&self) -> Result<ServiceIdentity> {
        let document = self.get_json("/").await?;
        Ok(ServiceIdentity::from_document(&document))
    }

    /// Lists the stored collections. Entries that do not fully parse are
    /// skipped individually.
    pub async fn collections(&self) -> Result<Vec<CollectionSummary>> {
        let document = self.get_json(CATALOG_PATH).await?;
        let entries = document.as_array().ok_or_else(|| Error::Metadata {
            url: self.url(CATALOG_PATH),
            reason: String::from("catalog is not a JSON array"),
        })?;

        Ok(entries
            .iter()
            .filter_map(|entry| {
                let summary = CollectionSummary::from_catalog_entry(entry);
                if summary.is_none() {
                    debug!("Skipping malformed catalog entry {entry}");
                }
                summary
            })
            .collect())
    }

    /// Identity plus catalog, degrading instead of failing.
    ///
    /// If the catalog cannot be read the identity is still returned, with an
    /// empty collection list and a hint about where else to look.
    pub async fn metadata(&self) -> ServiceMetadata {
        let identity = self.identity().await.unwrap_or_else(|e| {
            warn!("Error retrieving cluster information: {e}");
            ServiceIdentity::default()
        });

        let collections = self.collections().await.unwrap_or_else(|e| {
            warn!("Error retrieving the index catalog from {}: {e}", self.base_url);
            warn!(
                "Indices may be private. Check {} by hand, or request {} to see if they are exposed there",
                self.url("/_cat/indices"),
                self.url("/_mapping")
            );
            Vec::new()
        });

        ServiceMetadata {
            identity,
            collections,
        }
    }

    /// Exportable field names of `collection`, from its mapping.
    ///
    /// Returns whatever could be collected; an unreachable mapping yields an
    /// empty list.
    pub async fn field_names(&self, collection: &str) -> Vec<String> {
        let document = async {
            let url = self.collection_url(collection, "_mapping")?;
            self.fetch_json(url.into()).await
        };
        match document.await {
            Ok(document) => discover_fields(&document, collection),
            Err(e) => {
                warn!("Failed to get the mapping of {collection}: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeService, Reply};
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn cat_body() -> String {
        "=^.^=\n/_cat/allocation\n/_cat/shards\n/_cat/indices\n".to_owned()
    }

    #[tokio::test]
    async fn sentinel_confirms_service() {
        let service = FakeService::start().await;
        service.route("GET", "/_cat", vec![Reply::ok(cat_body())]);

        let client = ServiceClient::new(&service.base_url, TIMEOUT).unwrap();
        assert!(client.is_service().await);
    }

    #[tokio::test]
    async fn other_body_is_not_service() {
        let service = FakeService::start().await;
        service.route("GET", "/_cat", vec![Reply::ok("<html>router login</html>")]);

        let client = ServiceClient::new(&service.base_url, TIMEOUT).unwrap();
        assert!(!client.is_service().await);
    }

    #[tokio::test]
    async fn network_error_is_not_service() {
        // Nothing listens on the port once the listener is dropped.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ServiceClient::new(format!("http://{addr}"), TIMEOUT).unwrap();
        assert!(!client.is_service().await);
    }

    #[tokio::test]
    async fn metadata_with_catalog() {
        let service = FakeService::start().await;
        service.route(
            "GET",
            "/",
            vec![Reply::ok(
                json!({"name": "node-a", "cluster_name": "prod", "version": {"number": "7.10.2"}})
                    .to_string(),
            )],
        );
        service.route(
            "GET",
            CATALOG_PATH,
            vec![Reply::ok(
                json!([
                    {"health": "green", "status": "open", "index": "users", "uuid": "u1",
                     "pri": "1", "rep": "1", "docs.count": "120", "docs.deleted": "0",
                     "store.size": "1mb", "pri.store.size": "512kb"},
                    {"health": "green", "index": "broken"},
                    {"health": "yellow", "status": "open", "index": "orders", "uuid": "u2",
                     "pri": "5", "rep": "1", "docs.count": "9000", "docs.deleted": "3",
                     "store.size": "20mb", "pri.store.size": "10mb"}
                ])
                .to_string(),
            )],
        );

        let client = ServiceClient::new(&service.base_url, TIMEOUT).unwrap();
        let metadata = client.metadata().await;

        assert_eq!(metadata.identity.service_name, "node-a");
        assert_eq!(metadata.identity.version_number, "7.10.2");
        let names: Vec<&str> = metadata.collections.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["users", "orders"]);
    }

    #[tokio::test]
    async fn auth_walled_catalog_keeps_identity() {
        let service = FakeService::start().await;
        service.route("GET", "/", vec![Reply::ok(json!({"name": "node-b"}).to_string())]);
        service.route(
            "GET",
            CATALOG_PATH,
            vec![Reply::status(401, json!({"error": "security_exception"}).to_string())],
        );

        let client = ServiceClient::new(&service.base_url, TIMEOUT).unwrap();
        assert!(client.collections().await.is_err());

        let metadata = client.metadata().await;
        assert_eq!(metadata.identity.service_name, "node-b");
        assert!(metadata.collections.is_empty());
    }

    #[tokio::test]
    async fn non_json_root_is_metadata_error() {
        let service = FakeService::start().await;
        service.route("GET", "/", vec![Reply::ok("not json")]);

        let client = ServiceClient::new(&service.base_url, TIMEOUT).unwrap();
        assert!(matches!(
            client.identity().await,
            Err(Error::Metadata { .. })
        ));
        assert_eq!(client.metadata().await.identity, ServiceIdentity::default());
    }

    #[tokio::test]
    async fn field_names_from_mapping_endpoint() {
        let service = FakeService::start().await;
        service.route(
            "GET",
            "/users/_mapping",
            vec![Reply::ok(
                json!({"users": {"mappings": {"properties": {
                    "email": {"type": "keyword"},
                    "vec": {"type": "dense_vector"}
                }}}})
                .to_string(),
            )],
        );

        let client = ServiceClient::new(&service.base_url, TIMEOUT).unwrap();
        assert_eq!(client.field_names("users").await, ["email"]);
        assert!(client.field_names("missing").await.is_empty());
    }

    #[tokio::test]
    async fn collection_names_are_percent_encoded() {
        let service = FakeService::start().await;
        service.route(
            "GET",
            "/web%20logs%3Fv=1%23a%2Fb/_mapping",
            vec![Reply::ok(
                json!({"web logs?v=1#a/b": {"mappings": {"properties": {
                    "path": {"type": "keyword"}
                }}}})
                .to_string(),
            )],
        );

        let client = ServiceClient::new(&service.base_url, TIMEOUT).unwrap();
        assert_eq!(client.field_names("web logs?v=1#a/b").await, ["path"]);
        assert_eq!(service.requests()[0].path, "/web%20logs%3Fv=1%23a%2Fb/_mapping");
    }
}
