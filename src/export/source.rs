//! Where pages come from.
//!
//! [`PageSource`] is the seam between the export loop and the network;
//! [`ScrollSource`] implements it over the scroll API of a confirmed
//! service.
use crate::error::{Error, Result};
use crate::filter::Record;
use crate::service::ServiceClient;
use chrono::{DateTime, Utc};
use log::debug;
use serde_derive::Deserialize;
use serde_json::json;

/// How long the server keeps a cursor alive between page requests.
pub const DEFAULT_KEEP_ALIVE: &str = "180m";
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const SCROLL_PATH: &str = "/_search/scroll";

/// One batch of records plus the token that fetches the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub token: Option<String>,
    pub records: Vec<Record>,
    pub total: Option<u64>,
}

/// Server-side cursor state for one export call. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCursor {
    pub token: String,
    pub collection: String,
    pub started: DateTime<Utc>,
    pub page_size: usize,
}

impl ExportCursor {
    pub fn new(token: String, collection: &str, page_size: usize) -> Self {
        Self {
            token,
            collection: collection.to_owned(),
            started: Utc::now(),
            page_size,
        }
    }

    /// Adopts the token of a newer page; servers may rotate it.
    pub fn refresh(&mut self, page: &Page) {
        if let Some(token) = &page.token {
            self.token.clone_from(token);
        }
    }
}

/// A paged view of one collection.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    /// Opens a cursor and returns the first page.
    async fn open(&self, collection: &str, page_size: usize) -> Result<Page>;

    /// Fetches the page after `cursor`. An empty page means the end.
    async fn next(&self, cursor: &ExportCursor) -> Result<Page>;

    /// Releases the cursor on the server.
    async fn close(&self, cursor: &ExportCursor) -> Result<()>;
}

/// Newer servers report `{"value": n, "relation": "eq"}`, older ones a
/// bare number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

impl TotalHits {
    pub const fn value(self) -> u64 {
        match self {
            Self::Count(value) | Self::Object { value } => value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: Option<Record>,
}

impl From<SearchResponse> for Page {
    fn from(response: SearchResponse) -> Self {
        Self {
            token: response.scroll_id,
            total: response.hits.total.map(TotalHits::value),
            records: response
                .hits
                .hits
                .into_iter()
                .filter_map(|hit| hit.source)
                .collect(),
        }
    }
}

/// Scroll API pages read through a [`ServiceClient`].
#[derive(Debug, Clone)]
pub struct ScrollSource {
    client: ServiceClient,
    keep_alive: String,
}

impl ScrollSource {
    pub fn new(client: ServiceClient) -> Self {
        Self {
            client,
            keep_alive: DEFAULT_KEEP_ALIVE.to_owned(),
        }
    }

    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = keep_alive.into();
        self
    }

    pub const fn client(&self) -> &ServiceClient {
        &self.client
    }

    async fn read_page(&self, url: &str, request: reqwest::RequestBuilder) -> Result<Page> {
        let body = request
            .timeout(self.client.timeout())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let response: SearchResponse =
            serde_json::from_str(&body).map_err(|e| Error::Response {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(response.into())
    }
}

impl PageSource for ScrollSource {
    async fn open(&self, collection: &str, page_size: usize) -> Result<Page> {
        let mut url = self.client.collection_url(collection, "_search")?;
        url.query_pairs_mut()
            .append_pair("scroll", &self.keep_alive)
            .append_pair("size", &page_size.to_string());
        let url = String::from(url);
        debug!("Opening scroll on {url}");

        let request = self
            .client
            .http()
            .post(&url)
            .json(&json!({ "sort": ["_doc"] }));
        let page = self.read_page(&url, request).await?;

        if page.token.is_none() {
            return Err(Error::Response {
                url,
                reason: String::from("no scroll id in search response"),
            });
        }
        Ok(page)
    }

    async fn next(&self, cursor: &ExportCursor) -> Result<Page> {
        let url = self.client.url(SCROLL_PATH);
        let request = self.client.http().post(&url).json(&json!({
            "scroll": self.keep_alive,
            "scroll_id": cursor.token,
        }));
        self.read_page(&url, request).await
    }

    async fn close(&self, cursor: &ExportCursor) -> Result<()> {
        self.client
            .http()
            .delete(self.client.url(SCROLL_PATH))
            .json(&json!({ "scroll_id": [cursor.token] }))
            .timeout(self.client.timeout())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
