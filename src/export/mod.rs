//! Bulk export of whole collections through a server-side cursor.
//!
//! An export walks `Init → OpenCursor → Streaming → Closed`, or ends in
//! `Failed`. Opening is attempted once; each following page request goes
//! through the [`RetryPolicy`]. Pages within a collection are strictly
//! sequential, while [`Exporter::export_all`] runs several collections at
//! once.
//!
//! ```no_run
//! # async fn run() -> elastichunt::error::Result<()> {
//! use elastichunt::export::{ExportFormat, ExportJob, Exporter, ScrollSource};
//! use elastichunt::service::ServiceClient;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! let client = ServiceClient::new("http://10.0.0.5:9200", Duration::from_secs(30))?;
//! let exporter = Exporter::new(ScrollSource::new(client));
//! let job = ExportJob::new("users", Path::new("loot"), None, ExportFormat::Csv);
//! let report = exporter.export(&job).await?;
//! println!("{} records in {}", report.exported, report.path.display());
//! # Ok(())
//! # }
//! ```
mod retry;
mod sink;
mod source;

pub use retry::{Backoff, Exhausted, RetryPolicy};
pub use sink::{project, RecordSink};
pub use source::{
    ExportCursor, Page, PageSource, ScrollSource, TotalHits, DEFAULT_KEEP_ALIVE,
    DEFAULT_PAGE_SIZE, SCROLL_PATH,
};

use crate::error::{Error, Result};
use crate::filter::{FilterChain, RecordFilter};
use crate::template::path_component;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Jsonl,
}

impl ExportFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "jsonl" | "json" => Ok(Self::Jsonl),
            other => Err(Error::config(format!(
                "Unsupported export format '{other}', expected 'csv' or 'jsonl'"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One collection to export and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub collection: String,
    pub destination: PathBuf,
    pub projection: Option<Vec<String>>,
    pub format: ExportFormat,
}

impl ExportJob {
    /// Destination is `<root>[/<subfolder>]/<collection>.<ext>`. The
    /// collection name comes from the scanned server, so it is reduced to a
    /// single [`path_component`] before it touches the path.
    pub fn new(
        collection: &str,
        root: &Path,
        subfolder: Option<&str>,
        format: ExportFormat,
    ) -> Self {
        let mut destination = root.to_path_buf();
        if let Some(sub) = subfolder.filter(|s| !s.is_empty()) {
            destination.push(sub);
        }
        destination.push(format!(
            "{}.{}",
            path_component(collection),
            format.extension()
        ));

        Self {
            collection: collection.to_owned(),
            destination,
            projection: None,
            format,
        }
    }

    /// Writes to `file_name` (extension added) instead of the collection
    /// name.
    #[must_use]
    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.destination
            .set_file_name(format!("{file_name}.{}", self.format.extension()));
        self
    }

    /// An empty projection means "all fields".
    #[must_use]
    pub fn with_projection(mut self, fields: Vec<String>) -> Self {
        self.projection = if fields.is_empty() { None } else { Some(fields) };
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Init,
    OpenCursor,
    Streaming,
    Closed,
    Failed,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::OpenCursor => "open-cursor",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a finished export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub collection: String,
    pub path: PathBuf,
    /// Records written after record filters.
    pub exported: u64,
    /// Records the server reported, if it did.
    pub total: Option<u64>,
    pub pages: u32,
}

/// Drives exports over any [`PageSource`].
#[derive(Debug)]
pub struct Exporter<S> {
    source: S,
    page_size: usize,
    retry: RetryPolicy,
    records: FilterChain<RecordFilter>,
    show_progress: bool,
}

impl<S: PageSource> Exporter<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
            records: FilterChain::new(),
            show_progress: false,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_record_filters(mut self, records: FilterChain<RecordFilter>) -> Self {
        self.records = records;
        self
    }

    #[must_use]
    pub const fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Exports every job, up to `concurrency` at a time. Results come back
    /// in completion order.
    pub async fn export_all(
        &self,
        jobs: Vec<ExportJob>,
        concurrency: usize,
    ) -> Vec<(ExportJob, Result<ExportReport>)> {
        stream::iter(jobs)
            .map(|job| async move {
                let result = self.export(&job).await;
                (job, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    /// Exports one collection. On a paging failure the file keeps every page
    /// written before it.
    pub async fn export(&self, job: &ExportJob) -> Result<ExportReport> {
        let collection = job.collection.as_str();
        let mut state = ExportState::Init;
        transition(collection, &mut state, ExportState::OpenCursor);

        let first = match self.source.open(collection, self.page_size).await {
            Ok(page) => page,
            Err(e) => {
                transition(collection, &mut state, ExportState::Failed);
                return Err(e);
            }
        };
        let mut cursor =
            ExportCursor::new(first.token.clone().unwrap_or_default(), collection, self.page_size);
        let total = first.total;

        let mut sink =
            RecordSink::create(&job.destination, job.format, job.projection.as_deref()).await?;
        let progress = self.progress_bar(collection, total);
        transition(collection, &mut state, ExportState::Streaming);

        let streamed = self.stream(first, &mut cursor, &mut sink, &progress).await;
        progress.finish_and_clear();

        let pages = match streamed {
            Ok(pages) => pages,
            Err(e) => {
                transition(collection, &mut state, ExportState::Failed);
                if let Err(flush) = sink.finish().await {
                    warn!("Could not flush partial export of {collection}: {flush}");
                }
                return Err(e);
            }
        };

        let exported = sink.finish().await?;
        transition(collection, &mut state, ExportState::Closed);
        if let Err(e) = self.source.close(&cursor).await {
            debug!("Releasing cursor of {collection} failed: {e}");
        }

        info!(
            "Exported {exported} record(s) of {collection} to {}",
            job.destination.display()
        );
        Ok(ExportReport {
            collection: collection.to_owned(),
            path: job.destination.clone(),
            exported,
            total,
            pages,
        })
    }

    /// Writes `first` and every following page until an empty one.
    async fn stream(
        &self,
        first: Page,
        cursor: &mut ExportCursor,
        sink: &mut RecordSink,
        progress: &ProgressBar,
    ) -> Result<u32> {
        let mut pages = 0;
        let mut page = first;

        while !page.records.is_empty() {
            pages += 1;
            progress.inc(page.records.len() as u64);
            let kept = self.records.apply(page.records)?;
            sink.write_page(&kept).await?;

            let current: &ExportCursor = cursor;
            page = self
                .retry
                .run(|_| self.source.next(current))
                .await
                .map_err(|Exhausted { attempts, last }| Error::Paging {
                    collection: cursor.collection.clone(),
                    attempts,
                    source: Box::new(last),
                })?;
            cursor.refresh(&page);
        }
        Ok(pages)
    }

    fn progress_bar(&self, collection: &str, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = total.map_or_else(ProgressBar::no_length, ProgressBar::new);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(collection.to_owned());
        bar
    }
}

fn transition(collection: &str, state: &mut ExportState, next: ExportState) {
    debug!("Export of {collection}: {state} -> {next}");
    *state = next;
}
