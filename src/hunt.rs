//! One hunt from range to files: scan, detect, catalog, filter, export.
use crate::address::RangeExpr;
use crate::error::{Error, Result};
use crate::export::{ExportFormat, ExportJob, ExportReport, Exporter, ScrollSource};
use crate::filter::FilterSet;
use crate::input::Opts;
use crate::scanner::{Candidate, ScanProgress, Scanner};
use crate::service::{ServiceClient, ServiceMetadata};
use crate::template::FolderTemplate;
use crate::{detail, output, warning};
use comfy_table::{Cell, Table};
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::net::Ipv4Addr;

/// Candidates fingerprinted at the same time.
const DETECT_CONCURRENCY: usize = 32;
/// Collections of one service downloaded at the same time.
const EXPORT_CONCURRENCY: usize = 4;

/// Everything learned about one confirmed service.
#[derive(Debug)]
pub struct ServiceReport {
    pub candidate: Candidate,
    pub base_url: String,
    /// Identity plus the collections that passed the filters.
    pub metadata: ServiceMetadata,
    pub exports: Vec<(ExportJob, Result<ExportReport>)>,
}

#[derive(Debug)]
pub struct Hunt {
    opts: Opts,
    filters: FilterSet,
    format: ExportFormat,
}

impl Hunt {
    /// Validates the options and loads the filter file. Every configuration
    /// problem surfaces here, before the first packet is sent.
    pub fn new(opts: Opts) -> Result<Self> {
        opts.validate()?;
        let filters = match &opts.filters {
            Some(path) => FilterSet::load(path)?,
            None => FilterSet::default(),
        };
        let format = opts.export_format()?;
        Ok(Self {
            opts,
            filters,
            format,
        })
    }

    #[must_use]
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub const fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Scans, then inspects every open host. Only confirmed services are
    /// returned.
    pub async fn run(&self) -> Result<Vec<ServiceReport>> {
        let candidates = self.scan().await?;
        detail!(
            format!("Checking {} open host(s)...", candidates.len()),
            false,
            self.opts.accessible
        );

        let reports: Vec<ServiceReport> = stream::iter(candidates)
            .map(|candidate| self.inspect(candidate))
            .buffer_unordered(DETECT_CONCURRENCY)
            .filter_map(|report| async move { report })
            .collect()
            .await;
        Ok(reports)
    }

    /// Finds the hosts with the port open, in one pass or stage by stage.
    pub async fn scan(&self) -> Result<Vec<Candidate>> {
        let range: RangeExpr = self.opts.address_range.parse()?;
        if !self.opts.staged {
            detail!(
                "Scanning for hosts... (This may take a few minutes)",
                false,
                self.opts.accessible
            );
            return self.scan_addresses(&range.addresses()?).await;
        }

        let stages = range.stages(self.opts.stage_prefix)?;
        detail!(
            format!("Prepared {} stage(s) for scanning", stages.len()),
            false,
            self.opts.accessible
        );

        let mut candidates = Vec::new();
        for (i, stage) in stages.into_iter().enumerate() {
            debug!("Stage {}: {stage}", i + 1);
            let addresses = RangeExpr::Cidr(stage).addresses()?;
            candidates.extend(self.scan_addresses(&addresses).await?);
        }
        Ok(candidates)
    }

    async fn scan_addresses(&self, addresses: &[Ipv4Addr]) -> Result<Vec<Candidate>> {
        let progress = if self.opts.accessible {
            ScanProgress::hidden(addresses.len() as u64)
        } else {
            ScanProgress::new(addresses.len() as u64, false)
        };

        Scanner::new(
            addresses,
            self.opts.port,
            self.opts.scanner_timeout(),
            self.opts.workers,
        )
        .with_batching(self.opts.max_subnets, self.opts.max_hosts)
        .with_progress(progress)
        .run()
        .await
    }

    /// Detects, catalogs and filters one candidate, then downloads its
    /// collections if asked to. `None` when it is not the service.
    pub async fn inspect(&self, candidate: Candidate) -> Option<ServiceReport> {
        let client = match ServiceClient::for_candidate(&candidate, self.opts.service_timeout()) {
            Ok(client) => client,
            Err(e) => {
                warn!("Cannot build a client for {candidate}: {e}");
                return None;
            }
        };
        if !client.is_service().await {
            debug!("{candidate} is not an Elasticsearch service");
            return None;
        }

        let mut metadata = client.metadata().await;
        let collections = std::mem::take(&mut metadata.collections);
        metadata.collections = self
            .filters
            .collections
            .apply(collections)
            .unwrap_or_else(|e| {
                warn!("Filtering the collections of {candidate} failed: {e}");
                Vec::new()
            });

        output!(
            collection_table(client.base_url(), &metadata),
            false,
            self.opts.accessible
        );

        let exports = if self.opts.download && !metadata.collections.is_empty() {
            self.download_collections(&client, &metadata).await
        } else {
            Vec::new()
        };

        Some(ServiceReport {
            candidate,
            base_url: client.base_url().to_owned(),
            metadata,
            exports,
        })
    }

    async fn download_collections(
        &self,
        client: &ServiceClient,
        metadata: &ServiceMetadata,
    ) -> Vec<(ExportJob, Result<ExportReport>)> {
        let subfolder = self
            .opts
            .folder_format
            .as_ref()
            .map(|format| FolderTemplate::new(format.as_str()).render(&metadata.identity));

        let mut jobs = Vec::with_capacity(metadata.collections.len());
        for collection in &metadata.collections {
            let fields = client.field_names(&collection.name).await;
            jobs.push(
                ExportJob::new(
                    &collection.name,
                    &self.opts.download_path,
                    subfolder.as_deref(),
                    self.format,
                )
                .with_projection(fields),
            );
        }

        let results = self
            .exporter(client.clone())
            .export_all(jobs, EXPORT_CONCURRENCY)
            .await;
        for (job, result) in &results {
            self.report_export(job, result);
        }
        results
    }

    /// Downloads the one collection named on the command line from the host
    /// given as address range.
    pub async fn download_single(&self) -> Result<ExportReport> {
        let collection = self
            .opts
            .collection
            .as_deref()
            .ok_or_else(|| Error::config("--single needs --collection"))?;
        let base_url = format!("http://{}:{}", self.opts.single_host()?, self.opts.port);
        let client = ServiceClient::new(base_url, self.opts.service_timeout())?;

        let subfolder = match &self.opts.folder_format {
            Some(format) => {
                let identity = client.identity().await.unwrap_or_else(|e| {
                    warn!("Error retrieving cluster information: {e}");
                    Default::default()
                });
                Some(FolderTemplate::new(format.as_str()).render(&identity))
            }
            None => None,
        };

        let fields = if self.opts.field_names.is_empty() {
            client.field_names(collection).await
        } else {
            self.opts.field_names.clone()
        };

        let mut job = ExportJob::new(
            collection,
            &self.opts.download_path,
            subfolder.as_deref(),
            self.format,
        )
        .with_projection(fields);
        if let Some(name) = &self.opts.output {
            job = job.with_file_name(name);
        }

        let result = self.exporter(client).export(&job).await;
        self.report_export(&job, &result);
        result
    }

    fn exporter(&self, client: ServiceClient) -> Exporter<ScrollSource> {
        Exporter::new(ScrollSource::new(client).with_keep_alive(self.opts.keep_alive.as_str()))
            .with_page_size(self.opts.page_size)
            .with_retry(self.opts.retry_policy())
            .with_record_filters(self.filters.records.clone())
            .with_progress(!self.opts.accessible)
    }

    fn report_export(&self, job: &ExportJob, result: &Result<ExportReport>) {
        match result {
            Ok(report) => {
                output!(
                    format!(
                        "Saved {} record(s) of {} to {}",
                        report.exported,
                        report.collection,
                        report.path.display()
                    ),
                    false,
                    self.opts.accessible
                );
            }
            Err(e) => {
                warning!(
                    format!("Download of {} failed: {e}", job.collection),
                    false,
                    self.opts.accessible
                );
            }
        }
    }
}

/// Renders the retained collections of one service, titled
/// `{base_url} | {node name}`.
pub fn collection_table(base_url: &str, metadata: &ServiceMetadata) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Index", "Docs Count", "Store Size", "Search URL"]);
    for collection in &metadata.collections {
        table.add_row(vec![
            Cell::new(&collection.name),
            Cell::new(&collection.doc_count),
            Cell::new(&collection.store_size),
            Cell::new(format!("{base_url}/{}/_search", collection.name)),
        ]);
    }
    format!(
        "{base_url} | {}\n{table}",
        metadata.identity.service_name
    )
}
