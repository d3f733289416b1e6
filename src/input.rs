//! Provides a means to read, parse and hold configuration options for a hunt.
use crate::address::RangeExpr;
use crate::error::{Error, Result};
use crate::export::{ExportFormat, RetryPolicy, DEFAULT_KEEP_ALIVE, DEFAULT_PAGE_SIZE};
use clap::Parser;
use serde_derive::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE_NAME: &str = ".elastichunt.toml";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "elastichunt",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Finds exposed Elasticsearch clusters in an address range, lists their
/// indices and optionally downloads them.
/// WARNING Only scan networks you are authorized to test.
pub struct Opts {
    /// CIDR (10.0.0.0/16), dashed range (10.0.0.1-10.0.3.255) or single
    /// address. In single mode, the host to download from.
    pub address_range: String,

    /// Port the service listens on.
    #[arg(default_value = "9200")]
    pub port: u16,

    /// Scan the range in stages of --stage-prefix sized networks.
    #[arg(short = 'S', long)]
    pub staged: bool,

    /// Network prefix length of each stage. Use with --staged.
    #[arg(long, default_value = "16")]
    pub stage_prefix: u8,

    /// Milliseconds before a host is assumed closed.
    #[arg(long, default_value = "1000")]
    pub scanner_timeout: u64,

    /// Maximum number of connection attempts in flight. Lowered to fit
    /// the open file limit of your OS.
    #[arg(short, long, default_value = "512")]
    pub workers: usize,

    /// Minimum number of batches the address list is split into.
    #[arg(long, default_value = "16")]
    pub max_subnets: usize,

    /// Maximum number of addresses per batch.
    #[arg(long, default_value = "256")]
    pub max_hosts: usize,

    /// Milliseconds before an HTTP request to a service is abandoned.
    #[arg(long, default_value = "1000")]
    pub service_timeout: u64,

    /// Root folder for downloaded indices.
    #[arg(short, long, default_value = ".")]
    pub download_path: PathBuf,

    /// JSON file with collection and record filters.
    #[arg(short, long)]
    pub filters: Option<PathBuf>,

    /// Download one index from the host given as address range.
    #[arg(short, long, requires = "collection")]
    pub single: bool,

    /// Index to download in single mode.
    #[arg(short = 'i', long)]
    pub collection: Option<String>,

    /// Field to download. Repeat once per field; all fields when omitted.
    #[arg(long = "field-name")]
    pub field_names: Vec<String>,

    /// File name (without extension) for the single download.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Output format of downloads: csv or jsonl.
    #[arg(short = 'F', long, default_value = "csv")]
    pub export_format: String,

    /// Sub folder of the download path, with percent substitutions:
    /// %Dn node name, %Cn cluster name, %Ci cluster id, %Vn version number,
    /// %Bf build flavor, %Bt build type, %Bs build snapshot, %Lv Lucene version.
    #[arg(long)]
    pub folder_format: Option<String>,

    /// Milliseconds; overrides both the scanner and the service timeout.
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Download every index that passes the filters.
    #[arg(short = 'D', long)]
    pub download: bool,

    /// Documents requested per page while downloading.
    #[arg(long, default_value = "1000")]
    pub page_size: usize,

    /// Attempts per page request before a download is abandoned.
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Milliseconds to wait between page request attempts.
    #[arg(long, default_value = "2000")]
    pub retry_delay: u64,

    /// How long the service keeps a download cursor alive between pages.
    #[arg(long, default_value = "180m")]
    pub keep_alive: String,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Hide the banner
    #[arg(long)]
    pub no_banner: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long)]
    pub ulimit: Option<u64>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        Self::parse()
    }

    /// Merges values found within the user configuration file, unless
    /// `--no-config` was given.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            port,
            staged,
            stage_prefix,
            scanner_timeout,
            workers,
            max_subnets,
            max_hosts,
            service_timeout,
            download_path,
            export_format,
            download,
            page_size,
            retries,
            retry_delay,
            keep_alive,
            accessible,
            no_banner
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(filters, folder_format, timeout, ulimit);
    }

    pub fn scanner_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.unwrap_or(self.scanner_timeout))
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.unwrap_or(self.service_timeout))
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retries, Duration::from_millis(self.retry_delay))
    }

    pub fn export_format(&self) -> Result<ExportFormat> {
        self.export_format.parse()
    }

    /// The one host a `--single` download talks to.
    pub fn single_host(&self) -> Result<Ipv4Addr> {
        match self.address_range.parse()? {
            RangeExpr::Host(host) => Ok(host),
            _ => Err(Error::config(format!(
                "--single needs one address, not the range '{}'",
                self.address_range.trim()
            ))),
        }
    }

    /// Catches bad values before anything touches the network.
    pub fn validate(&self) -> Result<()> {
        self.export_format()?;
        if self.workers == 0 {
            return Err(Error::config("--workers must be at least 1"));
        }
        if self.max_subnets == 0 || self.max_hosts == 0 {
            return Err(Error::config("--max-subnets and --max-hosts must be at least 1"));
        }
        if self.stage_prefix > 32 {
            return Err(Error::config(format!(
                "Stage prefix /{} is longer than 32 bits",
                self.stage_prefix
            )));
        }
        if self.single {
            if self.collection.is_none() {
                return Err(Error::config("--single needs --collection"));
            }
            self.single_host()?;
        }
        Ok(())
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            address_range: String::new(),
            port: 9200,
            staged: false,
            stage_prefix: 16,
            scanner_timeout: 1000,
            workers: 512,
            max_subnets: 16,
            max_hosts: 256,
            service_timeout: 1000,
            download_path: PathBuf::from("."),
            filters: None,
            single: false,
            collection: None,
            field_names: vec![],
            output: None,
            export_format: String::from("csv"),
            folder_format: None,
            timeout: None,
            download: false,
            page_size: DEFAULT_PAGE_SIZE,
            retries: 3,
            retry_delay: 2000,
            keep_alive: DEFAULT_KEEP_ALIVE.to_owned(),
            no_config: false,
            no_banner: false,
            config_path: None,
            accessible: false,
            ulimit: None,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    port: Option<u16>,
    staged: Option<bool>,
    stage_prefix: Option<u8>,
    scanner_timeout: Option<u64>,
    workers: Option<usize>,
    max_subnets: Option<usize>,
    max_hosts: Option<usize>,
    service_timeout: Option<u64>,
    download_path: Option<PathBuf>,
    filters: Option<PathBuf>,
    export_format: Option<String>,
    folder_format: Option<String>,
    timeout: Option<u64>,
    download: Option<bool>,
    page_size: Option<usize>,
    retries: Option<u32>,
    retry_delay: Option<u64>,
    keep_alive: Option<String>,
    accessible: Option<bool>,
    no_banner: Option<bool>,
    ulimit: Option<u64>,
}

#[cfg(not(tarpaulin_include))]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file yields an empty config.
    ///
    /// # Format
    ///
    /// workers = 1024
    /// scanner_timeout = 500
    /// download_path = "/srv/loot"
    /// export_format = "jsonl"
    /// folder_format = "%Cn/%Vn"
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self> {
        let Some(config_path) = custom_config_path.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content =
            fs::read_to_string(&config_path).map_err(|e| Error::io(&config_path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::config(format!("Found {e} in configuration file")))
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(CONFIG_FILE_NAME);
    Some(config_path)
}
