//! This crate exposes the internal functionality of the ElasticHunt
//! Elasticsearch discovery and export tool.
//!
//! ElasticHunt sweeps an IPv4 range for a port, confirms which open hosts
//! are Elasticsearch services, lists the indices they expose without
//! authentication and can download those indices to CSV or JSON-lines
//! files.
//!
//! ## Architecture Overview
//!
//! A hunt flows through these stages:
//!
//! 1. **Range expansion**: [`address`] turns CIDR, dashed and single-host
//!    expressions into addresses and batches.
//! 2. **Host scanning**: [`Scanner`](crate::scanner::Scanner) probes every
//!    address with a bounded pool of TCP connects.
//! 3. **Detection and metadata**: [`ServiceClient`](crate::service::ServiceClient)
//!    checks the `_cat` sentinel, then reads the cluster identity, the index
//!    catalog and index mappings.
//! 4. **Filtering**: [`filter`] narrows the catalog and the downloaded
//!    records.
//! 5. **Export**: [`Exporter`](crate::export::Exporter) pages through an
//!    index with a scroll cursor and writes every page to disk.
//!
//! [`Hunt`](crate::hunt::Hunt) wires the stages together for the binary.
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use elastichunt::address::parse_range;
//! use elastichunt::scanner::Scanner;
//! use elastichunt::service::ServiceClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let addrs = parse_range("192.168.1.0/24")?;
//!     let scanner = Scanner::new(&addrs, 9200, Duration::from_millis(500), 256);
//!
//!     for candidate in scanner.run().await? {
//!         let client = ServiceClient::for_candidate(&candidate, Duration::from_secs(2))?;
//!         if client.is_service().await {
//!             let metadata = client.metadata().await;
//!             println!("{candidate}: {} indices", metadata.collections.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod error;

pub mod address;

pub mod input;

pub mod scanner;

pub mod service;

pub mod filter;

pub mod export;

pub mod template;

pub mod hunt;

#[cfg(test)]
mod test_support;
