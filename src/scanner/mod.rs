//! Core functionality for finding hosts with the target port open.
use crate::address::partition;
use crate::error::Result;
use log::debug;

mod progress;
pub use progress::ScanProgress;

use futures::{stream, StreamExt};
use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::{
    io::{self, AsyncWriteExt},
    net::TcpStream,
    time,
};

/// A host that accepted a TCP connection on the scanned port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub address: IpAddr,
    pub port: u16,
}

impl Candidate {
    pub const fn socket(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Base URL for HTTP requests against this candidate.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.socket())
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket())
    }
}

#[derive(Debug)]
struct ScannerConnector {
    port: u16,
    timeout: Duration,
}

impl ScannerConnector {
    /// Probes one address exactly once. Refusals and timeouts are not
    /// errors for the caller, they just produce no candidate.
    async fn probe(&self, address: Ipv4Addr) -> Option<Candidate> {
        let socket = SocketAddr::new(IpAddr::V4(address), self.port);
        match self.connect(socket).await {
            Ok(tcp_stream) => {
                debug!("Connection was successful, shutting down stream {socket}");
                if let Err(e) = { tcp_stream }.shutdown().await {
                    debug!("Shutdown stream error {e}");
                }
                Some(Candidate {
                    address: socket.ip(),
                    port: socket.port(),
                })
            }
            Err(e) => {
                debug!("Probe of {socket} failed: {e}");
                None
            }
        }
    }

    /// Performs the connection to the socket with timeout
    async fn connect(&self, socket: SocketAddr) -> io::Result<TcpStream> {
        time::timeout(self.timeout, TcpStream::connect(socket))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?
    }
}

/// Scans a list of addresses for one open port.
///
/// `workers` is the hard bound on simultaneous connection attempts. The
/// address list is split into batches (at least `max_subnets`, each holding
/// no more than `max_hosts_per_subnet` addresses) that feed a single lazy
/// queue, so the number of scheduled addresses never turns into the number
/// of open sockets.
#[derive(Debug)]
pub struct Scanner {
    ips: Box<[Ipv4Addr]>,
    workers: usize,
    max_subnets: usize,
    max_hosts_per_subnet: usize,
    connector: ScannerConnector,
    progress: ScanProgress,
}

impl Scanner {
    pub fn new(ips: &[Ipv4Addr], port: u16, timeout: Duration, workers: usize) -> Self {
        Self {
            ips: Box::from(ips),
            workers: workers.max(1),
            max_subnets: 16,
            max_hosts_per_subnet: 256,
            connector: ScannerConnector { port, timeout },
            progress: ScanProgress::hidden(ips.len() as u64),
        }
    }

    #[must_use]
    pub fn with_batching(mut self, max_subnets: usize, max_hosts_per_subnet: usize) -> Self {
        self.max_subnets = max_subnets.max(1);
        self.max_hosts_per_subnet = max_hosts_per_subnet.max(1);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ScanProgress) -> Self {
        self.progress = progress;
        self
    }

    pub const fn progress(&self) -> &ScanProgress {
        &self.progress
    }

    fn batch_count(&self) -> usize {
        self.ips
            .len()
            .div_ceil(self.max_hosts_per_subnet)
            .max(self.max_subnets)
    }

    /// Probes every address exactly once and returns the hosts that
    /// answered. Completion order is whatever the network gives us.
    pub async fn run(&self) -> Result<Vec<Candidate>> {
        let batches = partition(&self.ips, self.batch_count())?;

        debug!(
            "Start scanning hosts.\nWorkers {}\nBatches {}\nNumber of ip-s {}\nPort {}",
            self.workers,
            batches.len(),
            self.ips.len(),
            self.connector.port
        );

        let connector = &self.connector;
        let progress = &self.progress;
        let candidates = stream::iter(batches)
            .flat_map(stream::iter)
            .map(|address| async move {
                let _guard = progress.start();
                connector.probe(address).await
            })
            .buffer_unordered(self.workers)
            .filter_map(|candidate| async move {
                if let Some(candidate) = candidate {
                    progress.found(candidate);
                }
                candidate
            })
            .collect::<Vec<_>>()
            .await;

        progress.finish();
        debug!(
            "Open hosts found: {:?} (peak concurrency {})",
            &candidates,
            progress.peak_in_flight()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::parse_range;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn finds_open_port() {
        let (_listener, port) = listener().await;
        let addrs = vec!["127.0.0.1".parse::<Ipv4Addr>().unwrap()];
        let scanner = Scanner::new(&addrs, port, Duration::from_millis(500), 4);

        let candidates = scanner.run().await.unwrap();

        assert_eq!(
            candidates,
            [Candidate {
                address: "127.0.0.1".parse().unwrap(),
                port
            }]
        );
        assert_eq!(scanner.progress().processed(), 1);
        assert_eq!(scanner.progress().found_count(), 1);
    }

    #[tokio::test]
    async fn closed_hosts_are_counted_not_reported() {
        let (_listener, port) = listener().await;
        let addrs = parse_range("127.0.0.1-127.0.0.3").unwrap();
        let scanner = Scanner::new(&addrs, port, Duration::from_millis(300), 2);

        let candidates = scanner.run().await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(scanner.progress().processed(), 3);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_workers() {
        let (_listener, port) = listener().await;
        let addrs = parse_range("127.0.0.0/26").unwrap();
        let scanner = Scanner::new(&addrs, port, Duration::from_millis(200), 4)
            .with_batching(3, 8);

        scanner.run().await.unwrap();

        assert_eq!(scanner.progress().processed(), 64);
        assert!(scanner.progress().peak_in_flight() <= 4);
        assert!(scanner.progress().peak_in_flight() >= 1);
    }

    #[tokio::test]
    async fn empty_scan_is_empty() {
        let scanner = Scanner::new(&[], 9200, Duration::from_millis(100), 4);
        assert!(scanner.run().await.unwrap().is_empty());
        assert_eq!(scanner.progress().processed(), 0);
    }

    #[test]
    fn batches_grow_past_max_subnets_when_hosts_overflow() {
        let addrs = parse_range("10.0.0.0/22").unwrap();
        let scanner =
            Scanner::new(&addrs, 9200, Duration::from_millis(100), 4).with_batching(2, 256);
        assert_eq!(scanner.batch_count(), 4);

        let scanner =
            Scanner::new(&addrs, 9200, Duration::from_millis(100), 4).with_batching(16, 256);
        assert_eq!(scanner.batch_count(), 16);
    }

    #[test]
    fn candidate_url() {
        let candidate = Candidate {
            address: "10.1.1.1".parse().unwrap(),
            port: 9200,
        };
        assert_eq!(candidate.base_url(), "http://10.1.1.1:9200");
        assert_eq!(candidate.to_string(), "10.1.1.1:9200");
    }
}
