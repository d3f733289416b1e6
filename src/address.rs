//! Provides functions to parse and expand IPv4 range expressions.
//!
//! Three notations are understood:
//!
//! - CIDR, `192.168.0.0/24` (host bits are masked off, so `192.168.0.7/24`
//!   denotes the same block)
//! - a dashed pair, `10.0.0.5-10.0.1.20`
//! - a single address, `127.0.0.1`
//!
//! ```rust
//! # use elastichunt::address::parse_range;
//! let ips = parse_range("192.168.0.0/30").unwrap();
//! assert_eq!(ips.len(), 4);
//! ```
use std::net::Ipv4Addr;
use std::str::FromStr;

use cidr_utils::cidr::Ipv4Cidr;
use itertools::Itertools;

use crate::error::{Error, Result};

/// A parsed range expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeExpr {
    Cidr(Ipv4Cidr),
    Dashed { start: Ipv4Addr, end: Ipv4Addr },
    Host(Ipv4Addr),
}

impl FromStr for RangeExpr {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::config("Empty address range"));
        }

        if let Some((addr, prefix)) = input.split_once('/') {
            let addr = parse_ipv4(addr, input)?;
            let prefix: u8 = prefix.trim().parse().map_err(|_| {
                Error::config(format!("Invalid prefix length in '{input}'"))
            })?;
            return Ok(Self::Cidr(block(u32::from(addr), prefix)?));
        }

        if let Some((start, end)) = input.split_once('-') {
            let start = parse_ipv4(start, input)?;
            let end = parse_ipv4(end, input)?;
            if start > end {
                return Err(Error::config(format!(
                    "Start address {start} is greater than end address {end} in '{input}'"
                )));
            }
            return Ok(Self::Dashed { start, end });
        }

        parse_ipv4(input, input).map(Self::Host)
    }
}

impl RangeExpr {
    /// First and last address denoted by the expression, inclusive.
    pub fn bounds(&self) -> (Ipv4Addr, Ipv4Addr) {
        match *self {
            Self::Cidr(cidr) => (cidr.first_address(), cidr.last_address()),
            Self::Dashed { start, end } => (start, end),
            Self::Host(addr) => (addr, addr),
        }
    }

    /// Number of addresses the expression denotes.
    pub fn len(&self) -> u64 {
        let (start, end) = self.bounds();
        u64::from(u32::from(end)) - u64::from(u32::from(start)) + 1
    }

    /// Always false, every expression denotes at least one address.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The minimal set of CIDR blocks that exactly covers the expression.
    pub fn blocks(&self) -> Result<Vec<Ipv4Cidr>> {
        match *self {
            Self::Cidr(cidr) => Ok(vec![cidr]),
            Self::Dashed { start, end } => summarize(start, end),
            Self::Host(addr) => Ok(vec![block(u32::from(addr), 32)?]),
        }
    }

    /// Every address in ascending order, network and broadcast included.
    pub fn addresses(&self) -> Result<Vec<Ipv4Addr>> {
        Ok(self
            .blocks()?
            .iter()
            .flat_map(|cidr| cidr.iter().map(|inet| inet.address()))
            .collect())
    }

    /// The smallest single network containing both ends of the expression.
    ///
    /// The prefix is the number of leading bits the first and last address
    /// share, so a dashed range may be widened on either side.
    pub fn covering_network(&self) -> Result<Ipv4Cidr> {
        if let Self::Cidr(cidr) = self {
            return Ok(*cidr);
        }
        let (start, end) = self.bounds();
        let (start, end) = (u32::from(start), u32::from(end));
        let common = (start ^ end).leading_zeros();
        block(start, u8::try_from(common).unwrap_or(32))
    }

    /// Splits the covering network into every sub-network of `prefix` bits.
    ///
    /// Used by staged scans, where chunks should line up with network
    /// boundaries rather than be equally sized.
    pub fn stages(&self, prefix: u8) -> Result<Vec<Ipv4Cidr>> {
        if prefix > 32 {
            return Err(Error::config(format!(
                "Stage prefix /{prefix} is longer than 32 bits"
            )));
        }
        let network = self.covering_network()?;
        let own = network.network_length();
        if prefix < own {
            return Err(Error::config(format!(
                "Stage prefix /{prefix} is shorter than the network prefix /{own}"
            )));
        }

        let first = u64::from(u32::from(network.first_address()));
        let step = 1u64 << (32 - u32::from(prefix));
        let count = 1u64 << u32::from(prefix - own);

        (0..count)
            .map(|i| {
                let addr = u32::try_from(first + i * step)
                    .map_err(|_| Error::config("Stage address overflow"))?;
                block(addr, prefix)
            })
            .collect()
    }
}

fn parse_ipv4(addr: &str, input: &str) -> Result<Ipv4Addr> {
    Ipv4Addr::from_str(addr.trim())
        .map_err(|_| Error::config(format!("Invalid IPv4 address '{}' in '{input}'", addr.trim())))
}

fn netmask(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

/// Builds the block of `prefix` bits containing `addr`.
fn block(addr: u32, prefix: u8) -> Result<Ipv4Cidr> {
    if prefix > 32 {
        return Err(Error::config(format!("Invalid prefix length /{prefix}")));
    }
    Ipv4Cidr::new(Ipv4Addr::from(addr & netmask(prefix)), prefix)
        .map_err(|e| Error::config(format!("Invalid network: {e}")))
}

/// Summarizes `start..=end` into the fewest aligned CIDR blocks.
pub fn summarize(start: Ipv4Addr, end: Ipv4Addr) -> Result<Vec<Ipv4Cidr>> {
    let mut current = u64::from(u32::from(start));
    let end = u64::from(u32::from(end));
    let mut blocks = Vec::new();

    while current <= end {
        let alignment = current.trailing_zeros().min(32);
        let span = end - current + 1;
        let fits = 63 - span.leading_zeros();
        let host_bits = alignment.min(fits);

        let addr = u32::try_from(current).map_err(|_| Error::config("Address overflow"))?;
        let prefix = u8::try_from(32 - host_bits).unwrap_or(0);
        blocks.push(block(addr, prefix)?);

        current += 1u64 << host_bits;
    }

    Ok(blocks)
}

/// Expands a single range expression into its addresses.
pub fn parse_range(input: &str) -> Result<Vec<Ipv4Addr>> {
    RangeExpr::from_str(input)?.addresses()
}

/// Expands several expressions, keeping first-seen order and dropping
/// addresses that appear more than once.
pub fn parse_ranges<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Ipv4Addr>> {
    let mut addresses = Vec::new();
    for input in inputs {
        addresses.extend(parse_range(input.as_ref())?);
    }
    Ok(addresses.into_iter().unique().collect())
}

/// Splits `items` into `count` ordered batches whose sizes differ by at
/// most one. The first `len % count` batches carry the extra element.
///
/// Fewer than `count` batches are returned only when there are fewer items
/// than batches, so no batch is ever empty.
pub fn partition<T: Clone>(items: &[T], count: usize) -> Result<Vec<Vec<T>>> {
    if count == 0 {
        return Err(Error::config("Batch count must be at least 1"));
    }
    let count = count.min(items.len());
    if count == 0 {
        return Ok(Vec::new());
    }

    let base = items.len() / count;
    let remainder = items.len() % count;
    let mut batches = Vec::with_capacity(count);
    let mut offset = 0;
    for i in 0..count {
        let size = base + usize::from(i < remainder);
        batches.push(items[offset..offset + size].to_vec());
        offset += size;
    }

    Ok(batches)
}
