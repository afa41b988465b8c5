//! Bloom filter over packed IP addresses.
//!
//! Populated by the indexer with the 4/16-byte address of every source and
//! destination host seen, stored as a sidecar next to the index, and consulted
//! before extraction to skip indexes that cannot hold a requested host.

use std::collections::HashSet;
use std::fs::File;
use std::hash::Hasher;
use std::io::{BufReader, BufWriter, Write};
use std::net::IpAddr;
use std::path::Path;

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SECOND_HASH_KEY: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Error)]
pub enum BloomError {
    #[error("invalid false positive rate {rate}: must be within (0, 1)")]
    InvalidRate { rate: f64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bloom sidecar error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bloom sidecar is inconsistent: {bits} bytes for {num_bits} bits")]
    Inconsistent { bits: usize, num_bits: u64 },
}

/// Fixed-size bit array probed by `num_hashes` derived hashes.
///
/// # Examples
/// ```
/// use pichi_core::BloomFilter;
///
/// let mut bloom = BloomFilter::with_capacity(100, 0.01)?;
/// bloom.insert(&[10, 0, 0, 1]);
/// assert!(bloom.contains(&[10, 0, 0, 1]));
/// # Ok::<(), pichi_core::BloomError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloomFilter {
    num_bits: u64,
    num_hashes: u32,
    items: u64,
    target_rate: f64,
    bits: Vec<u8>,
}

/// Result of `BloomFilter::efficiency`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BloomEfficiency {
    /// Known members reported absent; always zero for a sound filter.
    pub false_negatives: u64,
    /// Fraction of probed non-members reported present.
    pub false_positive_rate: f64,
    /// Rate the filter was sized for.
    pub target_rate: f64,
}

impl BloomEfficiency {
    pub fn within_target(&self, tolerance: f64) -> bool {
        self.false_negatives == 0 && self.false_positive_rate <= self.target_rate * tolerance
    }
}

impl BloomFilter {
    /// Size a filter for `capacity` items at false positive rate `rate`.
    ///
    /// Uses `m = -n ln p / (ln 2)^2` bits and `k = m/n ln 2` hashes. An empty
    /// capacity still yields a usable one-item filter.
    pub fn with_capacity(capacity: usize, rate: f64) -> Result<Self, BloomError> {
        Self::validate_rate(rate)?;
        let n = capacity.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let num_bits = ((-n * rate.ln()) / (ln2 * ln2)).ceil().max(8.0) as u64;
        let num_hashes = ((num_bits as f64 / n) * ln2).round().max(1.0) as u32;
        Ok(Self {
            num_bits,
            num_hashes,
            items: 0,
            target_rate: rate,
            bits: vec![0; num_bits.div_ceil(8) as usize],
        })
    }

    pub fn validate_rate(rate: f64) -> Result<(), BloomError> {
        if rate > 0.0 && rate < 1.0 {
            Ok(())
        } else {
            Err(BloomError::InvalidRate { rate })
        }
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Number of insertions performed.
    pub fn len(&self) -> u64 {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    pub fn insert(&mut self, item: &[u8]) {
        for bit in self.probes(item) {
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
        self.items += 1;
    }

    pub fn update<I, T>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        for item in items {
            self.insert(item.as_ref());
        }
    }

    pub fn contains(&self, item: &[u8]) -> bool {
        self.probes(item)
            .all(|bit| self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0)
    }

    pub fn contains_addr(&self, addr: &IpAddr) -> bool {
        self.contains(&packed(addr))
    }

    fn probes(&self, item: &[u8]) -> impl Iterator<Item = u64> + use<> {
        let h1 = mix(fnv(item, None));
        let h2 = mix(fnv(item, Some(SECOND_HASH_KEY))) | 1;
        let num_bits = self.num_bits;
        (0..u64::from(self.num_hashes))
            .map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
    }

    /// Measure the filter against a known member set.
    ///
    /// Every member must test positive; `trials` synthetic non-members (16-byte
    /// strings never equal to a member) estimate the false positive rate.
    pub fn efficiency(&self, members: &HashSet<Vec<u8>>, trials: u64) -> BloomEfficiency {
        let false_negatives = members
            .iter()
            .filter(|item| !self.contains(item))
            .count() as u64;
        let mut probed = 0u64;
        let mut positives = 0u64;
        let mut counter = 0u64;
        while probed < trials {
            counter += 1;
            let mut candidate = b"pichi-probe:".to_vec();
            candidate.extend_from_slice(&counter.to_be_bytes()[4..]);
            if members.contains(&candidate) {
                continue;
            }
            probed += 1;
            if self.contains(&candidate) {
                positives += 1;
            }
        }
        BloomEfficiency {
            false_negatives,
            false_positive_rate: if trials == 0 {
                0.0
            } else {
                positives as f64 / trials as f64
            },
            target_rate: self.target_rate,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), BloomError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, BloomError> {
        let bloom: BloomFilter = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        if bloom.num_bits == 0 || bloom.bits.len() as u64 != bloom.num_bits.div_ceil(8) {
            return Err(BloomError::Inconsistent {
                bits: bloom.bits.len(),
                num_bits: bloom.num_bits,
            });
        }
        Ok(bloom)
    }
}

/// Network-order bytes of an address, as stored in binary rows.
pub fn packed(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

fn fnv(item: &[u8], key: Option<u64>) -> u64 {
    let mut hasher = match key {
        Some(key) => FnvHasher::with_key(key),
        None => FnvHasher::default(),
    };
    hasher.write(item);
    hasher.finish()
}

/// splitmix64 finalizer; spreads FNV output over all bits.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
