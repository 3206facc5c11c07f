use crate::error::{Error, Result};
use crate::hash::iter_hashes;
use crate::set_membership::SetMembership;
use fixedbitset::FixedBitSet;
use std::f64::consts::LN_2;
use std::fmt::{Debug, Display, Formatter};
use tracing::debug;

/// A Bloom filter over strings.
///
/// Bit positions are derived from SHA-256, so a filter populated with the
/// same items always ends up with the same bits. Bits are never cleared:
/// an item that was added is always reported as present.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: FixedBitSet,
    num_hashes: usize,
}

impl BloomFilter {
    pub fn new(num_bits: usize, num_hashes: usize) -> Result<Self> {
        if num_bits == 0 {
            return Err(Error::invalid_argument("num_bits must be > 0"));
        }
        if num_hashes == 0 {
            return Err(Error::invalid_argument("num_hashes must be > 0"));
        }
        debug!(num_bits, num_hashes, "created bloom filter");
        Ok(Self {
            bits: FixedBitSet::with_capacity(num_bits),
            num_hashes,
        })
    }

    /// Sizes a filter for `num_items` insertions at false positive
    /// probability `probability`.
    pub fn with_probability(num_items: usize, probability: f64) -> Result<Self> {
        if num_items == 0 {
            return Err(Error::invalid_argument("num_items must be > 0"));
        }
        if !(0. < probability && probability < 1.) {
            return Err(Error::invalid_argument(
                "probability must be in the range (0, 1)",
            ));
        }
        let n = num_items as f64;
        let bits = (-n * probability.ln() / (LN_2 * LN_2)).ceil() as usize;
        let num_hashes = ((bits as f64 / n) * LN_2).round().max(1.) as usize;
        Self::new(bits, num_hashes)
    }

    pub fn num_bits(&self) -> usize {
        self.bits.len()
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    /// Storage footprint in bytes, one bit per position.
    pub fn byte_len(&self) -> usize {
        self.bits.len().div_ceil(8)
    }

    pub fn is_empty(&self) -> bool {
        self.count_set_bits() == 0
    }

    pub fn add(&mut self, item: &str) {
        for bit in iter_hashes(item, self.bits.len()).take(self.num_hashes) {
            self.bits.insert(bit);
        }
    }

    pub fn check(&self, item: &str) -> bool {
        iter_hashes(item, self.bits.len())
            .take(self.num_hashes)
            .all(|bit| self.bits.contains(bit))
    }

    pub fn count_set_bits(&self) -> usize {
        self.bits.count_ones(..)
    }

    /// `(1 - e^(-kn/m))^k`, the expected false positive rate after `n`
    /// insertions.
    pub fn estimated_false_positive_rate(&self, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let m = self.bits.len() as f64;
        let k = self.num_hashes as f64;
        (1. - (-k * n as f64 / m).exp()).powf(k)
    }

    /// Inverts the expected number of set bits to guess how many items went
    /// in. Repeated and colliding items make this an approximation.
    pub fn estimated_elements_added(&self) -> usize {
        let ones = self.count_set_bits();
        if ones == 0 {
            return 0;
        }
        if ones >= self.bits.len() {
            return self.bits.len();
        }
        let m = self.bits.len() as f64;
        let k = self.num_hashes as f64;
        (-m / k * (1. - ones as f64 / m).ln()) as usize
    }
}

impl SetMembership<str> for BloomFilter {
    fn add(&mut self, item: &str) {
        BloomFilter::add(self, item)
    }

    fn check(&self, item: &str) -> bool {
        BloomFilter::check(self, item)
    }
}

impl Debug for BloomFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BloomFilter {{ num_bits: {}, num_hashes: {} }}",
            self.bits.len(),
            self.num_hashes
        )
    }
}

impl Display for BloomFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let estimated = self.estimated_elements_added();
        writeln!(f, "BloomFilter:")?;
        writeln!(f, "\tbits: {}", self.bits.len())?;
        writeln!(f, "\tnumber hashes: {}", self.num_hashes)?;
        writeln!(f, "\tbloom length (8 bits): {}", self.byte_len())?;
        writeln!(f, "\tnumber bits set: {}", self.count_set_bits())?;
        writeln!(f, "\testimated elements added: {}", estimated)?;
        write!(
            f,
            "\tcurrent false positive rate: {:.6}",
            self.estimated_false_positive_rate(estimated)
        )
    }
}
