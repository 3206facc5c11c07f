use crate::cardinality::Cardinality;
use crate::error::{Error, Result};
use crate::hash::hash64;
use std::fmt::{Debug, Formatter};
use tracing::debug;

pub const MIN_PRECISION: usize = 4;
pub const MAX_PRECISION: usize = 16;

/// Width of the hash fed to the registers. The low `precision` bits pick a
/// register and the leading zeros are counted over the remaining
/// `HASH_BITS - precision` bits.
const HASH_BITS: usize = 64;
const REGISTER_BITS: usize = 6;

const TWO_POW_32: f64 = (1u64 << 32) as f64;

/// A HyperLogLog distinct-count estimator over strings.
#[derive(Clone, PartialEq)]
pub struct HyperLogLog {
    registers: Registers<REGISTER_BITS>,
    precision: usize,
    alpha: f64,
}

impl HyperLogLog {
    pub fn new(precision: usize) -> Result<Self> {
        check_precision(precision)?;
        let count = 1 << precision;
        debug!(precision, registers = count, "created hyperloglog");
        Ok(Self {
            registers: Registers::new(count),
            precision,
            alpha: alpha(count),
        })
    }

    /// Picks the smallest precision whose standard error is at most
    /// `epsilon`. Fails when that precision is outside the supported range.
    pub fn with_error(epsilon: f64) -> Result<Self> {
        if !(0.0 < epsilon && epsilon < 1.0) {
            return Err(Error::invalid_argument(
                "epsilon must be in the range (0, 1)",
            ));
        }
        let m = (1.04 / epsilon).powi(2);
        let precision = m.log2().ceil() as usize;
        Self::new(precision)
    }

    /// Rebuilds a sketch from the values yielded by [`HyperLogLog::registers`].
    pub fn from_registers(precision: usize, registers: &[u8]) -> Result<Self> {
        let mut hll = Self::new(precision)?;
        if registers.len() != hll.register_count() {
            return Err(Error::invalid_data(format!(
                "expected {} registers, got {}",
                hll.register_count(),
                registers.len()
            )));
        }
        let max_rank = hll.max_rank();
        for (index, &value) in registers.iter().enumerate() {
            if value > max_rank {
                return Err(Error::invalid_data(format!(
                    "register {index} holds {value}, max rank is {max_rank}"
                )));
            }
            hll.registers.set(index, value);
        }
        Ok(hll)
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn register_count(&self) -> usize {
        self.registers.count()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Relative standard error of the estimate, `1.04 / sqrt(m)`.
    pub fn standard_error(&self) -> f64 {
        1.04 / (self.register_count() as f64).sqrt()
    }

    /// Bytes used by the packed registers.
    pub fn memory_bytes(&self) -> usize {
        self.registers.buf.len()
    }

    pub fn registers(&self) -> impl Iterator<Item = u8> + '_ {
        self.registers.iter()
    }

    fn max_rank(&self) -> u8 {
        (HASH_BITS - self.precision + 1) as u8
    }

    pub fn add(&mut self, item: &str) {
        let hash = hash64(item);
        let index = (hash & (self.register_count() as u64 - 1)) as usize;
        let rest = hash >> self.precision;
        // `rest` has `precision` zero bits on top that are not part of the
        // counted field.
        let rank = rest.leading_zeros() as usize - self.precision + 1;
        self.registers.update_max(index, rank as u8);
    }

    /// `alpha * m^2 / sum(2^-register)` before any range correction.
    pub fn raw_estimate(&self) -> f64 {
        let m = self.register_count() as f64;
        let sum: f64 = self.registers.iter().map(|r| (-(r as f64)).exp2()).sum();
        self.alpha * m * m / sum
    }

    pub fn estimate(&self) -> u64 {
        let m = self.register_count() as f64;
        let raw = self.raw_estimate();

        if raw <= 2.5 * m {
            let zeros = self.registers.iter().filter(|&r| r == 0).count();
            if zeros > 0 {
                return (m * (m / zeros as f64).ln()).round() as u64;
            }
        }

        if raw <= TWO_POW_32 / 30. {
            raw.round() as u64
        } else if raw < TWO_POW_32 {
            (-TWO_POW_32 * (1. - raw / TWO_POW_32).ln()).round() as u64
        } else {
            // Outside the domain of the 32-bit correction.
            raw.round() as u64
        }
    }
}

impl Cardinality<str> for HyperLogLog {
    fn add(&mut self, item: &str) {
        HyperLogLog::add(self, item)
    }

    fn estimate(&self) -> u64 {
        HyperLogLog::estimate(self)
    }
}

impl Debug for HyperLogLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HyperLogLog {{ precision: {} }}", self.precision)
    }
}

fn check_precision(precision: usize) -> Result<()> {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return Err(Error::invalid_argument(format!(
            "precision must be in the range [{MIN_PRECISION}, {MAX_PRECISION}], got {precision}"
        )));
    }
    Ok(())
}

fn alpha(m: usize) -> f64 {
    if m >= 128 {
        0.7213 / (1. + 1.079 / m as f64)
    } else if m >= 64 {
        0.709
    } else if m >= 32 {
        0.697
    } else if m >= 16 {
        0.673
    } else {
        0.5
    }
}

/// `count` registers of `N` bits each, packed little-endian into bytes.
#[derive(Clone, PartialEq, Eq)]
struct Registers<const N: usize> {
    buf: Vec<u8>,
    count: usize,
}

impl<const N: usize> Registers<N> {
    const REGISTER_LENGTH_OK: () = assert!(0 < N && N <= 8);
    const MASK: u16 = (1 << N) - 1;

    fn new(count: usize) -> Self {
        // Add a binding to enforce a compile-time assertion.
        #[allow(clippy::let_unit_value)]
        let _ = Self::REGISTER_LENGTH_OK;

        // One spare byte so every register can be read as a byte pair.
        let num_bytes = (N * count).div_ceil(8) + 1;
        Self {
            buf: vec![0; num_bytes],
            count,
        }
    }

    fn count(&self) -> usize {
        self.count
    }

    fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.count).map(move |index| self.get(index))
    }

    fn get(&self, index: usize) -> u8 {
        assert!(index < self.count, "index out of bounds");
        let (byte, offset) = Self::byte_and_offset(index);
        ((self.window(byte) >> offset) & Self::MASK) as u8
    }

    fn set(&mut self, index: usize, value: u8) {
        assert!(index < self.count, "index out of bounds");
        let (byte, offset) = Self::byte_and_offset(index);
        let cleared = self.window(byte) & !(Self::MASK << offset);
        let window = cleared | ((value as u16 & Self::MASK) << offset);
        self.buf[byte..byte + 2].copy_from_slice(&window.to_le_bytes());
    }

    fn update_max(&mut self, index: usize, value: u8) {
        if value > self.get(index) {
            self.set(index, value);
        }
    }

    fn window(&self, byte: usize) -> u16 {
        u16::from_le_bytes([self.buf[byte], self.buf[byte + 1]])
    }

    fn byte_and_offset(index: usize) -> (usize, usize) {
        (N * index / 8, N * index % 8)
    }
}
