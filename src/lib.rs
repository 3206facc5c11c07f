//! Probabilistic sketches for membership and distinct counting over string
//! streams: a SHA-256 based [`BloomFilter`] and [`HyperLogLog`].
//!
//! Both structures are single-owner values. Callers feeding them from
//! several producers must serialize `add` calls themselves.
//!
//! ```
//! use sketchwise::{BloomFilter, HyperLogLog};
//!
//! let mut bf = BloomFilter::new(1000, 3)?;
//! bf.add("password123");
//! assert!(bf.check("password123"));
//!
//! let mut hll = HyperLogLog::new(14)?;
//! for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.1"] {
//!     hll.add(ip);
//! }
//! assert_eq!(hll.estimate(), 2);
//! # Ok::<(), sketchwise::Error>(())
//! ```

pub mod cardinality;
pub mod classify;
pub mod error;
mod hash;
pub mod log_scan;
pub mod set_membership;

pub use cardinality::hll::HyperLogLog;
pub use cardinality::Cardinality;
pub use error::{Error, ErrorKind, Result};
pub use set_membership::bloom::BloomFilter;
pub use set_membership::SetMembership;
