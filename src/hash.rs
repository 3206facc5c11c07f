use sha2::{Digest, Sha256};

type Digest256 = [u8; 32];

fn sha256(parts: &[&[u8]]) -> Digest256 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Reduces a big-endian unsigned integer modulo `modulus`.
fn reduce_be(bytes: &[u8], modulus: u64) -> u64 {
    debug_assert!(modulus > 0);
    let modulus = modulus as u128;
    // Remainder stays below 2^64, so shifting in a byte never overflows.
    bytes
        .iter()
        .fold(0u128, |rem, &byte| ((rem << 8) | byte as u128) % modulus) as u64
}

/// Yields bit positions in `[0, num_bits)` for `item`, one per probe index.
///
/// Probe `i` hashes the item text followed by the decimal form of `i`, so
/// the sequence is stable across runs and platforms.
pub(crate) fn iter_hashes(item: &str, num_bits: usize) -> impl Iterator<Item = usize> + '_ {
    (0usize..).map(move |i| {
        let index = i.to_string();
        let digest = sha256(&[item.as_bytes(), index.as_bytes()]);
        reduce_be(&digest, num_bits as u64) as usize
    })
}

/// The low 64 bits of the item's SHA-256 digest read as a big-endian integer.
pub(crate) fn hash64(item: &str) -> u64 {
    let digest = sha256(&[item.as_bytes()]);
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[24..]);
    u64::from_be_bytes(low)
}
