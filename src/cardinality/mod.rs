pub mod hash_set;
pub mod hll;

/// Exact or approximate distinct counting over items of type `T`.
pub trait Cardinality<T: ?Sized> {
    fn add(&mut self, item: &T);
    fn estimate(&self) -> u64;
}
