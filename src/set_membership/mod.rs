pub mod bloom;
pub mod hash_set;

/// Approximate or exact set membership over items of type `T`.
pub trait SetMembership<T: ?Sized> {
    fn add(&mut self, item: &T);
    fn check(&self, item: &T) -> bool;
}
