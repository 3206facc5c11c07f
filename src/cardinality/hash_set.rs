use crate::cardinality::Cardinality;
use std::collections::HashSet;

impl Cardinality<str> for HashSet<String> {
    fn add(&mut self, item: &str) {
        if !self.contains(item) {
            self.insert(item.to_owned());
        }
    }

    fn estimate(&self) -> u64 {
        self.len() as u64
    }
}
