use crate::set_membership::SetMembership;
use std::collections::HashSet;

impl SetMembership<str> for HashSet<String> {
    fn add(&mut self, item: &str) {
        if !self.contains(item) {
            self.insert(item.to_owned());
        }
    }

    fn check(&self, item: &str) -> bool {
        self.contains(item)
    }
}
