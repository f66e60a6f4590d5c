//! blocklist.rs — the set of IPs considered definitively malicious.
//!
//! Membership is monotonic: operator action adds, nothing removes.
//! Checked before any other scoring, so `contains` sits on the hot path
//! and `add` is rare.

use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct BlockedIpSet {
    inner: RwLock<HashSet<String>>,
}

impl BlockedIpSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from an existing list (e.g. the storage collaborator).
    pub fn from_iter<I: IntoIterator<Item = String>>(ips: I) -> Self {
        Self {
            inner: RwLock::new(ips.into_iter().collect()),
        }
    }

    /// Returns `true` if the IP was newly added.
    pub fn add(&self, ip: &str) -> bool {
        let mut set = self.inner.write().expect("blocklist rwlock poisoned");
        set.insert(ip.to_string())
    }

    pub fn contains(&self, ip: &str) -> bool {
        let set = self.inner.read().expect("blocklist rwlock poisoned");
        set.contains(ip)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("blocklist rwlock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<String> {
        let set = self.inner.read().expect("blocklist rwlock poisoned");
        let mut v: Vec<String> = set.iter().cloned().collect();
        v.sort();
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_and_contains_works() {
        let set = BlockedIpSet::new();
        assert!(!set.contains("203.0.113.9"));
        assert!(set.add("203.0.113.9"));
        assert!(!set.add("203.0.113.9"));
        assert!(set.contains("203.0.113.9"));
        assert_eq!(set.len(), 1);
    }
}
