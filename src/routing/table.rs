//! Prefix registration table.
//!
//! # Responsibilities
//! - Store prefix → registrant mappings
//! - Keep an ordered list of registrants per prefix (primary first, standbys after)
//! - Look up the longest matching prefix for a request URL
//!
//! # Design Decisions
//! - Plain value type: writers clone, mutate and publish a new snapshot
//! - O(n) scan for lookups (registration counts are small)
//! - Removing the primary promotes the oldest standby

use std::collections::BTreeMap;

use url::Url;

use crate::routing::prefix::UrlPrefix;

/// Immutable-by-convention prefix table shared behind an atomic pointer.
#[derive(Debug, Clone)]
pub struct PrefixTable<T> {
    entries: BTreeMap<UrlPrefix, Vec<T>>,
}

impl<T> Default for PrefixTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Clone + PartialEq> PrefixTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// All registrants of a prefix, primary first.
    pub fn get(&self, prefix: &UrlPrefix) -> Option<&[T]> {
        self.entries.get(prefix).map(Vec::as_slice)
    }

    /// The registrant that currently receives traffic for this prefix.
    pub fn primary(&self, prefix: &UrlPrefix) -> Option<&T> {
        self.entries.get(prefix).and_then(|v| v.first())
    }

    /// Register `value` for `prefix`. Becomes primary if the prefix is free,
    /// otherwise it queues as a standby. Re-registering is a no-op.
    ///
    /// Returns true if the table changed.
    pub fn insert(&mut self, prefix: UrlPrefix, value: T) -> bool {
        let registrants = self.entries.entry(prefix).or_default();
        if registrants.contains(&value) {
            return false;
        }
        registrants.push(value);
        true
    }

    /// Remove `value` from `prefix`. Returns true if it was present.
    pub fn remove(&mut self, prefix: &UrlPrefix, value: &T) -> bool {
        let Some(registrants) = self.entries.get_mut(prefix) else {
            return false;
        };
        let before = registrants.len();
        registrants.retain(|v| v != value);
        let removed = registrants.len() != before;
        if registrants.is_empty() {
            self.entries.remove(prefix);
        }
        removed
    }

    /// Remove every registration for which `pred` returns true.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, registrants| {
            let before = registrants.len();
            registrants.retain(|v| !pred(v));
            removed += before - registrants.len();
            !registrants.is_empty()
        });
        removed
    }

    /// Prefixes registered (as primary or standby) by `value`.
    pub fn prefixes_of(&self, value: &T) -> Vec<UrlPrefix> {
        self.entries
            .iter()
            .filter(|(_, registrants)| registrants.contains(value))
            .map(|(prefix, _)| prefix.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UrlPrefix, &[T])> {
        self.entries.iter().map(|(prefix, registrants)| (prefix, registrants.as_slice()))
    }

    /// Longest matching prefix and its primary registrant.
    pub fn longest_match(&self, url: &Url) -> Option<(&UrlPrefix, &T)> {
        self.entries
            .iter()
            .filter(|(prefix, _)| prefix.matches(url))
            .max_by_key(|(prefix, _)| prefix.specificity())
            .and_then(|(prefix, registrants)| registrants.first().map(|v| (prefix, v)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
