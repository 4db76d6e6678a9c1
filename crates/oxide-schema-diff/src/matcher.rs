//! Set differencing over keyed entity maps.
//!
//! Every entity category (schemas, enums, tables, columns, indexes,
//! constraints) is compared the same way: by stable key first, then by
//! value for the keys present on both sides. The matcher itself never
//! decides whether a deleted/created pair is a rename; that is left to a
//! [`Resolver`](crate::resolver::Resolver).

use std::collections::BTreeMap;

/// Result of comparing two keyed maps.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDiff<'a, T> {
    /// Present only in the current map, in key order.
    pub created: Vec<&'a T>,
    /// Present only in the previous map, in key order.
    pub deleted: Vec<&'a T>,
    /// Same key on both sides with a different value: `(prev, cur)`.
    pub altered: Vec<(&'a T, &'a T)>,
    /// Same key and equal value.
    pub unchanged: Vec<&'a T>,
}

impl<T> EntityDiff<'_, T> {
    /// Returns true if there is nothing to do for this category.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.altered.is_empty()
    }

    /// Returns true if both deleted and created candidates exist, so a
    /// resolver has to decide which of them are renames.
    #[must_use]
    pub fn is_rename_ambiguous(&self) -> bool {
        !self.created.is_empty() && !self.deleted.is_empty()
    }
}

/// Compares `prev` and `cur` by key, then by value.
///
/// Output order follows key order, so the result is deterministic for a
/// given pair of maps.
#[must_use]
pub fn diff_entities<'a, T: PartialEq>(
    prev: &'a BTreeMap<String, T>,
    cur: &'a BTreeMap<String, T>,
) -> EntityDiff<'a, T> {
    let mut diff = EntityDiff {
        created: Vec::new(),
        deleted: Vec::new(),
        altered: Vec::new(),
        unchanged: Vec::new(),
    };

    for (key, before) in prev {
        match cur.get(key) {
            Some(after) if after == before => diff.unchanged.push(before),
            Some(after) => diff.altered.push((before, after)),
            None => diff.deleted.push(before),
        }
    }

    diff.created = cur
        .iter()
        .filter(|(key, _)| !prev.contains_key(*key))
        .map(|(_, value)| value)
        .collect();

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, i32)]) -> BTreeMap<String, i32> {
        entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn test_partition_by_key_and_value() {
        let prev = map(&[("a", 1), ("b", 2), ("c", 3)]);
        let cur = map(&[("b", 2), ("c", 30), ("d", 4)]);

        let diff = diff_entities(&prev, &cur);
        assert_eq!(diff.deleted, vec![&1]);
        assert_eq!(diff.created, vec![&4]);
        assert_eq!(diff.altered, vec![(&3, &30)]);
        assert_eq!(diff.unchanged, vec![&2]);
        assert!(diff.is_rename_ambiguous());
    }

    #[test]
    fn test_identical_maps_are_empty() {
        let prev = map(&[("a", 1), ("b", 2)]);
        let diff = diff_entities(&prev, &prev);
        assert!(diff.is_empty());
        assert_eq!(diff.unchanged.len(), 2);
    }

    #[test]
    fn test_only_creations_are_not_ambiguous() {
        let prev = map(&[]);
        let cur = map(&[("z", 26), ("a", 1)]);
        let diff = diff_entities(&prev, &cur);
        assert!(!diff.is_rename_ambiguous());
        // Key order, not insertion order.
        assert_eq!(diff.created, vec![&1, &26]);
    }
}
