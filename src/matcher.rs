use std::collections::{BTreeSet, HashMap};

use crate::model::NameKey;

/// Outcome of reconciling linguistic names against geographic names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub matched: BTreeSet<NameKey>,
    /// Linguistic names with no geographic counterpart.
    pub unmatched: BTreeSet<NameKey>,
}

/// Matches names by [`NameKey`] equality. No fuzzy matching is attempted.
///
/// Names that fold to the same key count once.
pub fn reconcile<'a, 'b>(
    locality_names: impl IntoIterator<Item = &'a str>,
    geo_names: impl IntoIterator<Item = &'b str>,
) -> Reconciliation {
    let geo: BTreeSet<NameKey> = geo_names.into_iter().map(NameKey::new).collect();

    let mut result = Reconciliation::default();
    for key in locality_names.into_iter().map(NameKey::new) {
        if geo.contains(&key) {
            result.matched.insert(key);
        } else {
            result.unmatched.insert(key);
        }
    }
    result
}

/// Case- and whitespace-insensitive lookup over display names.
///
/// When several names fold to the same key the last one wins.
#[derive(Debug)]
pub struct NameIndex<'a, V> {
    entries: HashMap<NameKey, (&'a str, &'a V)>,
}

impl<'a, V> NameIndex<'a, V> {
    pub fn new(items: impl IntoIterator<Item = (&'a str, &'a V)>) -> Self {
        let entries = items
            .into_iter()
            .map(|(name, value)| (NameKey::new(name), (name, value)))
            .collect();
        Self { entries }
    }

    /// Returns the stored display name and value for `name`.
    pub fn lookup(&self, name: &str) -> Option<(&'a str, &'a V)> {
        self.entries.get(&NameKey::new(name)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let result = reconcile(["Bogotá"], ["  bogotá "]);
        assert_eq!(result.matched.len(), 1);
        assert!(result.unmatched.is_empty());
    }

    #[test]
    fn test_symmetric() {
        let a = ["Cali", "PASTO", "Neiva"];
        let b = ["pasto ", "cali", "Leticia"];

        let forward = reconcile(a, b);
        let backward = reconcile(b, a);
        assert_eq!(forward.matched, backward.matched);
        assert_eq!(forward.matched.len(), 2);
    }

    #[test]
    fn test_unmatched_and_folded_duplicates() {
        let result = reconcile(["Tunja", "tunja ", "Sogamoso"], ["Duitama"]);
        assert!(result.matched.is_empty());
        assert_eq!(
            result.unmatched.iter().map(NameKey::as_str).collect::<Vec<_>>(),
            vec!["sogamoso", "tunja"]
        );
    }

    #[test]
    fn test_accents_are_significant() {
        let result = reconcile(["Bogota"], ["Bogotá"]);
        assert_eq!(result.unmatched.len(), 1);
    }

    #[test]
    fn test_name_index_last_wins() {
        let values = [1, 2];
        let index = NameIndex::new([("Cali", &values[0]), ("CALI", &values[1])]);
        assert_eq!(index.lookup(" cali"), Some(("CALI", &2)));
        assert_eq!(index.lookup("Pasto"), None);
    }
}
