use std::collections::HashMap;

/// Concept labels in row order. Both formats emit concepts in this order.
pub type ConceptList = Vec<String>;

/// Locality name to one variant per concept, in order of first appearance.
pub type LocalityTable = OrderedMap<Vec<String>>;

/// Locality name to geographic information, in order of first appearance.
pub type GeoLocalities = OrderedMap<GeoLocality>;

/// An insertion-ordered map keyed by display name.
///
/// Re-inserting an existing key replaces its value but keeps the original
/// position, so serialization order is the order in which names were first
/// seen in the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `name`, returning the value it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: V) -> Option<V> {
        let name = name.into();
        match self.index.get(&name) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Returns the value for `name`, inserting `default()` at the end first if absent.
    pub fn get_or_insert_with(&mut self, name: &str, default: impl FnOnce() -> V) -> &mut V {
        let i = match self.index.get(name) {
            Some(&i) => i,
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push((name.to_string(), default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[i].1
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.iter_mut().map(|(_, v)| v)
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// The linguistic half of a dataset: concepts and one variant row per locality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinguisticTable {
    pub concepts: ConceptList,
    pub localities: LocalityTable,
}

impl LinguisticTable {
    /// Pads or truncates every variant sequence to the concept count.
    pub fn conform(&mut self) {
        let n = self.concepts.len();
        for variants in self.localities.values_mut() {
            variants.resize(n, String::new());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoLocality {
    /// `None` when the source named the locality without coordinates.
    pub coordinates: Option<Coordinates>,
    /// Free-text code, taken from the KML description. Empty if absent.
    pub code: String,
}

impl GeoLocality {
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            coordinates: Some(Coordinates { lat, lon }),
            code: String::new(),
        }
    }
}

/// One closed polygon ring. Vertices keep file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryPath {
    pub vertices: Vec<Coordinates>,
}

impl BoundaryPath {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Case-folded, trimmed locality name. Only used for lookups, never written out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameKey(String);

impl NameKey {
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
