//! Fixed-size lookup tables.

/// Compile-time sized associative array for small key/value tables.
///
/// Built once from its entries and never modified. Lookup is a linear scan,
/// which for the handful of entries these tables hold beats hashing and needs
/// no allocation. Typical use is mapping a hardware channel to its resource
/// record in a backend.
///
/// ```
/// use chimera::container::LightFlatMap;
///
/// static CLOCKS: LightFlatMap<u8, u32, 2> = LightFlatMap::new([(0, 8_000_000), (1, 16_000_000)]);
///
/// assert_eq!(CLOCKS.get(&1), Some(&16_000_000));
/// assert_eq!(CLOCKS.value(&7), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightFlatMap<K, V, const N: usize> {
    entries: [(K, V); N],
}

impl<K, V, const N: usize> LightFlatMap<K, V, N> {
    /// Builds the table from its entries. For duplicate keys the first wins.
    pub const fn new(entries: [(K, V); N]) -> Self {
        Self { entries }
    }

    /// Table capacity, which is also the number of entries.
    pub const fn size(&self) -> usize {
        N
    }

    /// Iterates the entries in construction order.
    pub fn iter(&self) -> core::slice::Iter<'_, (K, V)> {
        self.entries.iter()
    }
}

impl<K: PartialEq, V, const N: usize> LightFlatMap<K, V, N> {
    /// Finds the entry for `key`.
    pub fn find(&self, key: &K) -> Option<&(K, V)> {
        self.entries.iter().find(|(k, _)| k == key)
    }

    /// Borrows the value for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }
}

impl<K: PartialEq, V: Clone + Default, const N: usize> LightFlatMap<K, V, N> {
    /// Copy of the value for `key`, or the default value on a miss.
    pub fn value(&self, key: &K) -> V {
        self.get(key).cloned().unwrap_or_default()
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for LightFlatMap<K, V, N> {
    fn from(entries: [(K, V); N]) -> Self {
        Self::new(entries)
    }
}

impl<'a, K, V, const N: usize> IntoIterator for &'a LightFlatMap<K, V, N> {
    type Item = &'a (K, V);
    type IntoIter = core::slice::Iter<'a, (K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_yields_default() {
        let map = LightFlatMap::new([(1, "a"), (2, "b")]);
        assert_eq!(map.value(&3), "");
        assert!(map.find(&3).is_none());
        assert_eq!(map.find(&2).map(|entry| entry.1), Some("b"));
        assert_eq!(map.size(), 2);
    }

    #[test]
    fn first_duplicate_wins() {
        let map = LightFlatMap::from([(4u8, 10u32), (4, 20)]);
        assert_eq!(map.value(&4), 10);
    }

    #[test]
    fn iterates_in_order() {
        let map = LightFlatMap::new([('x', 1), ('y', 2), ('z', 3)]);
        let keys: Vec<char> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ['x', 'y', 'z']);
        assert!(map.contains_key(&'y'));
        assert_eq!((&map).into_iter().count(), 3);
    }
}
