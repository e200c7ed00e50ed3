use std::collections::BTreeMap;

/// Monotonic integer ids over stored values. Ids start at 1 and are never reused, even after
/// [`IdRegistry::clear`].
#[derive(Debug, Clone)]
pub struct IdRegistry<T> {
    entries: BTreeMap<u32, T>,
    last_id: u32,
}

impl<T> Default for IdRegistry<T> {
    fn default() -> Self {
        Self { entries: BTreeMap::new(), last_id: 0 }
    }
}

impl<T> IdRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: T) -> u32 {
        self.last_id += 1;
        self.entries.insert(self.last_id, value);
        self.last_id
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops stored values; the id counter keeps running.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_keep_counting_after_clear() {
        let mut registry = IdRegistry::new();
        assert_eq!(registry.add("a"), 1);
        assert_eq!(registry.add("b"), 2);
        registry.clear();
        assert!(registry.get(1).is_none());
        assert_eq!(registry.add("c"), 3);
        assert_eq!(registry.len(), 1);
    }
}
