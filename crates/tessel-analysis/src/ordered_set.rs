//! Insertion-ordered set
//!
//! Membership is a hash lookup; iteration follows insertion order. Anything
//! whose order ends up in emitted code must be iterated through this type,
//! never through a hash container directly.

use rustc_hash::FxHashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct OrderedSet<T> {
    index: FxHashMap<T, usize>,
    items: Vec<T>,
}

impl<T> Default for OrderedSet<T> {
    fn default() -> Self {
        Self {
            index: FxHashMap::default(),
            items: Vec::new(),
        }
    }
}

impl<T: Hash + Eq + Clone> OrderedSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value`. Returns `false` (and changes nothing) if it was
    /// already present.
    pub fn insert(&mut self, value: T) -> bool {
        if self.index.contains_key(&value) {
            return false;
        }
        self.index.insert(value.clone(), self.items.len());
        self.items.push(value);
        true
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index.contains_key(value)
    }

    /// Position in insertion order
    pub fn position(&self, value: &T) -> Option<usize> {
        self.index.get(value).copied()
    }

    /// Removes `value`, keeping the relative order of the rest
    pub fn remove(&mut self, value: &T) -> bool {
        let Some(at) = self.index.remove(value) else {
            return false;
        };
        self.items.remove(at);
        for item in &self.items[at..] {
            if let Some(slot) = self.index.get_mut(item) {
                *slot -= 1;
            }
        }
        true
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Hash + Eq + Clone> PartialEq for OrderedSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Hash + Eq + Clone> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

impl<'a, T> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_novelty() {
        let mut set = OrderedSet::new();
        assert!(set.insert("vec3"));
        assert!(set.insert("float"));
        assert!(!set.insert("vec3"));
        assert_eq!(set.as_slice(), &["vec3", "float"]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut set: OrderedSet<u32> = [5, 1, 9, 3].into_iter().collect();
        assert!(set.remove(&1));
        assert!(!set.remove(&1));
        assert_eq!(set.as_slice(), &[5, 9, 3]);
        assert_eq!(set.position(&3), Some(2));
        assert!(set.insert(1));
        assert_eq!(set.position(&1), Some(3));
    }

    #[test]
    fn test_iteration_ignores_hash_order() {
        let values: Vec<u64> = (0..256).rev().map(|v| v * 7919).collect();
        let set: OrderedSet<u64> = values.iter().copied().collect();
        assert!(set.iter().copied().eq(values.into_iter()));
    }
}
