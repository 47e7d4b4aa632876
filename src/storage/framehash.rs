//! Backing associative container for multi-arc cells.
//!
//! A thin layer over `hashbrown::HashMap` exposing the bulk-visit API the
//! arcvector layer is written against: a visitor may keep, delete or stop
//! on each cell, and removals never shrink the table until [`FrameHash::compact`]
//! is called explicitly.

use std::hash::Hash;

use hashbrown::HashMap;

/// Verdict returned by a visitor for the cell it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Delete,
    /// Stop visiting; the current cell is kept.
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameHash<K, V>
where
    K: Eq + Hash,
{
    map: HashMap<K, V>,
}

impl<K, V> Default for FrameHash<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self { map: HashMap::new() }
    }
}

impl<K, V> FrameHash<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { map: HashMap::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.map.get_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the previous value for `key`.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.map.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.map.values()
    }

    /// Visit every cell. Returns the number of cells deleted.
    pub fn visit<F>(&mut self, mut visitor: F) -> usize
    where
        F: FnMut(&K, &mut V) -> Visit,
    {
        let mut doomed = Vec::new();
        for (k, v) in self.map.iter_mut() {
            match visitor(k, v) {
                Visit::Keep => {}
                Visit::Delete => doomed.push(k.clone()),
                Visit::Stop => break,
            }
        }
        for k in &doomed {
            self.map.remove(k);
        }
        doomed.len()
    }

    /// Release capacity left behind by deletions.
    pub fn compact(&mut self) {
        self.map.shrink_to_fit();
    }

    /// Take the only cell out of a single-entry container.
    pub fn take_single(&mut self) -> Option<(K, V)> {
        if self.map.len() != 1 {
            return None;
        }
        self.map.drain().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_delete_and_stop() {
        let mut fh: FrameHash<u32, u32> = (0..10).fold(FrameHash::new(), |mut fh, i| {
            fh.insert(i, i * 10);
            fh
        });
        let deleted = fh.visit(|k, _| if k % 2 == 0 { Visit::Delete } else { Visit::Keep });
        assert_eq!(deleted, 5);
        assert_eq!(fh.len(), 5);

        let mut seen = 0;
        fh.visit(|_, _| {
            seen += 1;
            Visit::Stop
        });
        assert_eq!(seen, 1);
        assert_eq!(fh.len(), 5);
    }

    #[test]
    fn test_visit_mutates_in_place() {
        let mut fh = FrameHash::new();
        fh.insert("a", 1);
        fh.visit(|_, v| {
            *v += 1;
            Visit::Keep
        });
        assert_eq!(fh.get(&"a"), Some(&2));
    }

    #[test]
    fn test_take_single() {
        let mut fh = FrameHash::new();
        fh.insert(1u8, 'x');
        fh.insert(2u8, 'y');
        assert!(fh.take_single().is_none());
        fh.remove(&2);
        assert_eq!(fh.take_single(), Some((1, 'x')));
        assert!(fh.is_empty());
    }
}
