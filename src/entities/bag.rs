//! Observer registry with removal tokens
//!
//! `add()` hands back a [`BagIndex`] that removes exactly that entry later.
//! Iteration follows insertion order, so observers fire first-registered,
//! first-called (same rule as the event bus subscribers).

use indexmap::IndexMap;

/// Removal token returned by [`Bag::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BagIndex(u64);

/// Ordered collection of items addressed by the token they were added with.
#[derive(Debug)]
pub struct Bag<T> {
    next_index: u64,
    items: IndexMap<u64, T>,
}

impl<T> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Bag<T> {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            items: IndexMap::new(),
        }
    }

    /// Insert item, returns token for later removal.
    pub fn add(&mut self, item: T) -> BagIndex {
        let index = self.next_index;
        self.next_index += 1;
        self.items.insert(index, item);
        BagIndex(index)
    }

    /// Remove item by token. Unknown or already removed tokens are ignored.
    pub fn remove(&mut self, index: BagIndex) -> Option<T> {
        // shift_remove keeps insertion order for the remaining observers
        self.items.shift_remove(&index.0)
    }

    pub fn get(&self, index: BagIndex) -> Option<&T> {
        self.items.get(&index.0)
    }

    pub fn contains(&self, index: BagIndex) -> bool {
        self.items.contains_key(&index.0)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Take every item out, leaving the bag empty.
    ///
    /// Tokens are never reused, so stale tokens stay harmless after a drain.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).map(|(_, v)| v).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> Bag<T> {
    /// Snapshot of all items, for invoking callbacks without holding a lock.
    pub fn copy_items(&self) -> Vec<T> {
        self.items.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove_preserves_order() {
        let mut bag = Bag::new();
        let a = bag.add("a");
        let b = bag.add("b");
        let c = bag.add("c");

        assert_eq!(bag.remove(b), Some("b"));
        assert_eq!(bag.copy_items(), vec!["a", "c"]);
        assert!(bag.contains(a));
        assert!(!bag.contains(b));
        assert_eq!(bag.get(c), Some(&"c"));
    }

    #[test]
    fn test_tokens_not_reused_after_drain() {
        let mut bag = Bag::new();
        let first = bag.add(1);
        assert_eq!(bag.drain(), vec![1]);
        assert!(bag.is_empty());

        let second = bag.add(2);
        assert_ne!(first, second);
        // Stale token must not remove the new entry
        assert_eq!(bag.remove(first), None);
        assert_eq!(bag.len(), 1);
    }
}
