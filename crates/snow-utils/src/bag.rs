//! A multiset of votes.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A multiset that tracks how many times each element was added.
///
/// Elements are remembered in first-insertion order, and the mode is updated
/// on every insert: an element becomes the mode only when its count strictly
/// exceeds the current mode's. Ties therefore go to whichever element reached
/// the count first, which keeps poll results reproducible.
///
/// ```
/// use snow_utils::Bag;
///
/// let mut votes = Bag::new();
/// votes.add("red");
/// votes.add_count("blue", 2);
/// votes.add("red");
///
/// assert_eq!(votes.count(&"red"), 2);
/// assert_eq!(votes.len(), 4);
/// assert_eq!(votes.mode(), Some(("blue", 2)));
/// ```
#[derive(Clone)]
pub struct Bag<T: Eq + Hash + Clone> {
    counts: HashMap<T, usize>,
    order: Vec<T>,
    size: usize,
    mode: Option<T>,
    mode_freq: usize,
}

impl<T: Eq + Hash + Clone> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Bag<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            order: Vec::new(),
            size: 0,
            mode: None,
            mode_freq: 0,
        }
    }

    /// Builds a bag holding one vote for each item yielded by `iter`.
    pub fn of<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut bag = Self::new();
        for item in iter {
            bag.add(item);
        }
        bag
    }

    pub fn add(&mut self, item: T) {
        self.add_count(item, 1);
    }

    /// Adds `count` votes for `item`. A zero count is ignored.
    pub fn add_count(&mut self, item: T, count: usize) {
        if count == 0 {
            return;
        }

        if !self.counts.contains_key(&item) {
            self.order.push(item.clone());
        }
        let total = self.counts.entry(item.clone()).or_insert(0);
        *total += count;
        let total = *total;
        self.size += count;

        if total > self.mode_freq {
            self.mode_freq = total;
            self.mode = Some(item);
        }
    }

    #[must_use]
    pub fn count(&self, item: &T) -> usize {
        self.counts.get(item).copied().unwrap_or(0)
    }

    /// Total number of votes, counting duplicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The distinct elements, in first-insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<T> {
        self.order.clone()
    }

    /// Iterates over `(element, count)` pairs in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, usize)> + '_ {
        self.order.iter().map(move |item| (item, self.count(item)))
    }

    /// The most common element and its count, or `None` for an empty bag.
    #[must_use]
    pub fn mode(&self) -> Option<(T, usize)> {
        self.mode.clone().map(|item| (item, self.mode_freq))
    }

    /// Returns a bag holding only the elements for which `predicate` is true.
    #[must_use]
    pub fn filter<F: Fn(&T) -> bool>(&self, predicate: F) -> Self {
        let mut filtered = Self::new();
        for (item, count) in self.iter() {
            if predicate(item) {
                filtered.add_count(item.clone(), count);
            }
        }
        filtered
    }

    /// Partitions the bag by `predicate`: index 0 holds the elements for which
    /// it returned false, index 1 the ones for which it returned true.
    #[must_use]
    pub fn split<F: Fn(&T) -> bool>(&self, predicate: F) -> [Self; 2] {
        let mut split = [Self::new(), Self::new()];
        for (item, count) in self.iter() {
            split[usize::from(predicate(item))].add_count(item.clone(), count);
        }
        split
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for Bag<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::of(iter)
    }
}

impl<T: Eq + Hash + Clone + fmt::Debug> fmt::Debug for Bag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T: Eq + Hash + Clone + fmt::Display> fmt::Display for Bag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bag[{}]: (Size = {})", std::any::type_name::<T>(), self.size)?;
        for (item, count) in self.iter() {
            write!(f, "\n    {item}: {count}")?;
        }
        Ok(())
    }
}
