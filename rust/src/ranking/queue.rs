//! Bounded score-ordered queue keeping the best K items.

use ordered_float::OrderedFloat;

/// An item with the score it is ranked by.
#[derive(Clone, Debug)]
pub struct Scored<T> {
    pub item: T,
    pub score: f64,
}

/// Keeps at most `capacity` items in descending score order.
///
/// Once full, an insert either displaces the current minimum or is
/// rejected. Items with equal scores keep their insertion order.
#[derive(Clone, Debug)]
pub struct BoundedScoreQueue<T> {
    entries: Vec<Scored<T>>,
    capacity: usize,
}

impl<T> BoundedScoreQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Score of the worst retained item once full, `-inf` before.
    pub fn lowerbound(&self) -> f64 {
        if !self.is_full() {
            return f64::NEG_INFINITY;
        }
        self.entries.last().map_or(f64::NEG_INFINITY, |e| e.score)
    }

    /// Insert an item. Returns false if the queue is full and the score does
    /// not beat the worst retained item; the item is dropped in that case.
    pub fn add(&mut self, item: T, score: f64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.is_full() && OrderedFloat(score) <= OrderedFloat(self.lowerbound()) {
            return false;
        }
        let position = self
            .entries
            .partition_point(|e| OrderedFloat(e.score) >= OrderedFloat(score));
        self.entries.insert(position, Scored { item, score });
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }
        true
    }

    /// Swap in `item` for the first retained entry matching `same`, keeping
    /// its position. Returns false if no entry matches.
    pub fn replace_where(&mut self, item: T, same: impl Fn(&T) -> bool) -> bool {
        match self.entries.iter_mut().find(|e| same(&e.item)) {
            Some(entry) => {
                entry.item = item;
                true
            }
            None => false,
        }
    }

    pub fn contains_where(&self, same: impl Fn(&T) -> bool) -> bool {
        self.entries.iter().any(|e| same(&e.item))
    }

    /// Iterate in descending score order.
    pub fn iter(&self) -> impl Iterator<Item = &Scored<T>> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drain into a vector in descending score order.
    pub fn into_vec(self) -> Vec<Scored<T>> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_true_top_k() {
        let scores = [3.0, -1.0, 7.5, 2.0, 7.5, 0.0, 10.0, 4.0, 4.0, -3.0];
        for k in 1..=scores.len() + 2 {
            let mut queue = BoundedScoreQueue::new(k);
            for (i, &s) in scores.iter().enumerate() {
                queue.add(i, s);
            }
            let mut expected: Vec<f64> = scores.to_vec();
            expected.sort_by(|a, b| b.partial_cmp(a).unwrap());
            expected.truncate(k);

            let kept: Vec<f64> = queue.iter().map(|e| e.score).collect();
            assert_eq!(kept, expected, "k = {}", k);
            if k <= scores.len() {
                assert_eq!(queue.lowerbound(), expected[k - 1]);
            } else {
                assert_eq!(queue.lowerbound(), f64::NEG_INFINITY);
            }
        }
    }

    #[test]
    fn test_add_reports_rejection_when_full() {
        let mut queue = BoundedScoreQueue::new(2);
        assert!(queue.add("a", 5.0));
        assert!(queue.add("b", 1.0));
        assert!(queue.is_full());
        assert!(!queue.add("c", 1.0));
        assert!(!queue.add("d", 0.5));
        assert!(queue.add("e", 2.0));
        let items: Vec<&str> = queue.iter().map(|e| e.item).collect();
        assert_eq!(items, vec!["a", "e"]);
        assert_eq!(queue.lowerbound(), 2.0);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut queue = BoundedScoreQueue::new(3);
        queue.add("first", 1.0);
        queue.add("second", 1.0);
        queue.add("third", 1.0);
        let items: Vec<&str> = queue.into_vec().into_iter().map(|e| e.item).collect();
        assert_eq!(items, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_replace_where() {
        let mut queue = BoundedScoreQueue::new(3);
        queue.add(("x", 0), 2.0);
        queue.add(("y", 0), 1.0);
        assert!(queue.replace_where(("y", 1), |&(name, _)| name == "y"));
        assert!(!queue.replace_where(("z", 1), |&(name, _)| name == "z"));
        assert!(queue.contains_where(|&(name, v)| name == "y" && v == 1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_zero_capacity_rejects_everything() {
        let mut queue = BoundedScoreQueue::new(0);
        assert!(!queue.add(1, 100.0));
        assert!(queue.is_empty());
    }
}
