use std::collections::HashMap;

/// Deduplicated, ordered pool of string constant values discovered in one
/// class.
///
/// Indices are assigned in first-occurrence order and form the contiguous
/// range `[0, len)`; the ordered sequence and the value→index map always
/// agree. A pool is built fresh for each class and discarded afterwards.
#[derive(Clone, Debug, Default)]
pub struct StringPool {
    values: Vec<String>,
    index_by_value: HashMap<String, u16>,
}

impl StringPool {
    pub fn new() -> StringPool {
        StringPool::default()
    }

    /// Record a value, returning its stable index. Re-inserting a known
    /// value returns the index assigned at first sight.
    pub fn insert(&mut self, value: &str) -> u16 {
        if let Some(&index) = self.index_by_value.get(value) {
            return index;
        }
        let index = self.values.len() as u16;
        self.values.push(value.to_string());
        self.index_by_value.insert(value.to_string(), index);
        index
    }

    pub fn index_of(&self, value: &str) -> Option<u16> {
        self.index_by_value.get(value).copied()
    }

    /// Pool entries in index order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::StringPool;

    #[test]
    fn first_occurrence_order_is_kept() {
        let mut pool = StringPool::new();
        assert_eq!(pool.insert("a"), 0);
        assert_eq!(pool.insert("b"), 1);
        assert_eq!(pool.insert("a"), 0);
        assert_eq!(pool.values(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn indices_are_dense_and_distinct() {
        let mut pool = StringPool::new();
        for value in ["x", "y", "x", "z", "y", "w"] {
            pool.insert(value);
        }
        assert_eq!(pool.len(), 4);
        for (i, value) in pool.values().iter().enumerate() {
            assert_eq!(pool.index_of(value), Some(i as u16));
        }
    }

    #[test]
    fn lookup_misses_for_unknown_values() {
        let mut pool = StringPool::new();
        pool.insert("known");
        assert_eq!(pool.index_of("unknown"), None);
    }

    #[test]
    fn empty_pool_is_valid() {
        let pool = StringPool::new();
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.values(), &[] as &[String]);
    }
}
