use std::fmt::{self, Debug};

use itertools::{EitherOrBoth, Itertools};

/// Sorted, strictly increasing offsets. The sparse representation.
#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct ArrayContainer {
    values: Vec<u16>,
}

impl Debug for ArrayContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayContainer({})", self.cardinality())
    }
}

impl ArrayContainer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Construct from a vector that is already sorted and duplicate-free.
    #[inline]
    pub(crate) fn from_sorted_unchecked(values: Vec<u16>) -> Self {
        debug_assert!(values.windows(2).all(|w| w[0] < w[1]));
        Self { values }
    }

    #[inline]
    pub(crate) fn values(&self) -> &[u16] {
        &self.values
    }

    #[inline]
    pub(crate) fn cardinality(&self) -> u32 {
        self.values.len() as u32
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub(crate) fn contains(&self, offset: u16) -> bool {
        self.values.binary_search(&offset).is_ok()
    }

    pub(crate) fn insert(&mut self, offset: u16) -> bool {
        match self.values.binary_search(&offset) {
            Ok(_) => false,
            Err(index) => {
                self.values.insert(index, offset);
                true
            }
        }
    }

    pub(crate) fn remove(&mut self, offset: u16) -> bool {
        match self.values.binary_search(&offset) {
            Ok(index) => {
                self.values.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    #[inline]
    pub(crate) fn min(&self) -> Option<u16> {
        self.values.first().copied()
    }

    #[inline]
    pub(crate) fn max(&self) -> Option<u16> {
        self.values.last().copied()
    }

    /// Count of values `<= offset`.
    #[inline]
    pub(crate) fn rank(&self, offset: u16) -> u32 {
        self.values.partition_point(|&v| v <= offset) as u32
    }

    #[inline]
    pub(crate) fn select(&self, n: u32) -> Option<u16> {
        self.values.get(n as usize).copied()
    }

    pub(crate) fn contains_range(&self, lo: u16, hi: u16) -> bool {
        let lo_index = self.values.partition_point(|&v| v < lo);
        let hi_index = self.values.partition_point(|&v| v <= hi);
        (hi_index - lo_index) as u32 == u32::from(hi - lo) + 1
    }

    pub(crate) fn insert_range(&mut self, lo: u16, hi: u16) {
        let lo_index = self.values.partition_point(|&v| v < lo);
        let hi_index = self.values.partition_point(|&v| v <= hi);
        self.values.splice(lo_index..hi_index, lo..=hi);
    }

    pub(crate) fn remove_range(&mut self, lo: u16, hi: u16) {
        let lo_index = self.values.partition_point(|&v| v < lo);
        let hi_index = self.values.partition_point(|&v| v <= hi);
        self.values.drain(lo_index..hi_index);
    }

    /// A copy of the container with every offset in `[lo, hi]` flipped.
    pub(crate) fn flip_range(&self, lo: u16, hi: u16) -> Self {
        let lo_index = self.values.partition_point(|&v| v < lo);
        let mut out = Vec::with_capacity(self.values.len() + usize::from(hi - lo) + 1);
        out.extend_from_slice(&self.values[..lo_index]);
        let mut index = lo_index;
        for offset in lo..=hi {
            if self.values.get(index) == Some(&offset) {
                index += 1;
            } else {
                out.push(offset);
            }
        }
        out.extend_from_slice(&self.values[index..]);
        Self::from_sorted_unchecked(out)
    }

    pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = u16> + '_ {
        self.values.iter().copied()
    }

    /// Number of runs of consecutive values.
    pub(crate) fn count_runs(&self) -> u32 {
        let mut runs = 0u32;
        let mut prev = None;
        for &v in &self.values {
            if prev.is_none_or(|p: u16| u32::from(p) + 1 != u32::from(v)) {
                runs += 1;
            }
            prev = Some(v);
        }
        runs
    }

    pub(crate) fn union(&self, other: &Self) -> Self {
        let values = self
            .values
            .iter()
            .merge(&other.values)
            .dedup()
            .copied()
            .collect();
        Self { values }
    }

    pub(crate) fn intersection(&self, other: &Self) -> Self {
        let values = self
            .values
            .iter()
            .merge_join_by(&other.values, Ord::cmp)
            .filter_map(|pair| pair.both().map(|(&v, _)| v))
            .collect();
        Self { values }
    }

    pub(crate) fn difference(&self, other: &Self) -> Self {
        let values = self
            .values
            .iter()
            .merge_join_by(&other.values, Ord::cmp)
            .filter_map(|pair| match pair {
                EitherOrBoth::Left(&v) => Some(v),
                _ => None,
            })
            .collect();
        Self { values }
    }

    pub(crate) fn symmetric_difference(&self, other: &Self) -> Self {
        let values = self
            .values
            .iter()
            .merge_join_by(&other.values, Ord::cmp)
            .filter_map(|pair| match pair {
                EitherOrBoth::Left(&v) | EitherOrBoth::Right(&v) => Some(v),
                EitherOrBoth::Both(..) => None,
            })
            .collect();
        Self { values }
    }

    pub(crate) fn intersection_cardinality(&self, other: &Self) -> u32 {
        self.values
            .iter()
            .merge_join_by(&other.values, Ord::cmp)
            .filter(|pair| pair.is_both())
            .count() as u32
    }

    pub(crate) fn is_subset(&self, other: &Self) -> bool {
        self.cardinality() <= other.cardinality()
            && self.intersection_cardinality(other) == self.cardinality()
    }

    /// Bytes that would be released by shrinking the backing storage.
    pub(crate) fn slack_bytes(&self) -> usize {
        (self.values.capacity() - self.values.len()) * std::mem::size_of::<u16>()
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.values.shrink_to_fit();
    }
}

impl FromIterator<u16> for ArrayContainer {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        let values = iter.into_iter().sorted().dedup().collect_vec();
        Self::from_sorted_unchecked(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_contains() {
        let mut array = ArrayContainer::new();
        assert!(array.insert(5));
        assert!(!array.insert(5));
        assert!(array.insert(1));
        assert!(array.contains(1));
        assert!(array.contains(5));
        assert!(!array.contains(3));
        assert_eq!(array.values(), &[1, 5]);
        assert!(array.remove(1));
        assert!(!array.remove(1));
        assert_eq!(array.cardinality(), 1);
    }

    #[test]
    fn test_rank_select() {
        let array = ArrayContainer::from_iter([10u16, 20, 30]);
        assert_eq!(array.rank(9), 0);
        assert_eq!(array.rank(10), 1);
        assert_eq!(array.rank(25), 2);
        assert_eq!(array.rank(65535), 3);
        assert_eq!(array.select(0), Some(10));
        assert_eq!(array.select(2), Some(30));
        assert_eq!(array.select(3), None);
        assert_eq!(array.min(), Some(10));
        assert_eq!(array.max(), Some(30));
    }

    #[test]
    fn test_ranges() {
        let mut array = ArrayContainer::from_iter([1u16, 5, 6, 7, 100]);
        assert!(array.contains_range(5, 7));
        assert!(!array.contains_range(5, 8));
        assert!(!array.contains_range(0, 1));

        array.insert_range(4, 9);
        assert_eq!(array.values(), &[1, 4, 5, 6, 7, 8, 9, 100]);

        array.remove_range(5, 8);
        assert_eq!(array.values(), &[1, 4, 9, 100]);

        array.remove_range(200, 300);
        assert_eq!(array.cardinality(), 4);

        let mut edge = ArrayContainer::new();
        edge.insert_range(65534, 65535);
        assert_eq!(edge.values(), &[65534, 65535]);
        assert!(edge.contains_range(65534, 65535));
    }

    #[test]
    fn test_pairwise() {
        let a = ArrayContainer::from_iter([1u16, 2, 3]);
        let b = ArrayContainer::from_iter([3u16, 4, 5]);
        assert_eq!(a.union(&b).values(), &[1, 2, 3, 4, 5]);
        assert_eq!(a.intersection(&b).values(), &[3]);
        assert_eq!(a.difference(&b).values(), &[1, 2]);
        assert_eq!(a.symmetric_difference(&b).values(), &[1, 2, 4, 5]);
        assert_eq!(a.intersection_cardinality(&b), 1);
        assert!(a.intersection(&b).is_subset(&b));
        assert!(!a.is_subset(&b));
    }

    #[test]
    fn test_count_runs() {
        assert_eq!(ArrayContainer::new().count_runs(), 0);
        assert_eq!(ArrayContainer::from_iter([7u16]).count_runs(), 1);
        assert_eq!(ArrayContainer::from_iter([1u16, 2, 3, 7, 8, 10]).count_runs(), 3);
        assert_eq!(ArrayContainer::from_iter([65534u16, 65535]).count_runs(), 1);
    }
}
