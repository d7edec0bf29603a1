use std::fmt::{self, Debug};

use crate::{
    container::array::ArrayContainer,
    words::{self, OnesIter, Words},
};

/// Dense 65 536-bit representation. The cached cardinality is `None` while
/// an operation sequence has deferred the popcount (lazy ops); `repair`
/// reconciles it. Every container reachable from a [`crate::Chert`] has an
/// exact cache.
#[derive(Clone)]
pub(crate) struct BitmapContainer {
    words: Box<Words>,
    cardinality: Option<u32>,
}

impl Debug for BitmapContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cardinality {
            Some(card) => write!(f, "BitmapContainer({card})"),
            None => write!(f, "BitmapContainer(?)"),
        }
    }
}

impl Default for BitmapContainer {
    fn default() -> Self {
        Self {
            words: Box::new([0; words::WORDS]),
            cardinality: Some(0),
        }
    }
}

impl PartialEq for BitmapContainer {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}

impl Eq for BitmapContainer {}

impl BitmapContainer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_words(words: Box<Words>) -> Self {
        let cardinality = Some(words::count_ones(&words));
        Self { words, cardinality }
    }

    #[inline]
    pub(crate) fn words(&self) -> &Words {
        &self.words
    }

    #[inline]
    pub(crate) fn cardinality(&self) -> u32 {
        match self.cardinality {
            Some(card) => card,
            None => words::count_ones(&self.words),
        }
    }

    /// Drop the cardinality cache; subsequent mutators skip bookkeeping
    /// until `repair` runs.
    #[inline]
    pub(crate) fn mark_lazy(&mut self) {
        self.cardinality = None;
    }

    /// Recompute and store the cardinality after a lazy op sequence.
    pub(crate) fn repair(&mut self) {
        if self.cardinality.is_none() {
            self.cardinality = Some(words::count_ones(&self.words));
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }

    #[inline]
    pub(crate) fn contains(&self, offset: u16) -> bool {
        words::get(&self.words, offset)
    }

    pub(crate) fn insert(&mut self, offset: u16) -> bool {
        let inserted = words::set(&mut self.words, offset);
        if inserted {
            if let Some(card) = &mut self.cardinality {
                *card += 1;
            }
        }
        inserted
    }

    pub(crate) fn remove(&mut self, offset: u16) -> bool {
        let removed = words::clear(&mut self.words, offset);
        if removed {
            if let Some(card) = &mut self.cardinality {
                *card -= 1;
            }
        }
        removed
    }

    #[inline]
    pub(crate) fn min(&self) -> Option<u16> {
        words::first_one(&self.words)
    }

    #[inline]
    pub(crate) fn max(&self) -> Option<u16> {
        words::last_one(&self.words)
    }

    #[inline]
    pub(crate) fn rank(&self, offset: u16) -> u32 {
        words::rank(&self.words, offset)
    }

    #[inline]
    pub(crate) fn select(&self, n: u32) -> Option<u16> {
        words::select(&self.words, n)
    }

    pub(crate) fn contains_range(&self, lo: u16, hi: u16) -> bool {
        let (start, end) = (u32::from(lo), u32::from(hi) + 1);
        words::ones_in_range(&self.words, start, end) == end - start
    }

    pub(crate) fn ones_in_range(&self, lo: u16, hi: u16) -> u32 {
        words::ones_in_range(&self.words, u32::from(lo), u32::from(hi) + 1)
    }

    pub(crate) fn insert_range(&mut self, lo: u16, hi: u16) {
        let (start, end) = (u32::from(lo), u32::from(hi) + 1);
        if let Some(card) = self.cardinality {
            let present = words::ones_in_range(&self.words, start, end);
            self.cardinality = Some(card + (end - start) - present);
        }
        words::set_range(&mut self.words, start, end);
    }

    pub(crate) fn remove_range(&mut self, lo: u16, hi: u16) {
        let (start, end) = (u32::from(lo), u32::from(hi) + 1);
        if let Some(card) = self.cardinality {
            let present = words::ones_in_range(&self.words, start, end);
            self.cardinality = Some(card - present);
        }
        words::clear_range(&mut self.words, start, end);
    }

    pub(crate) fn flip_range(&mut self, lo: u16, hi: u16) {
        let (start, end) = (u32::from(lo), u32::from(hi) + 1);
        if let Some(card) = self.cardinality {
            let present = words::ones_in_range(&self.words, start, end);
            self.cardinality = Some(card + (end - start) - 2 * present);
        }
        words::flip_range(&mut self.words, start, end);
    }

    pub(crate) fn set_list(&mut self, offsets: &[u16]) {
        match self.cardinality {
            Some(card) => {
                self.cardinality = Some(words::set_list(&mut self.words, card, offsets));
            }
            None => {
                for &offset in offsets {
                    words::set(&mut self.words, offset);
                }
            }
        }
    }

    pub(crate) fn clear_list(&mut self, offsets: &[u16]) {
        match self.cardinality {
            Some(card) => {
                self.cardinality = Some(words::clear_list(&mut self.words, card, offsets));
            }
            None => {
                for &offset in offsets {
                    words::clear(&mut self.words, offset);
                }
            }
        }
    }

    pub(crate) fn flip_list(&mut self, offsets: &[u16]) {
        match self.cardinality {
            Some(card) => {
                self.cardinality = Some(words::flip_list(&mut self.words, card, offsets));
            }
            None => {
                for &offset in offsets {
                    let word = &mut self.words[usize::from(offset) / 64];
                    *word ^= 1 << (offset % 64);
                }
            }
        }
    }

    pub(crate) fn iter(&self) -> OnesIter<'_> {
        OnesIter::new(&self.words)
    }

    pub(crate) fn count_runs(&self) -> u32 {
        words::count_runs(&self.words)
    }

    pub(crate) fn to_array(&self) -> ArrayContainer {
        ArrayContainer::from_sorted_unchecked(self.iter().collect())
    }

    fn zip_words(&self, other: &Self, op: impl Fn(u64, u64) -> u64) -> Self {
        let mut words = Box::new([0u64; words::WORDS]);
        let mut cardinality = 0;
        for ((out, &a), &b) in words.iter_mut().zip(self.words.iter()).zip(other.words.iter()) {
            *out = op(a, b);
            cardinality += out.count_ones();
        }
        Self { words, cardinality: Some(cardinality) }
    }

    fn zip_words_assign(&mut self, other: &Self, op: impl Fn(u64, u64) -> u64) {
        let track = self.cardinality.is_some();
        let mut cardinality = 0;
        for (a, &b) in self.words.iter_mut().zip(other.words.iter()) {
            *a = op(*a, b);
            if track {
                cardinality += a.count_ones();
            }
        }
        if track {
            self.cardinality = Some(cardinality);
        }
    }

    pub(crate) fn or(&self, other: &Self) -> Self {
        self.zip_words(other, |a, b| a | b)
    }

    pub(crate) fn and(&self, other: &Self) -> Self {
        self.zip_words(other, |a, b| a & b)
    }

    pub(crate) fn xor(&self, other: &Self) -> Self {
        self.zip_words(other, |a, b| a ^ b)
    }

    pub(crate) fn andnot(&self, other: &Self) -> Self {
        self.zip_words(other, |a, b| a & !b)
    }

    pub(crate) fn or_assign(&mut self, other: &Self) {
        self.zip_words_assign(other, |a, b| a | b);
    }

    pub(crate) fn and_assign(&mut self, other: &Self) {
        self.zip_words_assign(other, |a, b| a & b);
    }

    pub(crate) fn xor_assign(&mut self, other: &Self) {
        self.zip_words_assign(other, |a, b| a ^ b);
    }

    pub(crate) fn andnot_assign(&mut self, other: &Self) {
        self.zip_words_assign(other, |a, b| a & !b);
    }

    pub(crate) fn intersection_cardinality(&self, other: &Self) -> u32 {
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(&a, &b)| (a & b).count_ones())
            .sum()
    }

    pub(crate) fn is_subset(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(&a, &b)| a & !b == 0)
    }
}

impl FromIterator<u16> for BitmapContainer {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        let mut bitmap = Self::new();
        for offset in iter {
            bitmap.insert(offset);
        }
        bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut bitmap = BitmapContainer::new();
        assert!(bitmap.insert(42));
        assert!(!bitmap.insert(42));
        assert!(bitmap.contains(42));
        assert_eq!(bitmap.cardinality(), 1);
        assert!(bitmap.remove(42));
        assert!(!bitmap.remove(42));
        assert!(bitmap.is_empty());
    }

    #[test]
    fn test_ranges() {
        let mut bitmap = BitmapContainer::new();
        bitmap.insert_range(100, 199);
        assert_eq!(bitmap.cardinality(), 100);
        assert!(bitmap.contains_range(100, 199));
        assert!(!bitmap.contains_range(99, 199));

        bitmap.remove_range(150, 300);
        assert_eq!(bitmap.cardinality(), 50);

        // 0..=99 was entirely clear, 100..=149 stays set
        bitmap.flip_range(0, 99);
        assert_eq!(bitmap.cardinality(), 150);
        assert!(bitmap.contains(0));
        assert!(bitmap.contains(100));
        bitmap.flip_range(0, 99);
        assert_eq!(bitmap.cardinality(), 50);
    }

    #[test]
    fn test_lazy_repair() {
        let mut bitmap = BitmapContainer::new();
        bitmap.mark_lazy();
        bitmap.set_list(&[1, 2, 3]);
        bitmap.insert_range(10, 19);
        // lazy reads recompute on the fly; repair restores the cache
        assert_eq!(bitmap.cardinality(), 13);
        bitmap.repair();
        assert_eq!(bitmap.cardinality(), 13);
        assert!(bitmap.remove(10));
        assert_eq!(bitmap.cardinality(), 12);
    }

    #[test]
    fn test_pairwise() {
        let a: BitmapContainer = (0u16..100).collect();
        let b: BitmapContainer = (50u16..150).collect();

        assert_eq!(a.or(&b).cardinality(), 150);
        assert_eq!(a.and(&b).cardinality(), 50);
        assert_eq!(a.andnot(&b).cardinality(), 50);
        assert_eq!(a.xor(&b).cardinality(), 100);
        assert_eq!(a.intersection_cardinality(&b), 50);

        let mut c = a.clone();
        c.or_assign(&b);
        assert_eq!(c, a.or(&b));
        assert!(a.and(&b).is_subset(&a));
        assert!(!a.is_subset(&b));
    }

    #[test]
    fn test_rank_select_minmax() {
        let bitmap: BitmapContainer = [5u16, 900, 65535].into_iter().collect();
        assert_eq!(bitmap.min(), Some(5));
        assert_eq!(bitmap.max(), Some(65535));
        assert_eq!(bitmap.rank(4), 0);
        assert_eq!(bitmap.rank(900), 2);
        assert_eq!(bitmap.select(1), Some(900));
        assert_eq!(bitmap.select(3), None);

        let mut full = BitmapContainer::new();
        full.insert_range(0, 65535);
        assert!(full.contains_range(0, 65535));
        assert_eq!(full.cardinality(), 65536);
    }

    #[test]
    fn test_to_array_roundtrip() {
        let offsets = [0u16, 1, 63, 64, 4095, 65535];
        let bitmap: BitmapContainer = offsets.into_iter().collect();
        assert_eq!(bitmap.to_array().values(), &offsets);
        assert_eq!(bitmap.count_runs(), 4);
    }
}
