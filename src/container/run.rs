use std::fmt::{self, Debug};

use crate::container::{array::ArrayContainer, bitmap::BitmapContainer};

/// An interval of offsets `[start, start + len]`; `len` is the interval
/// length minus one, so a singleton is `(v, 0)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Run {
    pub(crate) start: u16,
    pub(crate) len: u16,
}

static_assertions::const_assert_eq!(std::mem::size_of::<Run>(), 4);

impl Run {
    #[inline]
    pub(crate) fn new(start: u16, len: u16) -> Self {
        Self { start, len }
    }

    /// Run covering `[start, end]`, both inclusive.
    #[inline]
    pub(crate) fn from_bounds(start: u16, end: u16) -> Self {
        debug_assert!(start <= end);
        Self { start, len: end - start }
    }

    /// Inclusive upper bound.
    #[inline]
    pub(crate) fn end(self) -> u16 {
        self.start + self.len
    }
}

/// Run-length-encoded representation: strictly ordered runs, no two of
/// which touch or overlap.
#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct RunContainer {
    runs: Vec<Run>,
}

impl Debug for RunContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunContainer({} in {} runs)", self.cardinality(), self.runs.len())
    }
}

impl RunContainer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn from_runs_unchecked(runs: Vec<Run>) -> Self {
        debug_assert!(
            runs.windows(2)
                .all(|w| u32::from(w[0].end()) + 1 < u32::from(w[1].start))
        );
        Self { runs }
    }

    /// Construct from an ascending, duplicate-free offset iterator.
    pub(crate) fn from_sorted_unchecked(values: impl IntoIterator<Item = u16>) -> Self {
        let mut runs = Vec::new();
        let mut cursor: Option<(u16, u16)> = None;
        for value in values {
            match cursor {
                Some((start, end)) if u32::from(end) + 1 == u32::from(value) => {
                    cursor = Some((start, value));
                }
                Some((start, end)) => {
                    runs.push(Run::from_bounds(start, end));
                    cursor = Some((value, value));
                }
                None => cursor = Some((value, value)),
            }
        }
        if let Some((start, end)) = cursor {
            runs.push(Run::from_bounds(start, end));
        }
        Self { runs }
    }

    #[inline]
    pub(crate) fn runs(&self) -> &[Run] {
        &self.runs
    }

    #[inline]
    pub(crate) fn n_runs(&self) -> usize {
        self.runs.len()
    }

    /// Serialized size of a run body with `n_runs` runs: a u16 count
    /// followed by two u16s per run.
    #[inline]
    pub(crate) const fn serialized_size(n_runs: usize) -> usize {
        2 + 4 * n_runs
    }

    pub(crate) fn cardinality(&self) -> u32 {
        self.runs.iter().map(|r| u32::from(r.len) + 1).sum()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.runs == [Run::new(0, u16::MAX)]
    }

    /// Index of the run containing `offset`, if any.
    fn find(&self, offset: u16) -> Option<usize> {
        match self.runs.binary_search_by(|r| r.start.cmp(&offset)) {
            Ok(index) => Some(index),
            Err(0) => None,
            Err(index) => (self.runs[index - 1].end() >= offset).then_some(index - 1),
        }
    }

    #[inline]
    pub(crate) fn contains(&self, offset: u16) -> bool {
        self.find(offset).is_some()
    }

    pub(crate) fn insert(&mut self, offset: u16) -> bool {
        let index = match self.runs.binary_search_by(|r| r.start.cmp(&offset)) {
            Ok(_) => return false,
            Err(index) => index,
        };
        if index > 0 && self.runs[index - 1].end() >= offset {
            return false;
        }

        let extends_prev =
            index > 0 && u32::from(self.runs[index - 1].end()) + 1 == u32::from(offset);
        let extends_next =
            index < self.runs.len() && u32::from(offset) + 1 == u32::from(self.runs[index].start);

        match (extends_prev, extends_next) {
            (true, true) => {
                let end = self.runs[index].end();
                self.runs[index - 1].len = end - self.runs[index - 1].start;
                self.runs.remove(index);
            }
            (true, false) => self.runs[index - 1].len += 1,
            (false, true) => {
                self.runs[index].start = offset;
                self.runs[index].len += 1;
            }
            (false, false) => self.runs.insert(index, Run::new(offset, 0)),
        }
        true
    }

    pub(crate) fn remove(&mut self, offset: u16) -> bool {
        let Some(index) = self.find(offset) else {
            return false;
        };
        let run = self.runs[index];
        if run.len == 0 {
            self.runs.remove(index);
        } else if offset == run.start {
            self.runs[index] = Run::from_bounds(offset + 1, run.end());
        } else if offset == run.end() {
            self.runs[index].len -= 1;
        } else {
            self.runs[index] = Run::from_bounds(run.start, offset - 1);
            self.runs.insert(index + 1, Run::from_bounds(offset + 1, run.end()));
        }
        true
    }

    pub(crate) fn min(&self) -> Option<u16> {
        self.runs.first().map(|r| r.start)
    }

    pub(crate) fn max(&self) -> Option<u16> {
        self.runs.last().map(|r| r.end())
    }

    /// Count of values `<= offset`.
    pub(crate) fn rank(&self, offset: u16) -> u32 {
        let mut rank = 0;
        for run in &self.runs {
            if offset < run.start {
                break;
            }
            if offset <= run.end() {
                rank += u32::from(offset - run.start) + 1;
                break;
            }
            rank += u32::from(run.len) + 1;
        }
        rank
    }

    pub(crate) fn select(&self, n: u32) -> Option<u16> {
        let mut remaining = n;
        for run in &self.runs {
            let len = u32::from(run.len) + 1;
            if remaining < len {
                return Some(run.start + remaining as u16);
            }
            remaining -= len;
        }
        None
    }

    pub(crate) fn contains_range(&self, lo: u16, hi: u16) -> bool {
        // runs never touch, so a contained range lies within a single run
        self.find(lo).is_some_and(|index| self.runs[index].end() >= hi)
    }

    pub(crate) fn insert_range(&mut self, lo: u16, hi: u16) {
        let (lo32, hi32) = (u32::from(lo), u32::from(hi));
        // runs overlapping or adjacent to [lo, hi]
        let i = self.runs.partition_point(|r| u32::from(r.end()) + 1 < lo32);
        let j = self.runs.partition_point(|r| u32::from(r.start) <= hi32 + 1);
        let (start, end) = if i < j {
            (self.runs[i].start.min(lo), self.runs[j - 1].end().max(hi))
        } else {
            (lo, hi)
        };
        self.runs.splice(i..j, [Run::from_bounds(start, end)]);
    }

    pub(crate) fn remove_range(&mut self, lo: u16, hi: u16) {
        let i = self.runs.partition_point(|r| r.end() < lo);
        let j = self.runs.partition_point(|r| r.start <= hi);
        if i >= j {
            return;
        }
        let mut keep = Vec::with_capacity(2);
        if self.runs[i].start < lo {
            keep.push(Run::from_bounds(self.runs[i].start, lo - 1));
        }
        if self.runs[j - 1].end() > hi {
            keep.push(Run::from_bounds(hi + 1, self.runs[j - 1].end()));
        }
        self.runs.splice(i..j, keep);
    }

    pub(crate) fn flip_range(&mut self, lo: u16, hi: u16) {
        *self = self.symmetric_difference(&Self {
            runs: vec![Run::from_bounds(lo, hi)],
        });
    }

    pub(crate) fn iter(&self) -> RunValuesIter<'_> {
        RunValuesIter { runs: &self.runs, front: None, back: None }
    }

    /// Append a run that starts at or after the tail run's start, merging
    /// with or absorbing into the tail when they touch or overlap.
    pub(crate) fn smart_append(&mut self, run: Run) {
        let Some(last) = self.runs.last_mut() else {
            self.runs.push(run);
            return;
        };
        debug_assert!(run.start >= last.start);
        let prev_end = u32::from(last.end());
        if u32::from(run.start) > prev_end + 1 {
            self.runs.push(run);
        } else {
            let new_end = prev_end.max(u32::from(run.start) + u32::from(run.len));
            last.len = (new_end - u32::from(last.start)) as u16;
        }
    }

    /// Append a run under XOR semantics: overlap with the tail cancels,
    /// adjacency extends, puncturing splits the tail. The run must start at
    /// or after the tail run's start.
    pub(crate) fn smart_append_exclusive(&mut self, run: Run) {
        let Some(&last) = self.runs.last() else {
            self.runs.push(run);
            return;
        };
        debug_assert!(run.start >= last.start);
        let old_end = u32::from(last.end()) + 1; // exclusive
        let start = u32::from(run.start);

        if start > old_end {
            self.runs.push(run);
            return;
        }
        if start == old_end {
            self.runs.last_mut().unwrap().len += run.len + 1;
            return;
        }

        let new_end = start + u32::from(run.len) + 1; // exclusive
        if start == u32::from(last.start) {
            if new_end < old_end {
                *self.runs.last_mut().unwrap() =
                    Run::new(new_end as u16, (old_end - new_end - 1) as u16);
            } else if new_end > old_end {
                *self.runs.last_mut().unwrap() =
                    Run::new(old_end as u16, (new_end - old_end - 1) as u16);
            } else {
                self.runs.pop();
            }
        } else {
            self.runs.last_mut().unwrap().len = (start - u32::from(last.start) - 1) as u16;
            if new_end < old_end {
                self.runs.push(Run::new(new_end as u16, (old_end - new_end - 1) as u16));
            } else if new_end > old_end {
                self.runs.push(Run::new(old_end as u16, (new_end - old_end - 1) as u16));
            }
        }
    }

    fn merge_runs<'a>(&'a self, other: &'a Self) -> impl Iterator<Item = Run> + 'a {
        itertools::merge_join_by(
            self.runs.iter().copied(),
            other.runs.iter().copied(),
            |a, b| a.start.cmp(&b.start),
        )
        .flat_map(|pair| {
            let (left, right) = pair.left_and_right();
            left.into_iter().chain(right)
        })
    }

    pub(crate) fn union(&self, other: &Self) -> Self {
        let mut out = Self::new();
        for run in self.merge_runs(other) {
            out.smart_append(run);
        }
        out
    }

    pub(crate) fn symmetric_difference(&self, other: &Self) -> Self {
        let mut out = Self::new();
        for run in self.merge_runs(other) {
            out.smart_append_exclusive(run);
        }
        out
    }

    pub(crate) fn intersection(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.runs.len() && j < other.runs.len() {
            let (a, b) = (self.runs[i], other.runs[j]);
            let start = a.start.max(b.start);
            let end = a.end().min(b.end());
            if start <= end {
                out.push(Run::from_bounds(start, end));
            }
            if a.end() <= b.end() {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { runs: out }
    }

    pub(crate) fn difference(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let mut j = 0;
        for &run in &self.runs {
            let end = u32::from(run.end());
            while j < other.runs.len() && u32::from(other.runs[j].end()) < u32::from(run.start) {
                j += 1;
            }
            let mut cursor = u32::from(run.start);
            let mut k = j;
            while cursor <= end {
                if k == other.runs.len() || u32::from(other.runs[k].start) > end {
                    out.push(Run::from_bounds(cursor as u16, end as u16));
                    break;
                }
                let hole = other.runs[k];
                if u32::from(hole.start) > cursor {
                    out.push(Run::from_bounds(cursor as u16, hole.start - 1));
                }
                cursor = cursor.max(u32::from(hole.end()) + 1);
                k += 1;
            }
        }
        Self { runs: out }
    }

    pub(crate) fn intersection_cardinality(&self, other: &Self) -> u32 {
        let mut total = 0;
        let (mut i, mut j) = (0, 0);
        while i < self.runs.len() && j < other.runs.len() {
            let (a, b) = (self.runs[i], other.runs[j]);
            let start = a.start.max(b.start);
            let end = a.end().min(b.end());
            if start <= end {
                total += u32::from(end - start) + 1;
            }
            if a.end() <= b.end() {
                i += 1;
            } else {
                j += 1;
            }
        }
        total
    }

    pub(crate) fn is_subset(&self, other: &Self) -> bool {
        let mut j = 0;
        for &run in &self.runs {
            while j < other.runs.len() && other.runs[j].end() < run.start {
                j += 1;
            }
            match other.runs.get(j) {
                Some(cover) if cover.start <= run.start && run.end() <= cover.end() => {}
                _ => return false,
            }
        }
        true
    }

    pub(crate) fn to_array(&self) -> ArrayContainer {
        ArrayContainer::from_sorted_unchecked(self.iter().collect())
    }

    pub(crate) fn to_bitmap(&self) -> BitmapContainer {
        let mut bitmap = BitmapContainer::new();
        for run in &self.runs {
            bitmap.insert_range(run.start, run.end());
        }
        bitmap
    }

    pub(crate) fn slack_bytes(&self) -> usize {
        (self.runs.capacity() - self.runs.len()) * std::mem::size_of::<Run>()
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.runs.shrink_to_fit();
    }
}

/// Double-ended cursor over the values covered by a run list.
pub(crate) struct RunValuesIter<'a> {
    runs: &'a [Run],
    // inclusive remaining windows at each end
    front: Option<(u32, u32)>,
    back: Option<(u32, u32)>,
}

impl RunValuesIter<'_> {
    /// Move the front of the cursor to the first value `>= offset`. Never
    /// moves backwards.
    pub(crate) fn advance_to(&mut self, offset: u16) {
        let target = u32::from(offset);
        if let Some((lo, hi)) = &mut self.front {
            if *hi >= target {
                *lo = (*lo).max(target);
                return;
            }
            self.front = None;
        }
        let skip = self.runs.partition_point(|r| u32::from(r.end()) < target);
        self.runs = &self.runs[skip..];
        if let Some((first, rest)) = self.runs.split_first() {
            if u32::from(first.start) < target {
                self.runs = rest;
                self.front = Some((target, u32::from(first.end())));
            }
            return;
        }
        if let Some((lo, hi)) = &mut self.back {
            if *hi < target {
                self.back = None;
            } else {
                *lo = (*lo).max(target);
            }
        }
    }

    fn yield_low(window: &mut Option<(u32, u32)>) -> Option<u16> {
        let (lo, hi) = window.as_mut()?;
        let value = *lo;
        if *lo == *hi {
            *window = None;
        } else {
            *lo += 1;
        }
        Some(value as u16)
    }

    fn yield_high(window: &mut Option<(u32, u32)>) -> Option<u16> {
        let (lo, hi) = window.as_mut()?;
        let value = *hi;
        if *lo == *hi {
            *window = None;
        } else {
            *hi -= 1;
        }
        Some(value as u16)
    }
}

impl Iterator for RunValuesIter<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        if let Some(value) = Self::yield_low(&mut self.front) {
            return Some(value);
        }
        if let Some((first, rest)) = self.runs.split_first() {
            self.runs = rest;
            self.front = Some((u32::from(first.start), u32::from(first.end())));
            return Self::yield_low(&mut self.front);
        }
        Self::yield_low(&mut self.back)
    }
}

impl DoubleEndedIterator for RunValuesIter<'_> {
    fn next_back(&mut self) -> Option<u16> {
        if let Some(value) = Self::yield_high(&mut self.back) {
            return Some(value);
        }
        if let Some((last, rest)) = self.runs.split_last() {
            self.runs = rest;
            self.back = Some((u32::from(last.start), u32::from(last.end())));
            return Self::yield_high(&mut self.back);
        }
        Self::yield_high(&mut self.front)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(container: &RunContainer) -> Vec<(u16, u16)> {
        container.runs().iter().map(|r| (r.start, r.len)).collect()
    }

    #[test]
    fn test_insert_coalesce() {
        let mut rc = RunContainer::new();
        assert!(rc.insert(5));
        assert!(!rc.insert(5));
        assert!(rc.insert(7));
        assert_eq!(runs(&rc), [(5, 0), (7, 0)]);
        // 6 bridges both runs
        assert!(rc.insert(6));
        assert_eq!(runs(&rc), [(5, 2)]);
        assert!(rc.insert(4));
        assert!(rc.insert(8));
        assert_eq!(runs(&rc), [(4, 4)]);
        assert_eq!(rc.cardinality(), 5);
    }

    #[test]
    fn test_remove_split() {
        let mut rc = RunContainer::from_sorted_unchecked(10..=20);
        assert!(rc.remove(15));
        assert_eq!(runs(&rc), [(10, 4), (16, 4)]);
        assert!(rc.remove(10));
        assert!(rc.remove(20));
        assert_eq!(runs(&rc), [(11, 3), (16, 3)]);
        assert!(!rc.remove(15));
        let mut singleton = RunContainer::from_sorted_unchecked([3u16]);
        assert!(singleton.remove(3));
        assert!(singleton.is_empty());
    }

    #[test]
    fn test_contains_rank_select() {
        let rc = RunContainer::from_runs_unchecked(vec![
            Run::from_bounds(2, 4),
            Run::from_bounds(10, 10),
            Run::from_bounds(100, 103),
        ]);
        assert!(rc.contains(2));
        assert!(rc.contains(4));
        assert!(!rc.contains(5));
        assert!(rc.contains(10));
        assert!(rc.contains_range(100, 103));
        assert!(!rc.contains_range(4, 10));

        assert_eq!(rc.rank(1), 0);
        assert_eq!(rc.rank(3), 2);
        assert_eq!(rc.rank(10), 4);
        assert_eq!(rc.rank(65535), 8);
        let values: Vec<u16> = rc.iter().collect();
        assert_eq!(values, [2, 3, 4, 10, 100, 101, 102, 103]);
        for (n, &v) in values.iter().enumerate() {
            assert_eq!(rc.select(n as u32), Some(v));
        }
        assert_eq!(rc.select(8), None);
        assert_eq!(rc.min(), Some(2));
        assert_eq!(rc.max(), Some(103));
    }

    #[test]
    fn test_iter_double_ended() {
        let rc = RunContainer::from_runs_unchecked(vec![
            Run::from_bounds(1, 3),
            Run::from_bounds(7, 8),
        ]);
        let forward: Vec<u16> = rc.iter().collect();
        assert_eq!(forward, [1, 2, 3, 7, 8]);
        let backward: Vec<u16> = rc.iter().rev().collect();
        assert_eq!(backward, [8, 7, 3, 2, 1]);

        let mut iter = rc.iter();
        assert_eq!(iter.next(), Some(1));
        assert_eq!(iter.next_back(), Some(8));
        assert_eq!(iter.next_back(), Some(7));
        assert_eq!(iter.next_back(), Some(3));
        assert_eq!(iter.next(), Some(2));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn test_insert_remove_range() {
        let mut rc = RunContainer::new();
        rc.insert_range(10, 20);
        rc.insert_range(30, 40);
        assert_eq!(runs(&rc), [(10, 10), (30, 10)]);
        // adjacent on both sides fuses everything
        rc.insert_range(21, 29);
        assert_eq!(runs(&rc), [(10, 30)]);

        rc.remove_range(15, 35);
        assert_eq!(runs(&rc), [(10, 4), (36, 4)]);
        rc.remove_range(0, 65535);
        assert!(rc.is_empty());
    }

    #[test]
    fn test_flip_range() {
        let mut rc = RunContainer::from_runs_unchecked(vec![Run::from_bounds(5, 10)]);
        rc.flip_range(8, 12);
        assert_eq!(runs(&rc), [(5, 2), (11, 1)]);
        rc.flip_range(8, 12);
        assert_eq!(runs(&rc), [(5, 5)]);
    }

    #[test]
    fn test_smart_append() {
        let mut rc = RunContainer::new();
        rc.smart_append(Run::new(5, 2));
        rc.smart_append(Run::new(6, 0)); // absorbed
        assert_eq!(runs(&rc), [(5, 2)]);
        rc.smart_append(Run::new(8, 1)); // touches, extends
        assert_eq!(runs(&rc), [(5, 4)]);
        rc.smart_append(Run::new(20, 0));
        assert_eq!(runs(&rc), [(5, 4), (20, 0)]);
    }

    #[test]
    fn test_smart_append_exclusive() {
        // disjoint append
        let mut rc = RunContainer::new();
        rc.smart_append_exclusive(Run::new(1, 1));
        rc.smart_append_exclusive(Run::new(10, 1));
        assert_eq!(runs(&rc), [(1, 1), (10, 1)]);

        // adjacency extends
        let mut rc = RunContainer::new();
        rc.smart_append_exclusive(Run::new(1, 1));
        rc.smart_append_exclusive(Run::new(3, 1));
        assert_eq!(runs(&rc), [(1, 3)]);

        // exact cancellation
        let mut rc = RunContainer::new();
        rc.smart_append_exclusive(Run::new(4, 3));
        rc.smart_append_exclusive(Run::new(4, 3));
        assert!(rc.is_empty());

        // same start, shorter: leftover tail of the old run
        let mut rc = RunContainer::new();
        rc.smart_append_exclusive(Run::new(4, 5)); // [4,9]
        rc.smart_append_exclusive(Run::new(4, 2)); // [4,6] cancels
        assert_eq!(runs(&rc), [(7, 2)]);

        // same start, longer: leftover tail of the new run
        let mut rc = RunContainer::new();
        rc.smart_append_exclusive(Run::new(4, 2)); // [4,6]
        rc.smart_append_exclusive(Run::new(4, 5)); // [4,9]
        assert_eq!(runs(&rc), [(7, 2)]);

        // puncture in the middle splits the tail
        let mut rc = RunContainer::new();
        rc.smart_append_exclusive(Run::new(0, 9)); // [0,9]
        rc.smart_append_exclusive(Run::new(4, 1)); // [4,5]
        assert_eq!(runs(&rc), [(0, 3), (6, 3)]);

        // overlap running past the tail end
        let mut rc = RunContainer::new();
        rc.smart_append_exclusive(Run::new(0, 5)); // [0,5]
        rc.smart_append_exclusive(Run::new(3, 6)); // [3,9]
        assert_eq!(runs(&rc), [(0, 2), (6, 3)]);
    }

    #[test]
    fn test_pairwise() {
        let a = RunContainer::from_runs_unchecked(vec![
            Run::from_bounds(0, 5),
            Run::from_bounds(10, 15),
        ]);
        let b = RunContainer::from_runs_unchecked(vec![
            Run::from_bounds(3, 12),
            Run::from_bounds(20, 21),
        ]);

        assert_eq!(runs(&a.union(&b)), [(0, 15), (20, 1)]);
        assert_eq!(runs(&a.intersection(&b)), [(3, 2), (10, 2)]);
        assert_eq!(runs(&a.difference(&b)), [(0, 2), (13, 2)]);
        assert_eq!(runs(&b.difference(&a)), [(6, 3), (20, 1)]);
        assert_eq!(
            runs(&a.symmetric_difference(&b)),
            [(0, 2), (6, 3), (13, 2), (20, 1)]
        );
        assert_eq!(a.intersection_cardinality(&b), 6);
        assert!(a.intersection(&b).is_subset(&a));
        assert!(!a.is_subset(&b));
        assert!(a.is_subset(&a));
    }

    #[test]
    fn test_conversions() {
        let rc = RunContainer::from_sorted_unchecked([1u16, 2, 3, 100, 65535]);
        assert_eq!(runs(&rc), [(1, 2), (100, 0), (65535, 0)]);
        assert_eq!(rc.to_array().values(), &[1, 2, 3, 100, 65535]);
        let bitmap = rc.to_bitmap();
        assert_eq!(bitmap.cardinality(), 5);
        assert!(bitmap.contains(65535));

        let full = RunContainer::from_runs_unchecked(vec![Run::new(0, u16::MAX)]);
        assert!(full.is_full());
        assert_eq!(full.cardinality(), 65536);
    }
}
