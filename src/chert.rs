use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    fmt::{self, Debug},
    ops::{Bound, RangeBounds},
    sync::Arc,
};

use crate::{
    container::{Container, Kind},
    iter::Iter,
    join, split,
};

/// A directory entry: the container holding all offsets of one high key.
/// The body is reference-counted so copy-on-write clones can share it;
/// every mutation path goes through [`Arc::make_mut`], which clones a
/// shared body before the first write.
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) key: u16,
    pub(crate) container: Arc<Container>,
}

impl Entry {
    fn new(key: u16, container: Container) -> Self {
        Self { key, container: Arc::new(container) }
    }
}

/// A compressed set of `u32` values.
///
/// The structure is a sorted directory of 16-bit keys, each owning a
/// container for the low 16 bits of its values. Containers adapt between
/// array, bitmap, and run representations as operations change their
/// shape; no entry ever holds an empty container.
pub struct Chert {
    pub(crate) entries: Vec<Entry>,
    copy_on_write: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Union,
    Intersection,
    Difference,
    SymmetricDifference,
}

/// Normalize arbitrary range bounds into an inclusive `[lo, hi]` pair;
/// `None` when the range is empty.
fn bounds(range: impl RangeBounds<u32>) -> Option<(u32, u32)> {
    let lo = match range.start_bound() {
        Bound::Included(&v) => v,
        Bound::Excluded(&v) => v.checked_add(1)?,
        Bound::Unbounded => 0,
    };
    let hi = match range.end_bound() {
        Bound::Included(&v) => v,
        Bound::Excluded(&0) => return None,
        Bound::Excluded(&v) => v - 1,
        Bound::Unbounded => u32::MAX,
    };
    (lo <= hi).then_some((lo, hi))
}

impl Chert {
    pub fn new() -> Self {
        Self { entries: Vec::new(), copy_on_write: false }
    }

    pub(crate) fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries, copy_on_write: false }
    }

    #[inline]
    fn find(&self, key: u16) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&key, |e| e.key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cardinality(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| u64::from(e.container.cardinality()))
            .sum()
    }

    pub fn contains(&self, value: u32) -> bool {
        let (key, offset) = split(value);
        match self.find(key) {
            Ok(index) => self.entries[index].container.contains(offset),
            Err(_) => false,
        }
    }

    /// True when every value of the range is present. Empty ranges are
    /// trivially contained.
    pub fn contains_range(&self, range: impl RangeBounds<u32>) -> bool {
        let Some((lo, hi)) = bounds(range) else {
            return true;
        };
        let (lo_key, lo_offset) = split(lo);
        let (hi_key, hi_offset) = split(hi);
        for key in lo_key..=hi_key {
            let Ok(index) = self.find(key) else {
                return false;
            };
            let first = if key == lo_key { lo_offset } else { 0 };
            let last = if key == hi_key { hi_offset } else { u16::MAX };
            if !self.entries[index].container.contains_range(first, last) {
                return false;
            }
        }
        true
    }

    /// Insert a value, returning true if it was absent.
    pub fn insert(&mut self, value: u32) -> bool {
        let (key, offset) = split(value);
        match self.find(key) {
            Ok(index) => {
                let entry = &mut self.entries[index];
                if entry.container.contains(offset) {
                    false
                } else {
                    Arc::make_mut(&mut entry.container).insert(offset)
                }
            }
            Err(index) => {
                self.entries
                    .insert(index, Entry::new(key, Container::singleton(offset)));
                true
            }
        }
    }

    /// Remove a value, returning true if it was present.
    pub fn remove(&mut self, value: u32) -> bool {
        let (key, offset) = split(value);
        let Ok(index) = self.find(key) else {
            return false;
        };
        let entry = &mut self.entries[index];
        if !entry.container.contains(offset) {
            return false;
        }
        let container = Arc::make_mut(&mut entry.container);
        container.remove(offset);
        if container.is_empty() {
            self.entries.remove(index);
        }
        true
    }

    pub fn insert_range(&mut self, range: impl RangeBounds<u32>) {
        let Some((lo, hi)) = bounds(range) else {
            return;
        };
        let (lo_key, lo_offset) = split(lo);
        let (hi_key, hi_offset) = split(hi);
        for key in lo_key..=hi_key {
            let first = if key == lo_key { lo_offset } else { 0 };
            let last = if key == hi_key { hi_offset } else { u16::MAX };
            match self.find(key) {
                Ok(index) => {
                    Arc::make_mut(&mut self.entries[index].container).insert_range(first, last);
                }
                Err(index) => {
                    self.entries
                        .insert(index, Entry::new(key, Container::from_range(first, last)));
                }
            }
        }
    }

    pub fn remove_range(&mut self, range: impl RangeBounds<u32>) {
        let Some((lo, hi)) = bounds(range) else {
            return;
        };
        let (lo_key, lo_offset) = split(lo);
        let (hi_key, hi_offset) = split(hi);
        let mut index = self.entries.partition_point(|e| e.key < lo_key);
        while index < self.entries.len() && self.entries[index].key <= hi_key {
            let key = self.entries[index].key;
            let first = if key == lo_key { lo_offset } else { 0 };
            let last = if key == hi_key { hi_offset } else { u16::MAX };
            if (first, last) == (0, u16::MAX) {
                self.entries.remove(index);
                continue;
            }
            let container = Arc::make_mut(&mut self.entries[index].container);
            container.remove_range(first, last);
            if container.is_empty() {
                self.entries.remove(index);
            } else {
                index += 1;
            }
        }
    }

    /// Flip every value of the range: present values are removed, absent
    /// values inserted.
    pub fn flip_range(&mut self, range: impl RangeBounds<u32>) {
        let Some((lo, hi)) = bounds(range) else {
            return;
        };
        let (lo_key, lo_offset) = split(lo);
        let (hi_key, hi_offset) = split(hi);
        for key in lo_key..=hi_key {
            let first = if key == lo_key { lo_offset } else { 0 };
            let last = if key == hi_key { hi_offset } else { u16::MAX };
            match self.find(key) {
                Ok(index) => {
                    let container = Arc::make_mut(&mut self.entries[index].container);
                    container.flip_range(first, last);
                    if container.is_empty() {
                        self.entries.remove(index);
                    }
                }
                Err(index) => {
                    self.entries
                        .insert(index, Entry::new(key, Container::from_range(first, last)));
                }
            }
        }
    }

    pub fn minimum(&self) -> Option<u32> {
        let entry = self.entries.first()?;
        entry.container.min().map(|offset| join(entry.key, offset))
    }

    pub fn maximum(&self) -> Option<u32> {
        let entry = self.entries.last()?;
        entry.container.max().map(|offset| join(entry.key, offset))
    }

    /// Count of values `<= value`.
    pub fn rank(&self, value: u32) -> u64 {
        let (key, offset) = split(value);
        let mut rank = 0;
        for entry in &self.entries {
            if entry.key > key {
                break;
            }
            if entry.key == key {
                rank += u64::from(entry.container.rank(offset));
                break;
            }
            rank += u64::from(entry.container.cardinality());
        }
        rank
    }

    /// The `n`-th (0-based) smallest value.
    pub fn select(&self, n: u32) -> Option<u32> {
        let mut remaining = n;
        for entry in &self.entries {
            let cardinality = entry.container.cardinality();
            if remaining < cardinality {
                return entry
                    .container
                    .select(remaining)
                    .map(|offset| join(entry.key, offset));
            }
            remaining -= cardinality;
        }
        None
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter::new(&self.entries)
    }

    pub fn to_vec(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.cardinality() as usize);
        out.extend(self.iter());
        out
    }

    /// At most `limit` values, skipping the `offset` smallest.
    pub fn to_vec_range(&self, offset: u64, limit: usize) -> Vec<u32> {
        if limit == 0 {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut skip = offset;
        for entry in &self.entries {
            let cardinality = u64::from(entry.container.cardinality());
            if skip >= cardinality {
                skip -= cardinality;
                continue;
            }
            for value in entry.container.iter().skip(skip as usize) {
                out.push(join(entry.key, value));
                if out.len() == limit {
                    return out;
                }
            }
            skip = 0;
        }
        out
    }

    fn pairwise(&self, other: &Self, op: SetOp) -> Self {
        use SetOp::*;
        let mut entries = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.entries.len() && j < other.entries.len() {
            let (left, right) = (&self.entries[i], &other.entries[j]);
            match left.key.cmp(&right.key) {
                Ordering::Less => {
                    if op != Intersection {
                        entries.push(left.clone());
                    }
                    i += 1;
                }
                Ordering::Greater => {
                    if matches!(op, Union | SymmetricDifference) {
                        entries.push(right.clone());
                    }
                    j += 1;
                }
                Ordering::Equal => {
                    let out = match op {
                        Union => left.container.or(&right.container),
                        Intersection => left.container.and(&right.container),
                        Difference => left.container.andnot(&right.container),
                        SymmetricDifference => left.container.xor(&right.container),
                    };
                    if !out.is_empty() {
                        entries.push(Entry::new(left.key, out));
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        if op != Intersection {
            entries.extend(self.entries[i..].iter().cloned());
        }
        if matches!(op, Union | SymmetricDifference) {
            entries.extend(other.entries[j..].iter().cloned());
        }
        Self {
            entries,
            copy_on_write: self.copy_on_write && other.copy_on_write,
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        self.pairwise(other, SetOp::Union)
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.pairwise(other, SetOp::Intersection)
    }

    pub fn difference(&self, other: &Self) -> Self {
        self.pairwise(other, SetOp::Difference)
    }

    pub fn symmetric_difference(&self, other: &Self) -> Self {
        self.pairwise(other, SetOp::SymmetricDifference)
    }

    /// In-place union; edits this bitmap's directory directly.
    pub fn union_with(&mut self, other: &Self) {
        let mut i = 0;
        for right in &other.entries {
            while i < self.entries.len() && self.entries[i].key < right.key {
                i += 1;
            }
            if i < self.entries.len() && self.entries[i].key == right.key {
                Arc::make_mut(&mut self.entries[i].container).or_assign(&right.container);
            } else {
                self.entries.insert(i, right.clone());
            }
            i += 1;
        }
    }

    pub fn intersection_with(&mut self, other: &Self) {
        let mut j = 0;
        self.entries.retain_mut(|entry| {
            while j < other.entries.len() && other.entries[j].key < entry.key {
                j += 1;
            }
            if j < other.entries.len() && other.entries[j].key == entry.key {
                let container = Arc::make_mut(&mut entry.container);
                container.and_assign(&other.entries[j].container);
                !container.is_empty()
            } else {
                false
            }
        });
    }

    pub fn difference_with(&mut self, other: &Self) {
        let mut j = 0;
        self.entries.retain_mut(|entry| {
            while j < other.entries.len() && other.entries[j].key < entry.key {
                j += 1;
            }
            if j < other.entries.len() && other.entries[j].key == entry.key {
                let container = Arc::make_mut(&mut entry.container);
                container.andnot_assign(&other.entries[j].container);
                !container.is_empty()
            } else {
                true
            }
        });
    }

    pub fn symmetric_difference_with(&mut self, other: &Self) {
        let mut i = 0;
        for right in &other.entries {
            while i < self.entries.len() && self.entries[i].key < right.key {
                i += 1;
            }
            if i < self.entries.len() && self.entries[i].key == right.key {
                let container = Arc::make_mut(&mut self.entries[i].container);
                container.xor_assign(&right.container);
                if container.is_empty() {
                    self.entries.remove(i);
                    continue;
                }
            } else {
                self.entries.insert(i, right.clone());
            }
            i += 1;
        }
    }

    /// Intersection cardinality without materializing the result.
    pub fn intersection_cardinality(&self, other: &Self) -> u64 {
        let (mut i, mut j) = (0, 0);
        let mut total = 0;
        while i < self.entries.len() && j < other.entries.len() {
            let (left, right) = (&self.entries[i], &other.entries[j]);
            match left.key.cmp(&right.key) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    total += u64::from(left.container.and_cardinality(&right.container));
                    i += 1;
                    j += 1;
                }
            }
        }
        total
    }

    pub fn union_cardinality(&self, other: &Self) -> u64 {
        self.cardinality() + other.cardinality() - self.intersection_cardinality(other)
    }

    pub fn difference_cardinality(&self, other: &Self) -> u64 {
        self.cardinality() - self.intersection_cardinality(other)
    }

    pub fn symmetric_difference_cardinality(&self, other: &Self) -> u64 {
        self.cardinality() + other.cardinality() - 2 * self.intersection_cardinality(other)
    }

    /// The ratio `|A ∩ B| / |A ∪ B|`. NaN when both bitmaps are empty.
    pub fn jaccard_index(&self, other: &Self) -> f64 {
        let intersection = self.intersection_cardinality(other) as f64;
        let union = self.cardinality() as f64 + other.cardinality() as f64 - intersection;
        intersection / union
    }

    /// True when the bitmaps share at least one value.
    pub fn intersects(&self, other: &Self) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.entries.len() && j < other.entries.len() {
            let (left, right) = (&self.entries[i], &other.entries[j]);
            match left.key.cmp(&right.key) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    if left.container.and_cardinality(&right.container) > 0 {
                        return true;
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        false
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        let mut j = 0;
        for entry in &self.entries {
            while j < other.entries.len() && other.entries[j].key < entry.key {
                j += 1;
            }
            match other.entries.get(j) {
                Some(candidate)
                    if candidate.key == entry.key
                        && entry.container.is_subset(&candidate.container) => {}
                _ => return false,
            }
        }
        true
    }

    pub fn is_strict_subset(&self, other: &Self) -> bool {
        self.cardinality() < other.cardinality() && self.is_subset(other)
    }

    /// Union of any number of bitmaps via a heap-driven key merge. Equal
    /// keys are folded together with lazy bitmap accumulation and
    /// reconciled once per output container.
    pub fn fast_union(inputs: &[&Chert]) -> Chert {
        let mut cursors = vec![0usize; inputs.len()];
        let mut heap: BinaryHeap<Reverse<(u16, usize)>> = inputs
            .iter()
            .enumerate()
            .filter_map(|(input, c)| c.entries.first().map(|e| Reverse((e.key, input))))
            .collect();

        let mut entries = Vec::new();
        while let Some(Reverse((key, input))) = heap.pop() {
            let mut acc = inputs[input].entries[cursors[input]].container.clone();
            cursors[input] += 1;
            if let Some(next) = inputs[input].entries.get(cursors[input]) {
                heap.push(Reverse((next.key, input)));
            }

            let mut folded = false;
            while let Some(&Reverse((next_key, next_input))) = heap.peek() {
                if next_key != key {
                    break;
                }
                heap.pop();
                let rhs = &inputs[next_input].entries[cursors[next_input]].container;
                Container::lazy_or_assign(Arc::make_mut(&mut acc), rhs);
                folded = true;
                cursors[next_input] += 1;
                if let Some(next) = inputs[next_input].entries.get(cursors[next_input]) {
                    heap.push(Reverse((next.key, next_input)));
                }
            }

            if folded {
                let container = Arc::make_mut(&mut acc);
                container.repair();
                *container = std::mem::take(container).fit();
            }
            entries.push(Entry { key, container: acc });
        }

        Chert {
            entries,
            copy_on_write: !inputs.is_empty() && inputs.iter().all(|c| c.copy_on_write),
        }
    }

    /// Convert each container to its run encoding where that is strictly
    /// smaller. Returns true if any container is run-encoded afterwards.
    pub fn run_optimize(&mut self) -> bool {
        let mut has_run = false;
        for entry in &mut self.entries {
            if entry.container.run_compressible() {
                has_run = true;
                if entry.container.kind() != Kind::Run {
                    Arc::make_mut(&mut entry.container).optimize();
                }
            } else if entry.container.kind() == Kind::Run {
                Arc::make_mut(&mut entry.container).optimize();
            }
        }
        has_run
    }

    /// Replace every run container by an array or bitmap. Returns true if
    /// anything changed.
    pub fn remove_run_compression(&mut self) -> bool {
        let mut changed = false;
        for entry in &mut self.entries {
            if entry.container.kind() == Kind::Run {
                Arc::make_mut(&mut entry.container).expand_runs();
                changed = true;
            }
        }
        changed
    }

    /// Release slack capacity, returning the number of bytes freed.
    /// Containers shared with other bitmaps are left untouched.
    pub fn shrink_to_fit(&mut self) -> usize {
        let mut freed =
            (self.entries.capacity() - self.entries.len()) * std::mem::size_of::<Entry>();
        self.entries.shrink_to_fit();
        for entry in &mut self.entries {
            if let Some(container) = Arc::get_mut(&mut entry.container) {
                freed += container.slack_bytes();
                container.shrink_to_fit();
            }
        }
        freed
    }

    /// With the flag set, cloning this bitmap shares container bodies;
    /// a shared body is cloned again the first time either side writes
    /// to it. With the flag clear, cloning copies every container.
    pub fn set_copy_on_write(&mut self, enabled: bool) {
        self.copy_on_write = enabled;
    }

    pub fn copy_on_write(&self) -> bool {
        self.copy_on_write
    }
}

impl Default for Chert {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Chert {
    fn clone(&self) -> Self {
        let entries = if self.copy_on_write {
            self.entries.clone()
        } else {
            self.entries
                .iter()
                .map(|e| Entry {
                    key: e.key,
                    container: Arc::new(e.container.as_ref().clone()),
                })
                .collect()
        };
        Self { entries, copy_on_write: self.copy_on_write }
    }
}

impl Debug for Chert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chert {{ containers: {}, cardinality: {} }}",
            self.entries.len(),
            self.cardinality()
        )
    }
}

impl PartialEq for Chert {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(a, b)| {
                    a.key == b.key
                        && (Arc::ptr_eq(&a.container, &b.container)
                            || a.container == b.container)
                })
    }
}

impl Eq for Chert {}

impl FromIterator<u32> for Chert {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut chert = Chert::new();
        chert.extend(iter);
        chert
    }
}

impl Extend<u32> for Chert {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl From<&[u32]> for Chert {
    fn from(values: &[u32]) -> Self {
        values.iter().copied().collect()
    }
}

impl<const N: usize> From<[u32; N]> for Chert {
    fn from(values: [u32; N]) -> Self {
        values.into_iter().collect()
    }
}
