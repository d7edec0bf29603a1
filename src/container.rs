pub(crate) mod array;
pub(crate) mod bitmap;
mod mixed;
pub(crate) mod run;

pub(crate) use array::ArrayContainer;
pub(crate) use bitmap::BitmapContainer;
pub(crate) use run::{Run, RunContainer};

/// Largest cardinality stored as an array container.
pub(crate) const ARRAY_MAX: u32 = 4096;

/// Serialized size of a bitmap container body.
pub(crate) const BITMAP_BYTES: usize = 8192;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Kind {
    Array,
    Bitmap,
    Run,
}

/// One of the three chunk representations. All cross-representation
/// decisions (conversion thresholds, the post-op fit step, pairwise
/// algorithm selection) live at this level; the variants hold the
/// representation-specific algorithms.
#[derive(Clone, Debug)]
pub(crate) enum Container {
    Array(ArrayContainer),
    Bitmap(BitmapContainer),
    Run(RunContainer),
}

impl Default for Container {
    fn default() -> Self {
        Container::Array(ArrayContainer::new())
    }
}

impl Container {
    pub(crate) fn singleton(offset: u16) -> Self {
        let mut array = ArrayContainer::new();
        array.insert(offset);
        Container::Array(array)
    }

    /// Container covering `[lo, hi]`: an array for short intervals, a
    /// bitmap otherwise.
    pub(crate) fn from_range(lo: u16, hi: u16) -> Self {
        let span = u32::from(hi - lo) + 1;
        if span <= ARRAY_MAX {
            Container::Array(ArrayContainer::from_sorted_unchecked((lo..=hi).collect()))
        } else {
            let mut bitmap = BitmapContainer::new();
            bitmap.insert_range(lo, hi);
            Container::Bitmap(bitmap)
        }
    }

    pub(crate) fn kind(&self) -> Kind {
        match self {
            Container::Array(_) => Kind::Array,
            Container::Bitmap(_) => Kind::Bitmap,
            Container::Run(_) => Kind::Run,
        }
    }

    pub(crate) fn cardinality(&self) -> u32 {
        match self {
            Container::Array(a) => a.cardinality(),
            Container::Bitmap(b) => b.cardinality(),
            Container::Run(r) => r.cardinality(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Container::Array(a) => a.is_empty(),
            Container::Bitmap(b) => b.is_empty(),
            Container::Run(r) => r.is_empty(),
        }
    }

    pub(crate) fn contains(&self, offset: u16) -> bool {
        match self {
            Container::Array(a) => a.contains(offset),
            Container::Bitmap(b) => b.contains(offset),
            Container::Run(r) => r.contains(offset),
        }
    }

    pub(crate) fn contains_range(&self, lo: u16, hi: u16) -> bool {
        match self {
            Container::Array(a) => a.contains_range(lo, hi),
            Container::Bitmap(b) => b.contains_range(lo, hi),
            Container::Run(r) => r.contains_range(lo, hi),
        }
    }

    pub(crate) fn insert(&mut self, offset: u16) -> bool {
        let inserted = match self {
            Container::Array(a) => a.insert(offset),
            Container::Bitmap(b) => b.insert(offset),
            Container::Run(r) => r.insert(offset),
        };
        if inserted && self.array_overflowed() {
            *self = std::mem::take(self).fit();
        }
        inserted
    }

    pub(crate) fn remove(&mut self, offset: u16) -> bool {
        let removed = match self {
            Container::Array(a) => a.remove(offset),
            Container::Bitmap(b) => b.remove(offset),
            Container::Run(r) => r.remove(offset),
        };
        if removed && self.bitmap_underflowed() {
            *self = std::mem::take(self).fit();
        }
        removed
    }

    pub(crate) fn insert_range(&mut self, lo: u16, hi: u16) {
        match self {
            Container::Array(a) => a.insert_range(lo, hi),
            Container::Bitmap(b) => b.insert_range(lo, hi),
            Container::Run(r) => r.insert_range(lo, hi),
        }
        if self.array_overflowed() {
            *self = std::mem::take(self).fit();
        }
    }

    pub(crate) fn remove_range(&mut self, lo: u16, hi: u16) {
        match self {
            Container::Array(a) => a.remove_range(lo, hi),
            Container::Bitmap(b) => b.remove_range(lo, hi),
            Container::Run(r) => r.remove_range(lo, hi),
        }
        if self.bitmap_underflowed() {
            *self = std::mem::take(self).fit();
        }
    }

    pub(crate) fn flip_range(&mut self, lo: u16, hi: u16) {
        match self {
            Container::Array(a) => *self = Container::Array(a.flip_range(lo, hi)),
            Container::Bitmap(b) => b.flip_range(lo, hi),
            Container::Run(r) => r.flip_range(lo, hi),
        }
        *self = std::mem::take(self).fit();
    }

    fn array_overflowed(&self) -> bool {
        matches!(self, Container::Array(a) if a.cardinality() > ARRAY_MAX)
    }

    fn bitmap_underflowed(&self) -> bool {
        matches!(self, Container::Bitmap(b) if b.cardinality() <= ARRAY_MAX)
    }

    pub(crate) fn min(&self) -> Option<u16> {
        match self {
            Container::Array(a) => a.min(),
            Container::Bitmap(b) => b.min(),
            Container::Run(r) => r.min(),
        }
    }

    pub(crate) fn max(&self) -> Option<u16> {
        match self {
            Container::Array(a) => a.max(),
            Container::Bitmap(b) => b.max(),
            Container::Run(r) => r.max(),
        }
    }

    /// Count of values `<= offset`.
    pub(crate) fn rank(&self, offset: u16) -> u32 {
        match self {
            Container::Array(a) => a.rank(offset),
            Container::Bitmap(b) => b.rank(offset),
            Container::Run(r) => r.rank(offset),
        }
    }

    pub(crate) fn select(&self, n: u32) -> Option<u16> {
        match self {
            Container::Array(a) => a.select(n),
            Container::Bitmap(b) => b.select(n),
            Container::Run(r) => r.select(n),
        }
    }

    /// Reconcile a deferred bitmap cardinality.
    pub(crate) fn repair(&mut self) {
        if let Container::Bitmap(b) = self {
            b.repair();
        }
    }

    /// The fit step: rewrite to the smallest representation. Array and
    /// bitmap trade places at the 4096 boundary; a run container keeps its
    /// encoding only while it is strictly smaller than both.
    pub(crate) fn fit(self) -> Self {
        match self {
            Container::Array(a) if a.cardinality() > ARRAY_MAX => {
                Container::Bitmap(a.iter().collect())
            }
            Container::Bitmap(b) if b.cardinality() <= ARRAY_MAX => {
                Container::Array(b.to_array())
            }
            Container::Run(r) => {
                let cardinality = r.cardinality();
                let run_size = RunContainer::serialized_size(r.n_runs());
                let flat_size = if cardinality <= ARRAY_MAX {
                    2 * cardinality as usize
                } else {
                    BITMAP_BYTES
                };
                if run_size < flat_size {
                    Container::Run(r)
                } else if cardinality <= ARRAY_MAX {
                    Container::Array(r.to_array())
                } else {
                    Container::Bitmap(r.to_bitmap())
                }
            }
            other => other,
        }
    }

    /// True when the run encoding of this container's contents would be
    /// strictly smaller than the best flat representation.
    pub(crate) fn run_compressible(&self) -> bool {
        let cardinality = self.cardinality();
        let n_runs = match self {
            Container::Array(a) => a.count_runs() as usize,
            Container::Bitmap(b) => b.count_runs() as usize,
            Container::Run(r) => r.n_runs(),
        };
        let run_size = RunContainer::serialized_size(n_runs);
        let flat_size = if cardinality <= ARRAY_MAX {
            2 * cardinality as usize
        } else {
            BITMAP_BYTES
        };
        run_size < flat_size
    }

    /// Rewrite to the globally smallest representation, counting runs of
    /// the current representation. Returns true if the result is
    /// run-encoded.
    pub(crate) fn optimize(&mut self) -> bool {
        if self.run_compressible() {
            if !matches!(self, Container::Run(_)) {
                *self = Container::Run(self.to_run());
            }
            true
        } else {
            *self = std::mem::take(self).fit();
            false
        }
    }

    /// Replace a run container by an array or bitmap; other kinds are left
    /// untouched. Returns true if a conversion happened.
    pub(crate) fn expand_runs(&mut self) -> bool {
        if let Container::Run(r) = self {
            *self = if r.cardinality() <= ARRAY_MAX {
                Container::Array(r.to_array())
            } else {
                Container::Bitmap(r.to_bitmap())
            };
            true
        } else {
            false
        }
    }

    fn to_run(&self) -> RunContainer {
        match self {
            Container::Array(a) => RunContainer::from_sorted_unchecked(a.iter()),
            Container::Bitmap(b) => RunContainer::from_sorted_unchecked(b.iter()),
            Container::Run(r) => r.clone(),
        }
    }

    /// Serialized size of the container body in the portable format.
    pub(crate) fn portable_body_size(&self) -> usize {
        match self {
            Container::Array(a) => 2 * a.cardinality() as usize,
            Container::Bitmap(_) => BITMAP_BYTES,
            Container::Run(r) => RunContainer::serialized_size(r.n_runs()),
        }
    }

    pub(crate) fn slack_bytes(&self) -> usize {
        match self {
            Container::Array(a) => a.slack_bytes(),
            Container::Bitmap(_) => 0,
            Container::Run(r) => r.slack_bytes(),
        }
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        match self {
            Container::Array(a) => a.shrink_to_fit(),
            Container::Bitmap(_) => {}
            Container::Run(r) => r.shrink_to_fit(),
        }
    }

    pub(crate) fn or(&self, other: &Self) -> Self {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => mixed::array_array_or(a, b),
            (Array(a), Bitmap(b)) | (Bitmap(b), Array(a)) => mixed::array_bitmap_or(a, b),
            (Array(a), Run(r)) | (Run(r), Array(a)) => mixed::array_run_or(a, r),
            (Bitmap(a), Bitmap(b)) => mixed::bitmap_bitmap_or(a, b),
            (Bitmap(b), Run(r)) | (Run(r), Bitmap(b)) => mixed::run_bitmap_or(r, b),
            (Run(a), Run(b)) => mixed::run_run_or(a, b),
        }
    }

    pub(crate) fn and(&self, other: &Self) -> Self {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => mixed::array_array_and(a, b),
            (Array(a), Bitmap(b)) | (Bitmap(b), Array(a)) => mixed::array_bitmap_and(a, b),
            (Array(a), Run(r)) | (Run(r), Array(a)) => mixed::array_run_and(a, r),
            (Bitmap(a), Bitmap(b)) => mixed::bitmap_bitmap_and(a, b),
            (Bitmap(b), Run(r)) | (Run(r), Bitmap(b)) => mixed::run_bitmap_and(r, b),
            (Run(a), Run(b)) => mixed::run_run_and(a, b),
        }
    }

    pub(crate) fn andnot(&self, other: &Self) -> Self {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => Array(a.difference(b)),
            (Array(a), Bitmap(b)) => mixed::array_bitmap_andnot(a, b),
            (Array(a), Run(r)) => mixed::array_run_andnot(a, r),
            (Bitmap(a), Array(b)) => mixed::bitmap_array_andnot(a, b),
            (Bitmap(a), Bitmap(b)) => mixed::bitmap_bitmap_andnot(a, b),
            (Bitmap(a), Run(r)) => mixed::bitmap_run_andnot(a, r),
            (Run(a), Array(b)) => mixed::run_array_andnot(a, b),
            (Run(a), Bitmap(b)) => mixed::run_bitmap_andnot(a, b),
            (Run(a), Run(b)) => mixed::run_run_andnot(a, b),
        }
    }

    pub(crate) fn xor(&self, other: &Self) -> Self {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => mixed::array_array_xor(a, b),
            (Array(a), Bitmap(b)) | (Bitmap(b), Array(a)) => mixed::array_bitmap_xor(a, b),
            (Array(a), Run(r)) | (Run(r), Array(a)) => mixed::array_run_xor(a, r),
            (Bitmap(a), Bitmap(b)) => mixed::bitmap_bitmap_xor(a, b),
            (Bitmap(b), Run(r)) | (Run(r), Bitmap(b)) => mixed::run_bitmap_xor(r, b),
            (Run(a), Run(b)) => mixed::run_run_xor(a, b),
        }
    }

    /// In-place union. A bitmap target absorbs the right side without
    /// reallocating; any other target is recomputed and written back, so
    /// the representation may change on return.
    pub(crate) fn or_assign(&mut self, other: &Self) {
        use Container::*;
        match (&mut *self, other) {
            (Bitmap(a), Bitmap(b)) => a.or_assign(b),
            (Bitmap(a), Array(b)) => a.set_list(b.values()),
            (Bitmap(a), Run(r)) => {
                for run in r.runs() {
                    a.insert_range(run.start, run.end());
                }
            }
            (a, b) => *a = a.or(b),
        }
    }

    pub(crate) fn and_assign(&mut self, other: &Self) {
        use Container::*;
        match (&mut *self, other) {
            (Bitmap(a), Bitmap(b)) => a.and_assign(b),
            (a, b) => *a = a.and(b),
        }
        if self.bitmap_underflowed() {
            *self = std::mem::take(self).fit();
        }
    }

    pub(crate) fn andnot_assign(&mut self, other: &Self) {
        use Container::*;
        match (&mut *self, other) {
            (Bitmap(a), Bitmap(b)) => a.andnot_assign(b),
            (Bitmap(a), Array(b)) => a.clear_list(b.values()),
            (Bitmap(a), Run(r)) => {
                for run in r.runs() {
                    a.remove_range(run.start, run.end());
                }
            }
            (a, b) => *a = a.andnot(b),
        }
        if self.bitmap_underflowed() {
            *self = std::mem::take(self).fit();
        }
    }

    pub(crate) fn xor_assign(&mut self, other: &Self) {
        use Container::*;
        match (&mut *self, other) {
            (Bitmap(a), Bitmap(b)) => a.xor_assign(b),
            (Bitmap(a), Array(b)) => a.flip_list(b.values()),
            (Bitmap(a), Run(r)) => {
                for run in r.runs() {
                    a.flip_range(run.start, run.end());
                }
            }
            (a, b) => *a = a.xor(b),
        }
        if self.bitmap_underflowed() {
            *self = std::mem::take(self).fit();
        }
    }

    /// Union for multi-way merges: accumulate into a bitmap with a
    /// deferred cardinality instead of converting between steps. Callers
    /// must `repair` and `fit` once the merge is complete.
    pub(crate) fn lazy_or_assign(&mut self, other: &Self) {
        use Container::*;
        match (&mut *self, other) {
            (Bitmap(a), Bitmap(b)) => {
                a.mark_lazy();
                a.or_assign(b);
            }
            (Bitmap(a), Array(b)) => {
                a.mark_lazy();
                a.set_list(b.values());
            }
            (Bitmap(a), Run(r)) => {
                a.mark_lazy();
                for run in r.runs() {
                    a.insert_range(run.start, run.end());
                }
            }
            (this, rhs) => {
                *this = match (&*this, rhs) {
                    (Array(a), Array(b)) => {
                        if a.cardinality() + b.cardinality() <= ARRAY_MAX {
                            Array(a.union(b))
                        } else {
                            let mut bitmap: BitmapContainer = a.iter().collect();
                            bitmap.mark_lazy();
                            bitmap.set_list(b.values());
                            Bitmap(bitmap)
                        }
                    }
                    (Array(a), Bitmap(b)) => {
                        let mut bitmap = b.clone();
                        bitmap.mark_lazy();
                        bitmap.set_list(a.values());
                        Bitmap(bitmap)
                    }
                    (a, b) => a.or(b),
                };
            }
        }
    }

    /// Intersection cardinality without materializing the result.
    pub(crate) fn and_cardinality(&self, other: &Self) -> u32 {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => a.intersection_cardinality(b),
            (Array(a), Bitmap(b)) | (Bitmap(b), Array(a)) => {
                a.iter().filter(|&v| b.contains(v)).count() as u32
            }
            (Array(a), Run(r)) | (Run(r), Array(a)) => mixed::array_run_and_cardinality(a, r),
            (Bitmap(a), Bitmap(b)) => a.intersection_cardinality(b),
            (Bitmap(b), Run(r)) | (Run(r), Bitmap(b)) => r
                .runs()
                .iter()
                .map(|run| b.ones_in_range(run.start, run.end()))
                .sum(),
            (Run(a), Run(b)) => a.intersection_cardinality(b),
        }
    }

    pub(crate) fn is_subset(&self, other: &Self) -> bool {
        use Container::*;
        if self.cardinality() > other.cardinality() {
            return false;
        }
        match (self, other) {
            (Array(a), Array(b)) => a.is_subset(b),
            (Array(a), Bitmap(b)) => a.iter().all(|v| b.contains(v)),
            (Bitmap(a), Bitmap(b)) => a.is_subset(b),
            (Run(a), Run(b)) => a.is_subset(b),
            (Run(r), Bitmap(b)) => r.runs().iter().all(|run| {
                b.contains_range(run.start, run.end())
            }),
            _ => self.and_cardinality(other) == self.cardinality(),
        }
    }

    pub(crate) fn iter(&self) -> crate::iter::ContainerIter<'_> {
        crate::iter::ContainerIter::new(self)
    }
}

/// Content equality: representation-independent.
impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        use Container::*;
        match (self, other) {
            (Array(a), Array(b)) => a == b,
            (Bitmap(a), Bitmap(b)) => a == b,
            (Run(a), Run(b)) => a == b,
            _ => self.cardinality() == other.cardinality() && self.is_subset(other),
        }
    }
}

impl Eq for Container {}
