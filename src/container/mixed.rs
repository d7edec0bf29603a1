//! Pairwise algorithms across container representations. Each kernel picks
//! an output representation from the operands' shapes and ends with the fit
//! step via [`Container::fit`].

use crate::container::{
    ARRAY_MAX, Container,
    array::ArrayContainer,
    bitmap::BitmapContainer,
    run::{Run, RunContainer},
};

/// Below this cardinality, an array xor run is merged directly into a run
/// container via exclusive appends.
const XOR_RUN_THRESHOLD: u32 = 32;

/// Merge an array (as singleton runs) and a run list into one stream
/// ordered by start.
fn merge_array_runs<'a>(
    array: &'a ArrayContainer,
    runs: &'a RunContainer,
) -> impl Iterator<Item = Run> + 'a {
    itertools::merge_join_by(
        array.values().iter().map(|&v| Run::new(v, 0)),
        runs.runs().iter().copied(),
        |a, b| a.start.cmp(&b.start),
    )
    .flat_map(|pair| {
        let (left, right) = pair.left_and_right();
        left.into_iter().chain(right)
    })
}

/// Retain array values covered by the run list.
fn filter_by_runs<'a>(
    array: &'a ArrayContainer,
    runs: &'a RunContainer,
    keep_covered: bool,
) -> impl Iterator<Item = u16> + 'a {
    let runs = runs.runs();
    let mut index = 0;
    array.iter().filter(move |&v| {
        while index < runs.len() && runs[index].end() < v {
            index += 1;
        }
        let covered = index < runs.len() && runs[index].start <= v;
        covered == keep_covered
    })
}

// ---------------------------------------------------------------- union

pub(super) fn array_array_or(a: &ArrayContainer, b: &ArrayContainer) -> Container {
    if a.cardinality() + b.cardinality() <= ARRAY_MAX {
        Container::Array(a.union(b))
    } else {
        let mut bitmap: BitmapContainer = a.iter().collect();
        bitmap.set_list(b.values());
        Container::Bitmap(bitmap).fit()
    }
}

pub(super) fn array_bitmap_or(a: &ArrayContainer, b: &BitmapContainer) -> Container {
    let mut bitmap = b.clone();
    bitmap.set_list(a.values());
    Container::Bitmap(bitmap).fit()
}

pub(super) fn array_run_or(a: &ArrayContainer, r: &RunContainer) -> Container {
    if r.is_full() {
        return Container::Run(r.clone());
    }
    let mut out = RunContainer::new();
    for run in merge_array_runs(a, r) {
        out.smart_append(run);
    }
    Container::Run(out).fit()
}

pub(super) fn bitmap_bitmap_or(a: &BitmapContainer, b: &BitmapContainer) -> Container {
    Container::Bitmap(a.or(b)).fit()
}

pub(super) fn run_bitmap_or(r: &RunContainer, b: &BitmapContainer) -> Container {
    if r.is_full() {
        return Container::Run(r.clone());
    }
    let mut bitmap = b.clone();
    for run in r.runs() {
        bitmap.insert_range(run.start, run.end());
    }
    Container::Bitmap(bitmap).fit()
}

pub(super) fn run_run_or(a: &RunContainer, b: &RunContainer) -> Container {
    Container::Run(a.union(b)).fit()
}

// ---------------------------------------------------------- intersection

pub(super) fn array_array_and(a: &ArrayContainer, b: &ArrayContainer) -> Container {
    Container::Array(a.intersection(b))
}

pub(super) fn array_bitmap_and(a: &ArrayContainer, b: &BitmapContainer) -> Container {
    let values = a.iter().filter(|&v| b.contains(v)).collect();
    Container::Array(ArrayContainer::from_sorted_unchecked(values))
}

pub(super) fn array_run_and(a: &ArrayContainer, r: &RunContainer) -> Container {
    let values = filter_by_runs(a, r, true).collect();
    Container::Array(ArrayContainer::from_sorted_unchecked(values))
}

pub(super) fn bitmap_bitmap_and(a: &BitmapContainer, b: &BitmapContainer) -> Container {
    Container::Bitmap(a.and(b)).fit()
}

pub(super) fn run_bitmap_and(r: &RunContainer, b: &BitmapContainer) -> Container {
    if r.cardinality() <= ARRAY_MAX {
        let values = r.iter().filter(|&v| b.contains(v)).collect();
        return Container::Array(ArrayContainer::from_sorted_unchecked(values));
    }
    // mask the bitmap down to the runs
    let mut bitmap = b.clone();
    let mut next: u32 = 0;
    for run in r.runs() {
        if u32::from(run.start) > next {
            bitmap.remove_range(next as u16, run.start - 1);
        }
        next = u32::from(run.end()) + 1;
    }
    if next < u32::from(u16::MAX) + 1 {
        bitmap.remove_range(next as u16, u16::MAX);
    }
    Container::Bitmap(bitmap).fit()
}

pub(super) fn run_run_and(a: &RunContainer, b: &RunContainer) -> Container {
    Container::Run(a.intersection(b)).fit()
}

pub(super) fn array_run_and_cardinality(a: &ArrayContainer, r: &RunContainer) -> u32 {
    filter_by_runs(a, r, true).count() as u32
}

// ------------------------------------------------------------ difference

pub(super) fn array_bitmap_andnot(a: &ArrayContainer, b: &BitmapContainer) -> Container {
    let values = a.iter().filter(|&v| !b.contains(v)).collect();
    Container::Array(ArrayContainer::from_sorted_unchecked(values))
}

pub(super) fn array_run_andnot(a: &ArrayContainer, r: &RunContainer) -> Container {
    let values = filter_by_runs(a, r, false).collect();
    Container::Array(ArrayContainer::from_sorted_unchecked(values))
}

pub(super) fn bitmap_array_andnot(b: &BitmapContainer, a: &ArrayContainer) -> Container {
    let mut bitmap = b.clone();
    bitmap.clear_list(a.values());
    Container::Bitmap(bitmap).fit()
}

pub(super) fn bitmap_bitmap_andnot(a: &BitmapContainer, b: &BitmapContainer) -> Container {
    Container::Bitmap(a.andnot(b)).fit()
}

pub(super) fn bitmap_run_andnot(b: &BitmapContainer, r: &RunContainer) -> Container {
    let mut bitmap = b.clone();
    for run in r.runs() {
        bitmap.remove_range(run.start, run.end());
    }
    Container::Bitmap(bitmap).fit()
}

pub(super) fn run_array_andnot(r: &RunContainer, a: &ArrayContainer) -> Container {
    let holes = RunContainer::from_sorted_unchecked(a.iter());
    Container::Run(r.difference(&holes)).fit()
}

pub(super) fn run_bitmap_andnot(r: &RunContainer, b: &BitmapContainer) -> Container {
    if r.cardinality() <= ARRAY_MAX {
        let values = r.iter().filter(|&v| !b.contains(v)).collect();
        return Container::Array(ArrayContainer::from_sorted_unchecked(values));
    }
    let mut bitmap = r.to_bitmap();
    bitmap.andnot_assign(b);
    Container::Bitmap(bitmap).fit()
}

pub(super) fn run_run_andnot(a: &RunContainer, b: &RunContainer) -> Container {
    Container::Run(a.difference(b)).fit()
}

// -------------------------------------------------- symmetric difference

pub(super) fn array_array_xor(a: &ArrayContainer, b: &ArrayContainer) -> Container {
    if a.cardinality() + b.cardinality() <= ARRAY_MAX {
        Container::Array(a.symmetric_difference(b))
    } else {
        let mut bitmap: BitmapContainer = a.iter().collect();
        bitmap.flip_list(b.values());
        Container::Bitmap(bitmap).fit()
    }
}

pub(super) fn array_bitmap_xor(a: &ArrayContainer, b: &BitmapContainer) -> Container {
    let mut bitmap = b.clone();
    bitmap.flip_list(a.values());
    Container::Bitmap(bitmap).fit()
}

pub(super) fn array_run_xor(a: &ArrayContainer, r: &RunContainer) -> Container {
    if a.cardinality() < XOR_RUN_THRESHOLD {
        let mut out = RunContainer::new();
        for run in merge_array_runs(a, r) {
            out.smart_append_exclusive(run);
        }
        return Container::Run(out).fit();
    }
    if r.cardinality() <= ARRAY_MAX {
        array_array_xor(a, &r.to_array())
    } else {
        let mut bitmap = r.to_bitmap();
        bitmap.flip_list(a.values());
        Container::Bitmap(bitmap).fit()
    }
}

pub(super) fn bitmap_bitmap_xor(a: &BitmapContainer, b: &BitmapContainer) -> Container {
    Container::Bitmap(a.xor(b)).fit()
}

pub(super) fn run_bitmap_xor(r: &RunContainer, b: &BitmapContainer) -> Container {
    let mut bitmap = b.clone();
    for run in r.runs() {
        bitmap.flip_range(run.start, run.end());
    }
    Container::Bitmap(bitmap).fit()
}

pub(super) fn run_run_xor(a: &RunContainer, b: &RunContainer) -> Container {
    Container::Run(a.symmetric_difference(b)).fit()
}
