//! Seeded generators shared by the test suites.

use itertools::Itertools;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::index};

pub(crate) struct SetGen {
    rng: StdRng,
}

impl SetGen {
    pub(crate) fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Sorted distinct values sampled uniformly from the full u32 space.
    pub(crate) fn random(&mut self, len: usize) -> Vec<u32> {
        index::sample(&mut self.rng, u32::MAX as usize, len)
            .into_iter()
            .map(|v| v as u32)
            .sorted()
            .collect()
    }

    /// Sorted values spread over `keys` random high keys with `per_key`
    /// random offsets each.
    pub(crate) fn spread(&mut self, keys: usize, per_key: usize) -> Vec<u32> {
        let mut out = Vec::with_capacity(keys * per_key);
        for key in index::sample(&mut self.rng, 1 << 16, keys) {
            for offset in index::sample(&mut self.rng, 1 << 16, per_key) {
                out.push(crate::join(key as u16, offset as u16));
            }
        }
        out.sort_unstable();
        out
    }

    /// Sorted values clustered into runs separated by small gaps.
    pub(crate) fn runs(&mut self, n_runs: usize, max_len: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor: u32 = self.rng.gen_range(0..1 << 20);
        for _ in 0..n_runs {
            let len = self.rng.gen_range(1..=max_len);
            out.extend(cursor..cursor + len);
            cursor += len + self.rng.gen_range(1..1000);
        }
        out
    }

    /// Sorted distinct container offsets.
    pub(crate) fn offsets(&mut self, len: usize) -> Vec<u16> {
        index::sample(&mut self.rng, 1 << 16, len)
            .into_iter()
            .map(|v| v as u16)
            .sorted()
            .collect()
    }

    /// Sorted offsets clustered into at most `n_runs` runs.
    pub(crate) fn offset_runs(&mut self, n_runs: usize, max_len: u16) -> Vec<u16> {
        let mut out = Vec::new();
        let mut cursor: u32 = self.rng.gen_range(0..128);
        for _ in 0..n_runs {
            let len = u32::from(self.rng.gen_range(1..=max_len));
            if cursor + len > 1 << 16 {
                break;
            }
            out.extend((cursor..cursor + len).map(|v| v as u16));
            cursor += len + self.rng.gen_range(2..64);
        }
        out
    }
}
