use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Named draw categories. Each category owns an independent ChaCha stream,
/// so the number of draws taken in one category never shifts another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawKind {
    Terrain,
    Placement,
    Hazard,
    Detection,
    TieBreak,
    Spawn,
}

impl DrawKind {
    pub const ALL: [DrawKind; 6] = [
        DrawKind::Terrain,
        DrawKind::Placement,
        DrawKind::Hazard,
        DrawKind::Detection,
        DrawKind::TieBreak,
        DrawKind::Spawn,
    ];

    fn stream_id(self) -> u64 {
        self as u64
    }
}

#[derive(Clone, Debug)]
pub struct RandomStream {
    seed: u64,
    streams: [ChaCha8Rng; 6],
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        let streams = DrawKind::ALL.map(|kind| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(kind.stream_id());
            rng
        });
        Self { seed, streams }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn stream(&mut self, kind: DrawKind) -> &mut ChaCha8Rng {
        &mut self.streams[kind as usize]
    }

    pub fn next(&mut self, kind: DrawKind) -> u64 {
        self.stream(kind).next_u64()
    }

    /// Uniform value in `[0, 1)`.
    pub fn unit(&mut self, kind: DrawKind) -> f64 {
        self.stream(kind).random::<f64>()
    }

    pub fn int(&mut self, kind: DrawKind, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        self.stream(kind).random_range(min..=max)
    }

    pub fn chance(&mut self, kind: DrawKind, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.unit(kind) < probability
    }

    pub fn pick_index(&mut self, kind: DrawKind, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        // Sampled as u64 so the result does not depend on the host's usize width.
        self.stream(kind).random_range(0..len as u64) as usize
    }
}

/// Mixes a base seed with a run index (SplitMix64 finalizer) so batch members
/// get decorrelated streams even for consecutive indices.
pub fn derive_seed(base: u64, run_index: u64) -> u64 {
    let mut z = base
        .wrapping_add(run_index.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
