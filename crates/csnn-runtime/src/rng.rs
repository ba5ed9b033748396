//! Shared, explicitly seeded random stream
//!
//! Every probabilistic decision the engine makes (connectivity predicates,
//! random initial values, Poisson stimuli) draws from one `SimRng` owned by
//! the [`Network`](crate::network::Network). Re-running with the same seed and
//! the same sequence of calls reproduces the same values.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed used when none is configured
pub const DEFAULT_SEED: u64 = 53;

/// Seeded random stream
#[derive(Debug, Clone)]
pub struct SimRng {
    seed: u64,
    inner: StdRng,
    spare_normal: Option<f64>,
}

impl SimRng {
    /// Create a stream from a seed
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: StdRng::seed_from_u64(seed),
            spare_normal: None,
        }
    }

    /// Seed this stream was created (or last reseeded) with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restart the stream from `seed`
    pub fn reseed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }

    /// Uniform value in `[low, high)`; returns `low` when the range is empty
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..high)
    }

    /// Uniform value in `[0, 1)`
    pub fn unit(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// `true` with probability `p`. Values of `p` outside `[0, 1]` are not
    /// clamped: `p <= 0` is never true, `p >= 1` is always true.
    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.unit() < p
    }

    /// Normally distributed value (Box-Muller transform)
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return mean + std_dev * z;
        }

        // 1 - unit() is in (0, 1], keeping ln() finite
        let u1 = 1.0 - self.unit();
        let u2 = self.unit();
        let mag = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * std::f64::consts::PI * u2;
        self.spare_normal = Some(mag * angle.sin());

        mean + std_dev * mag * angle.cos()
    }

    /// Uniform integer in `[low, high]`
    pub fn uniform_int(&mut self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..=high)
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
