//! Seedable random number generation.
//!
//! The consensus estimator and the simulation noise models must be
//! reproducible: the same seed gives the same subset draws and the same
//! noise sequences.

use crate::Vec3;

/// Simple random number generator (xorshift64).
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    /// Generate next random u64
    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Generate uniform random f64 in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() as f64) / (u64::MAX as f64)
    }

    /// Uniform random index in [0, n)
    pub fn next_index(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    /// Generate Gaussian random number using Box-Muller transform
    pub fn next_gaussian(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-10); // Avoid log(0)
        let u2 = self.next_f64();

        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Generate Gaussian random Vector3
    pub fn next_gaussian_vec3(&mut self, std_dev: f64) -> Vec3 {
        Vec3::new(
            self.next_gaussian() * std_dev,
            self.next_gaussian() * std_dev,
            self.next_gaussian() * std_dev,
        )
    }

    /// Draw `k` distinct indices from `0..n` (partial Fisher-Yates).
    ///
    /// Panics in debug builds if `k > n`; callers bound `k` beforehand.
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        debug_assert!(k <= n);
        let mut pool: Vec<usize> = (0..n).collect();
        for i in 0..k.min(n) {
            let j = i + self.next_index(n - i);
            pool.swap(i, j);
        }
        pool.truncate(k.min(n));
        pool
    }
}

impl Default for SimpleRng {
    fn default() -> Self {
        Self::new(12345)
    }
}
