//! Ring-buffer stability check for condition waits (spec §4.4.3 Condition
//! mode, §8 invariant 7).

use std::collections::VecDeque;

/// Tracks the last `capacity` samples of a wait parameter and reports
/// whether they all lie within `±stability` of `target` (spec §4.4.3:
/// "the loop terminates when `max(buffer)-target < stability ∧
/// target-min(buffer) < stability`").
#[derive(Debug, Clone)]
pub struct StabilityRing {
    samples: VecDeque<f64>,
    capacity: usize,
    target: f64,
    stability: f64,
}

impl StabilityRing {
    /// `capacity = ⌈stable_time / poll⌉`, seeded to values well outside the
    /// stability window so the ring can't report stable before it has seen
    /// `capacity` real samples (spec: "ring buffer... seeded to
    /// outside-window").
    pub fn new(capacity: usize, target: f64, stability: f64) -> Self {
        let capacity = capacity.max(1);
        let sentinel = target + stability.abs().max(1.0) * 1e6;
        let mut samples = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            samples.push_back(sentinel);
        }
        Self {
            samples,
            capacity,
            target,
            stability,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// The exact termination rule from spec §4.4.3.
    pub fn is_stable(&self) -> bool {
        let max = self.samples.iter().cloned().fold(f64::MIN, f64::max);
        let min = self.samples.iter().cloned().fold(f64::MAX, f64::min);
        (max - self.target) < self.stability && (self.target - min) < self.stability
    }

    /// The spec §8 invariant-7 form, useful for asserting termination
    /// implies both a bounded spread and a bounded average error.
    pub fn satisfies_invariant_7(&self) -> bool {
        let max = self.samples.iter().cloned().fold(f64::MIN, f64::max);
        let min = self.samples.iter().cloned().fold(f64::MAX, f64::min);
        let avg = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        (max - min) < 2.0 * self.stability && (avg - self.target).abs() < self.stability
    }

    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}
