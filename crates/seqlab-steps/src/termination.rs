//! Shared "when do we stop polling" sub-contract used by `Wait`, `CMeas`,
//! and each `Loop` iteration's per-step wait (spec §4.4.3, §4.4.5).

use crate::stability::StabilityRing;

/// Lower bound on polling period (spec §4.4.3: "coerced to ≥ 0.1 s").
pub const MIN_POLL_SECONDS: f64 = 0.1;

/// A very large sentinel standing in for "indefinite" (spec §4.4.3,
/// §5 Timeouts: "`timeout=0` ... modelled as a very large sentinel but
/// still interruptible by abort"). Chosen far larger than any real run but
/// still representable after arithmetic without overflowing.
pub const INDEFINITE_SENTINEL_SECONDS: f64 = 1.0e9;

#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// Stop once `elapsed > timeout`. `timeout == 0.0` means indefinite
    /// (spec §9 Open Question, resolved: keep the large-sentinel behaviour
    /// but make it explicit here rather than leaving 0 ambiguous at the call
    /// site).
    Time { timeout_s: f64 },
    /// Stop once the wait parameter's last `⌈stable_time/poll⌉` samples lie
    /// within `±stability` of `target`.
    Condition {
        wait_inst: String,
        wait_param: String,
        target: f64,
        stability: f64,
        stable_time: f64,
    },
}

impl Termination {
    /// The effective timeout in seconds, with the `0 => indefinite` rule
    /// resolved to the explicit sentinel.
    pub fn effective_timeout_s(timeout_s: f64) -> f64 {
        if timeout_s <= 0.0 {
            INDEFINITE_SENTINEL_SECONDS
        } else {
            timeout_s
        }
    }
}

/// The poll period plus termination rule shared by `Wait`, `CMeas`, and a
/// `Loop`'s per-iteration wait.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitSpec {
    poll_s: f64,
    pub mode: Termination,
}

impl WaitSpec {
    pub fn new(poll_s: f64, mode: Termination) -> Self {
        Self {
            poll_s: poll_s.max(MIN_POLL_SECONDS),
            mode,
        }
    }

    pub fn poll_seconds(&self) -> f64 {
        self.poll_s
    }

    /// A fresh stability ring sized for this spec's condition mode. Panics
    /// if `mode` is `Time` — callers only build a ring in condition mode.
    pub fn new_ring(&self) -> StabilityRing {
        match &self.mode {
            Termination::Condition {
                target,
                stability,
                stable_time,
                ..
            } => {
                let capacity = (stable_time / self.poll_s).ceil().max(1.0) as usize;
                StabilityRing::new(capacity, *target, *stability)
            }
            Termination::Time { .. } => {
                unreachable!("new_ring only called in condition mode")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_is_floored_to_minimum() {
        let w = WaitSpec::new(0.01, Termination::Time { timeout_s: 1.0 });
        assert_eq!(w.poll_seconds(), MIN_POLL_SECONDS);
    }

    #[test]
    fn zero_timeout_means_indefinite_sentinel() {
        assert_eq!(
            Termination::effective_timeout_s(0.0),
            INDEFINITE_SENTINEL_SECONDS
        );
        assert_eq!(Termination::effective_timeout_s(30.0), 30.0);
    }
}
