//! Loop value-schedule generation (spec §4.4.4 "Value generation").

use rand::seq::SliceRandom;
use rand::Rng;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spacing {
    Linear,
    Logarithmic,
    Sinusoidal,
    UniformRandom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDirection {
    UpFirst,
    DownFirst,
}

/// `linspace(start, stop, n)`, `n >= 1`. `n == 1` yields `[start]`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![start];
    }
    let step = (stop - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

/// `logspace(log10(start), log10(stop), n)`; non-positive endpoints are
/// floored to `1e-9` before taking the log (spec: "positive values are
/// enforced (≤0 → 1e-9)").
pub fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    let start = if start <= 0.0 { 1e-9 } else { start };
    let stop = if stop <= 0.0 { 1e-9 } else { stop };
    linspace(start.log10(), stop.log10(), n)
        .into_iter()
        .map(|v| 10f64.powf(v))
        .collect()
}

/// `start + (stop-start)*sin(pi*i / (2*(n-1)))` for `i in [0, n-1]`.
pub fn sinusoidal(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![start];
    }
    (0..n)
        .map(|i| {
            let phase = PI * i as f64 / (2.0 * (n - 1) as f64);
            start + (stop - start) * phase.sin()
        })
        .collect()
}

/// A shuffled `linspace` — same set of values, uniformly random order.
pub fn uniform_random(start: f64, stop: f64, n: usize, rng: &mut impl Rng) -> Vec<f64> {
    let mut values = linspace(start, stop, n);
    values.shuffle(rng);
    values
}

/// Apply a `Ramp`'s spacing rule over `[start, stop]` with `n` points.
pub fn ramp_values(start: f64, stop: f64, n: usize, spacing: Spacing, rng: &mut impl Rng) -> Vec<f64> {
    match spacing {
        Spacing::Linear => linspace(start, stop, n),
        Spacing::Logarithmic => logspace(start, stop, n),
        Spacing::Sinusoidal => sinusoidal(start, stop, n),
        Spacing::UniformRandom => uniform_random(start, stop, n, rng),
    }
}

/// Build the full `Cycle` value trace (spec §4.4.4 "Cycle").
///
/// The trace visits a sequence of quarter-period turning points —
/// `start, extreme, start, other-extreme, start, extreme, ...` — for
/// `4*cycles` quarter-steps (`cycles` is a half-integer, e.g. `1.5`, so
/// `4*cycles` is always a whole number of quarters). Passing through
/// `start` mid-trace (between two extrema) is not a dwell point: those
/// interior quarters are merged into one double-span leg so the trace
/// never samples the same crossing twice. `n_points` is then split across
/// the resulting legs proportional to each leg's span, and each leg is
/// interpolated with the requested `spacing`.
pub fn cycle_values(
    start: f64,
    min: f64,
    max: f64,
    n_points: usize,
    cycles: f64,
    direction: CycleDirection,
    spacing: Spacing,
    rng: &mut impl Rng,
) -> Vec<f64> {
    if n_points == 0 {
        return Vec::new();
    }
    if n_points == 1 {
        return vec![start];
    }

    let quarters = (4.0 * cycles).round().max(0.0) as i64;
    if quarters == 0 {
        return vec![start; n_points];
    }

    let up_first = matches!(direction, CycleDirection::UpFirst);
    let quarter_value = |k: i64| -> f64 {
        match k.rem_euclid(4) {
            0 | 2 => start,
            1 => if up_first { max } else { min },
            3 => if up_first { min } else { max },
            _ => unreachable!(),
        }
    };

    // Collect turning points, dropping interior start-crossings (a pass
    // through `start` between two extrema is not a dwell point).
    let mut kept = Vec::new();
    for k in 0..=quarters {
        let is_start_crossing = matches!(k.rem_euclid(4), 0 | 2);
        let is_endpoint = k == 0 || k == quarters;
        if is_start_crossing && !is_endpoint {
            continue;
        }
        kept.push(quarter_value(k));
    }
    if kept.len() < 2 {
        return vec![start; n_points];
    }

    let leg_spans: Vec<f64> = kept.windows(2).map(|w| (w[1] - w[0]).abs().max(f64::EPSILON)).collect();
    let total_span: f64 = leg_spans.iter().sum();
    let total_steps = n_points - 1;

    let mut steps_alloc: Vec<usize> = leg_spans
        .iter()
        .map(|s| (((s / total_span) * total_steps as f64).round() as i64).max(1) as usize)
        .collect();
    let alloc_sum: i64 = steps_alloc.iter().map(|&s| s as i64).sum();
    let drift = total_steps as i64 - alloc_sum;
    if drift != 0 {
        if let Some(last) = steps_alloc.last_mut() {
            *last = (*last as i64 + drift).max(1) as usize;
        }
    }

    let mut out = Vec::with_capacity(n_points);
    out.push(kept[0]);
    for (i, &steps) in steps_alloc.iter().enumerate() {
        let leg = ramp_values(kept[i], kept[i + 1], steps + 1, spacing, rng);
        out.extend(leg.into_iter().skip(1));
    }
    out.truncate(n_points);
    while out.len() < n_points {
        let last = *out.last().unwrap();
        out.push(last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn linspace_11_points_zero_to_ten() {
        let v = linspace(0.0, 10.0, 11);
        assert_eq!(v.len(), 11);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[10], 10.0);
        assert_eq!(v[1], 1.0);
    }

    #[test]
    fn logspace_clamps_nonpositive_endpoints() {
        let v = logspace(-5.0, 100.0, 3);
        assert!(v[0] > 0.0);
    }

    #[test]
    fn sinusoidal_starts_and_ends_at_bounds() {
        let v = sinusoidal(0.0, 10.0, 5);
        assert!((v[0] - 0.0).abs() < 1e-9);
        assert!((v[4] - 10.0).abs() < 1e-9);
    }

    /// Spec §6 scenario S3: Cycle 0→5→-5→0, 1 cycle, Up First, linear
    /// spacing, 9 points => [0, 2.5, 5, 2.5, 0, -2.5, -5, -2.5, 0].
    #[test]
    fn s3_cycle_trace() {
        let mut rng = StepRng::new(0, 1);
        let v = cycle_values(0.0, -5.0, 5.0, 9, 1.0, CycleDirection::UpFirst, Spacing::Linear, &mut rng);
        let expected = [0.0, 2.5, 5.0, 2.5, 0.0, -2.5, -5.0, -2.5, 0.0];
        assert_eq!(v.len(), expected.len());
        for (got, want) in v.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
    }

    /// Same bounds as S3 but `Down First`: the trace is the point-for-point
    /// negation of the `Up First` trace since `min`/`max` are symmetric
    /// about `start`.
    #[test]
    fn cycle_trace_down_first_mirrors_up_first() {
        let mut rng = StepRng::new(0, 1);
        let v = cycle_values(0.0, -5.0, 5.0, 9, 1.0, CycleDirection::DownFirst, Spacing::Linear, &mut rng);
        let expected = [0.0, -2.5, -5.0, -2.5, 0.0, 2.5, 5.0, 2.5, 0.0];
        assert_eq!(v.len(), expected.len());
        for (got, want) in v.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
    }

    /// A half-integer `cycles` (0.5) is two quarter-steps: `start -> max`
    /// then `max -> start`, ending back at `start` with the peak at the
    /// midpoint rather than at the end.
    #[test]
    fn half_cycle_peaks_at_midpoint_and_returns_to_start() {
        let mut rng = StepRng::new(0, 1);
        let v = cycle_values(0.0, -5.0, 5.0, 5, 0.5, CycleDirection::UpFirst, Spacing::Linear, &mut rng);
        assert_eq!(v.len(), 5);
        assert!((v[0] - 0.0).abs() < 1e-9);
        assert!((v[2] - 5.0).abs() < 1e-9);
        assert!((v[4] - 0.0).abs() < 1e-9);
    }

    /// Asymmetric `min`/`max`: leg lengths still split proportional to
    /// each excursion's span, and the trace stays a valid `n_points`-long
    /// vector ending back at `start` for a whole number of cycles.
    #[test]
    fn asymmetric_span_cycle_has_correct_length_and_endpoints() {
        let mut rng = StepRng::new(0, 1);
        let v = cycle_values(2.0, -1.0, 8.0, 13, 1.0, CycleDirection::UpFirst, Spacing::Linear, &mut rng);
        assert_eq!(v.len(), 13);
        assert!((v[0] - 2.0).abs() < 1e-9);
        assert!((v[12] - 2.0).abs() < 1e-9);
    }
}
