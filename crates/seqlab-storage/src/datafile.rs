//! The tab-delimited data file format (spec §6.2): a header row of column
//! names (`Timestamp` first, then canonical headers in column-plan order),
//! followed by tab-separated rows, missing cells written as `-`.
//!
//! `Read All`'s column projection and downsampling lives here rather than in
//! `writer.rs` so it can be unit-tested against literal file text without
//! spinning up the writer task.

use crate::request::Series;
use chrono::NaiveDateTime;
use seqlab_core::record::MISSING_CELL;
use std::io::{BufRead, BufReader};

/// Any row count beyond this is pairwise-decimated (spec §6.1 `Read All`).
pub const MAX_SERIES_POINTS: usize = 2000;

/// Parse one data-file cell as a plot-able number: first as a bare float,
/// then as a `YYYY-MM-DD HH:MM:SS.ffffff` timestamp (converted to Unix
/// seconds), else `NaN` for non-numeric cells such as discrete labels.
pub fn parse_cell(cell: &str) -> f64 {
    if cell == MISSING_CELL {
        return f64::NAN;
    }
    if let Ok(v) = cell.parse::<f64>() {
        return v;
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(cell, "%Y-%m-%d %H:%M:%S%.f") {
        return ts.and_utc().timestamp_micros() as f64 / 1_000_000.0;
    }
    f64::NAN
}

/// Build the index-selection plan for pairwise decimation: pad to even
/// length by repeating the last index, halve by keeping every first of each
/// pair, repeat until at most `MAX_SERIES_POINTS` indices remain.
///
/// Computed once from the row count and then applied identically to every
/// projected column, so `x` and each `y` stay aligned row-for-row; decimating
/// each series independently (as the spec's per-array phrasing might
/// suggest in isolation) would desynchronize them.
fn decimation_plan(len: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    while indices.len() > MAX_SERIES_POINTS {
        if indices.len() % 2 != 0 {
            indices.push(*indices.last().unwrap());
        }
        indices = indices.chunks(2).map(|pair| pair[0]).collect();
    }
    indices
}

/// Scan `reader`'s header line to find the column indices of `x_col` and
/// `y_cols`, then project and downsample the remaining lines into a
/// `Series`. Columns absent from the header yield an all-`NaN` series of the
/// same (post-downsample) length rather than an error, since the UI this
/// protocol served historically let users plot against not-yet-written
/// columns.
pub fn read_all<R: BufRead>(reader: R, x_col: &str, y_cols: &[String]) -> Series {
    let mut lines = reader.lines();
    let header_line = match lines.next() {
        Some(Ok(line)) => line,
        _ => return Series::default(),
    };
    let headers: Vec<&str> = header_line.split('\t').collect();
    let x_idx = headers.iter().position(|h| *h == x_col);
    let y_idx: Vec<Option<usize>> = y_cols
        .iter()
        .map(|y| headers.iter().position(|h| h == y))
        .collect();

    let mut x_raw = Vec::new();
    let mut ys_raw: Vec<Vec<f64>> = vec![Vec::new(); y_cols.len()];
    for line in lines.map_while(Result::ok) {
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split('\t').collect();
        x_raw.push(match x_idx {
            Some(i) => cells.get(i).map(|c| parse_cell(c)).unwrap_or(f64::NAN),
            None => f64::NAN,
        });
        for (slot, idx) in ys_raw.iter_mut().zip(y_idx.iter()) {
            slot.push(match idx {
                Some(i) => cells.get(*i).map(|c| parse_cell(c)).unwrap_or(f64::NAN),
                None => f64::NAN,
            });
        }
    }

    let plan = decimation_plan(x_raw.len());
    let x = plan.iter().map(|&i| x_raw[i]).collect();
    let ys = ys_raw
        .into_iter()
        .map(|series| plan.iter().map(|&i| series[i]).collect())
        .collect();
    Series { x, ys }
}

/// Convenience wrapper over `std::fs::File` for `writer.rs`.
pub fn read_all_from_path(
    path: &std::path::Path,
    x_col: &str,
    y_cols: &[String],
) -> std::io::Result<Series> {
    let file = std::fs::File::open(path)?;
    Ok(read_all(BufReader::new(file), x_col, y_cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Timestamp\tsrc--Voltage (V)\tdmm--Current (A)\n\
2026-01-01 00:00:00.000000\t1.0\t0.010\n\
2026-01-01 00:00:01.000000\t2.0\t0.020\n\
2026-01-01 00:00:02.000000\t3.0\t-\n";

    #[test]
    fn projects_requested_columns() {
        let series = read_all(
            SAMPLE.as_bytes(),
            "src--Voltage (V)",
            &["dmm--Current (A)".to_string()],
        );
        assert_eq!(series.x, vec![1.0, 2.0, 3.0]);
        assert_eq!(series.ys.len(), 1);
        assert_eq!(series.ys[0][0], 0.010);
        assert!(series.ys[0][2].is_nan());
    }

    #[test]
    fn missing_column_yields_all_nan() {
        let series = read_all(SAMPLE.as_bytes(), "Timestamp", &["nonexistent".to_string()]);
        assert_eq!(series.ys[0].len(), 3);
        assert!(series.ys[0].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn decimation_halves_until_under_cap() {
        let plan = decimation_plan(4001);
        assert!(plan.len() <= MAX_SERIES_POINTS);
        assert_eq!(plan[0], 0);
    }

    #[test]
    fn decimation_plan_is_identity_below_cap() {
        let plan = decimation_plan(5);
        assert_eq!(plan, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn timestamp_x_column_parses_to_seconds() {
        let series = read_all(SAMPLE.as_bytes(), "Timestamp", &["dmm--Current (A)".to_string()]);
        assert_eq!(series.x.len(), 3);
        assert!(series.x[1] > series.x[0]);
    }
}
