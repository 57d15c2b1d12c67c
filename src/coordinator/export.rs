// src/coordinator/export.rs
//! Dataset export as comma-separated text

use crate::acquisition::history::SeriesRow;
use std::collections::HashSet;
use std::fmt::Write;

pub const DURATION_LABEL: &str = "Recording Duration (s):";
pub const REFERENCE_LABEL: &str = "Maximum MVE:";
pub const COLUMN_HEADER: &str =
    "Index,Timestamp(s),RawEMG,ShortTermRMS,OneSecondRMS,%Reference,InterpolationFlag";

/// Render rows with the duration and reference header lines
///
/// Rows repeating an earlier timestamp are skipped; the first occurrence wins and the
/// index column keeps the row's position in the series.
pub fn export_dataset<I>(rows: I, duration_s: f64, reference: f64) -> String
where
    I: IntoIterator<Item = SeriesRow>,
{
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = writeln!(out, "{},{}", DURATION_LABEL, fmt_field(duration_s));
    let _ = writeln!(out, "{},{}", REFERENCE_LABEL, fmt_field(reference));
    let _ = writeln!(out, "{}", COLUMN_HEADER);

    let mut seen = HashSet::new();
    for (index, row) in rows.into_iter().enumerate() {
        if !seen.insert(row.timestamp.to_bits()) {
            continue;
        }
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{}",
            index,
            fmt_field(row.timestamp),
            fmt_field(row.raw),
            fmt_field(row.short_rms),
            fmt_field(row.one_second_rms),
            fmt_field(row.percent_reference),
            u8::from(row.interpolated),
        );
    }
    out
}

fn fmt_field(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.6}")
    } else {
        "0.0".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: f64, raw: f64, interpolated: bool) -> SeriesRow {
        SeriesRow {
            timestamp: ts,
            raw,
            short_rms: 0.5,
            one_second_rms: 0.25,
            percent_reference: 50.0,
            interpolated,
        }
    }

    #[test]
    fn test_header_lines() {
        let text = export_dataset(Vec::new(), 12.5, 0.8);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Recording Duration (s):,12.500000");
        assert_eq!(lines[1], "Maximum MVE:,0.800000");
        assert_eq!(lines[2], COLUMN_HEADER);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_rows_and_flags() {
        let text = export_dataset(vec![row(0.0, 1.0, false), row(0.1, 2.0, true)], 1.0, 1.0);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[3], "0,0.000000,1.000000,0.500000,0.250000,50.000000,0");
        assert_eq!(lines[4], "1,0.100000,2.000000,0.500000,0.250000,50.000000,1");
    }

    #[test]
    fn test_duplicate_timestamps_first_wins() {
        let text = export_dataset(
            vec![row(0.0, 1.0, false), row(0.0, 9.0, false), row(0.1, 2.0, false)],
            1.0,
            1.0,
        );
        let rows: Vec<&str> = text.lines().skip(3).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("0,0.000000,1.000000"));
        assert!(rows[1].starts_with("2,0.100000,2.000000"));
    }

    #[test]
    fn test_non_finite_written_as_zero() {
        let mut r = row(0.0, f64::NAN, false);
        r.percent_reference = f64::INFINITY;
        let text = export_dataset(vec![r], f64::NAN, 1.0);
        assert!(text.starts_with("Recording Duration (s):,0.0\n"));
        assert_eq!(text.lines().nth(3), Some("0,0.000000,0.0,0.500000,0.250000,0.0,0"));
    }
}
