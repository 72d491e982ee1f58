// Chainage chunking: partition rows into fixed-width distance windows

use crate::coerce::FieldState;
use crate::config::ChunkWidth;
use crate::data::Row;
use crate::error::Status;
use crate::ir::Chunk;
use crate::resolve::{resolve, FieldSpec};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A column the chunker checks on every row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Requirement {
    pub field: FieldSpec,
    /// Absent or non-numeric values are kept as gaps instead of dropping the row.
    #[serde(default)]
    pub optional: bool,
    /// Inclusive band the value must fall in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<(f64, f64)>,
}

impl Requirement {
    pub fn required(field: impl Into<FieldSpec>) -> Self {
        Self {
            field: field.into(),
            optional: false,
            band: None,
        }
    }

    pub fn optional(field: impl Into<FieldSpec>) -> Self {
        Self {
            field: field.into(),
            optional: true,
            band: None,
        }
    }

    pub fn within(mut self, min: f64, max: f64) -> Self {
        self.band = Some((min, max));
        self
    }

    fn accepts(&self, state: FieldState) -> bool {
        match state {
            FieldState::Numeric(v) => match self.band {
                Some((min, max)) => v >= min && v <= max,
                None => true,
            },
            FieldState::Absent | FieldState::NonNumeric => self.optional,
        }
    }
}

/// Result of a chunking request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunking<'a> {
    /// Header the distance values were read from.
    pub distance_column: Option<String>,
    /// Display names of required columns that could not be resolved.
    pub missing: Vec<String>,
    pub width: f64,
    /// Rows that passed the numeric filter and landed in a chunk.
    pub filtered_rows: usize,
    /// Filtered rows too far out to place in any window.
    pub out_of_range: usize,
    pub max_distance: Option<f64>,
    pub chunks: Vec<Chunk<'a>>,
}

impl<'a> Chunking<'a> {
    pub fn status(&self) -> Status {
        if !self.missing.is_empty() {
            Status::missing_columns(self.missing.clone())
        } else if self.chunks.is_empty() {
            Status::no_data()
        } else {
            Status::Ok
        }
    }
}

/// Distance of a row if it is numeric and every resolved requirement accepts it.
fn admit(row: &Row, distance_key: &str, checks: &[(&str, &Requirement)]) -> Option<f64> {
    let distance = FieldState::of(row.get(distance_key)).number()?;
    let ok = checks
        .iter()
        .all(|(key, req)| req.accepts(FieldState::of(row.get(key))));
    ok.then_some(distance)
}

/// Largest window index whose start is still an exact multiple in `f64`.
const MAX_WINDOW: u64 = 1 << 53;

fn window_start(index: u64, width: f64) -> f64 {
    index as f64 * width
}

/// Index of the window `[k*w, (k+1)*w)` holding `distance`, or `None` when the
/// index is too large to represent.
fn window_index(distance: f64, width: f64) -> Option<u64> {
    let estimate = (distance / width).floor();
    if !estimate.is_finite() || estimate < 0.0 || estimate > MAX_WINDOW as f64 {
        return None;
    }
    let mut k = estimate as u64;
    while k > 0 && window_start(k, width) > distance {
        k -= 1;
    }
    loop {
        let next = k.checked_add(1).filter(|n| *n <= MAX_WINDOW)?;
        if window_start(next, width) > distance {
            return Some(k);
        }
        k = next;
    }
}

/// Rows that passed the numeric filter, paired with their parsed distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered<'a> {
    pub distance_column: Option<String>,
    /// Display names of required columns that could not be resolved.
    pub missing: Vec<String>,
    pub rows: Vec<(f64, &'a Row)>,
}

impl<'a> Filtered<'a> {
    pub fn rows(&self) -> Vec<&'a Row> {
        self.rows.iter().map(|(_, r)| *r).collect()
    }
}

/// Keep rows whose distance (first resolvable candidate) parses to a finite,
/// non-negative number and whose required columns parse to finite numbers.
/// Optional columns never exclude a row. A
/// required column that cannot be resolved is reported in `missing` and
/// otherwise ignored, so callers can still render what is available.
pub fn filter_rows<'a>(
    rows: &'a [Row],
    distance_candidates: &[FieldSpec],
    requirements: &[Requirement],
) -> Filtered<'a> {
    let Some(first) = rows.first() else {
        return Filtered {
            distance_column: None,
            missing: Vec::new(),
            rows: Vec::new(),
        };
    };

    let Some(distance_key) = distance_candidates.iter().find_map(|c| resolve(first, c)) else {
        let names = distance_candidates
            .iter()
            .map(FieldSpec::display_name)
            .collect::<Vec<_>>()
            .join(" | ");
        warn!("no distance column among candidates: {}", names);
        return Filtered {
            distance_column: None,
            missing: vec![names],
            rows: Vec::new(),
        };
    };

    let mut missing = Vec::new();
    let mut checks = Vec::with_capacity(requirements.len());
    for req in requirements {
        match resolve(first, &req.field) {
            Some(key) => checks.push((key, req)),
            None if req.optional => {}
            None => missing.push(req.field.display_name()),
        }
    }
    debug!(
        "filtering on `{}` with {} checked columns",
        distance_key,
        checks.len()
    );

    let mut negative = 0;
    let kept: Vec<(f64, &'a Row)> = rows
        .iter()
        .filter_map(|row| admit(row, distance_key, &checks).map(|d| (d, row)))
        .filter(|(d, _)| {
            let ok = *d >= 0.0;
            if !ok {
                negative += 1;
            }
            ok
        })
        .collect();
    if negative > 0 {
        warn!("dropped {} rows with negative distance", negative);
    }
    debug!("{} of {} rows passed the numeric filter", kept.len(), rows.len());

    Filtered {
        distance_column: Some(distance_key.to_string()),
        missing,
        rows: kept,
    }
}

/// Partition `rows` into contiguous windows of `width` along the first
/// resolvable distance candidate.
///
/// Only rows accepted by [`filter_rows`] take part. Windows start at 0 and
/// step by `width`; a row on a boundary belongs to the window starting there.
/// Empty windows are not emitted. Rows whose window index would exceed 2^53
/// are counted in `out_of_range` instead of being placed.
pub fn chunk<'a>(
    rows: &'a [Row],
    distance_candidates: &[FieldSpec],
    requirements: &[Requirement],
    width: f64,
) -> Chunking<'a> {
    let width = ChunkWidth::normalize(Some(width));
    let filtered = filter_rows(rows, distance_candidates, requirements);

    let mut buckets: BTreeMap<u64, Vec<&'a Row>> = BTreeMap::new();
    let mut out_of_range = 0;
    let mut max_distance: Option<f64> = None;
    for (distance, row) in &filtered.rows {
        let Some(k) = window_index(*distance, width) else {
            out_of_range += 1;
            continue;
        };
        buckets.entry(k).or_default().push(*row);
        max_distance = Some(max_distance.map_or(*distance, |m| m.max(*distance)));
    }
    if out_of_range > 0 {
        warn!(
            "{} rows lie beyond the last representable {} wide window",
            out_of_range, width
        );
    }

    let chunks: Vec<Chunk<'a>> = buckets
        .into_iter()
        .map(|(k, rows)| {
            let chunk = Chunk {
                start: window_start(k, width),
                end: window_start(k + 1, width),
                rows,
            };
            debug!("chunk {} has {} rows", chunk.title(), chunk.len());
            chunk
        })
        .collect();

    Chunking {
        distance_column: filtered.distance_column,
        missing: filtered.missing,
        width,
        filtered_rows: filtered.rows.len() - out_of_range,
        out_of_range,
        max_distance,
        chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn rows(distances: &[&str]) -> Vec<Row> {
        distances
            .iter()
            .enumerate()
            .map(|(i, d)| {
                Row::new(vec![
                    ("Chainage (m)".to_string(), Value::text(*d)),
                    ("Elevation (m)".to_string(), Value::Number(i as f64)),
                ])
            })
            .collect()
    }

    fn chainage() -> Vec<FieldSpec> {
        vec![FieldSpec::named("Chainage (m)")]
    }

    #[test]
    fn test_two_windows_of_500() {
        let data = rows(&["0", "250", "499", "500", "750", "999"]);
        let result = chunk(&data, &chainage(), &[], 500.0);
        assert_eq!(result.chunks.len(), 2);
        assert_eq!((result.chunks[0].start, result.chunks[0].end), (0.0, 500.0));
        assert_eq!((result.chunks[1].start, result.chunks[1].end), (500.0, 1000.0));
        assert_eq!(result.chunks[0].rows, vec![&data[0], &data[1], &data[2]]);
        assert_eq!(result.chunks[1].rows, vec![&data[3], &data[4], &data[5]]);
        assert_eq!(result.status(), Status::Ok);
    }

    #[test]
    fn test_boundary_row_goes_to_next_window() {
        let data = rows(&["100", "200"]);
        let result = chunk(&data, &chainage(), &[], 100.0);
        assert_eq!(result.chunks.len(), 2);
        assert_eq!(result.chunks[0].start, 100.0);
        assert_eq!(result.chunks[1].start, 200.0);
    }

    #[test]
    fn test_empty_windows_omitted() {
        let data = rows(&["10", "1210"]);
        let result = chunk(&data, &chainage(), &[], 500.0);
        let starts: Vec<f64> = result.chunks.iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![0.0, 1000.0]);
    }

    #[test]
    fn test_unsorted_input_keeps_row_order_within_chunk() {
        let data = rows(&["400", "10", "900", "20"]);
        let result = chunk(&data, &chainage(), &[], 500.0);
        assert_eq!(result.chunks[0].rows, vec![&data[0], &data[1], &data[3]]);
        assert_eq!(result.chunks[1].rows, vec![&data[2]]);
    }

    #[test]
    fn test_thousands_separators_and_non_numeric() {
        let data = rows(&["1,250", "abc", "", "75"]);
        let result = chunk(&data, &chainage(), &[], 500.0);
        assert_eq!(result.filtered_rows, 2);
        assert_eq!(result.max_distance, Some(1250.0));
        assert_eq!(result.chunks.len(), 2);
        assert_eq!(result.chunks[1].start, 1000.0);
    }

    #[test]
    fn test_no_rows_left_is_no_data() {
        let data = rows(&["x", "y"]);
        let result = chunk(&data, &chainage(), &[], 500.0);
        assert!(result.chunks.is_empty());
        assert_eq!(result.status(), Status::no_data());
    }

    #[test]
    fn test_unresolved_distance_gives_empty() {
        let data = rows(&["1"]);
        let result = chunk(&data, &[FieldSpec::named("VirtualDistance (m)")], &[], 500.0);
        assert!(result.chunks.is_empty());
        assert_eq!(result.missing, vec!["VirtualDistance (m)".to_string()]);
    }

    #[test]
    fn test_second_distance_candidate_used() {
        let data = rows(&["1"]);
        let candidates = vec![FieldSpec::named("VirtualDistance (m)"), FieldSpec::named("chainage (m)")];
        let result = chunk(&data, &candidates, &[], 500.0);
        assert_eq!(result.distance_column.as_deref(), Some("Chainage (m)"));
        assert_eq!(result.chunks.len(), 1);
    }

    #[test]
    fn test_missing_required_column_reported() {
        let data = rows(&["1", "2"]);
        let reqs = vec![Requirement::required("Wall Loss % (Worst)")];
        let result = chunk(&data, &chainage(), &reqs, 500.0);
        assert_eq!(result.missing, vec!["Wall Loss % (Worst)".to_string()]);
        assert_eq!(result.chunks.len(), 1);
        assert!(matches!(result.status(), Status::MissingColumns { .. }));
    }

    #[test]
    fn test_required_vs_optional_filtering() {
        let data = vec![
            Row::new(vec![
                ("Chainage (m)".to_string(), Value::text("1")),
                ("Elevation (m)".to_string(), Value::Empty),
            ]),
            Row::new(vec![
                ("Chainage (m)".to_string(), Value::text("2")),
                ("Elevation (m)".to_string(), Value::text("5")),
            ]),
        ];
        let strict = chunk(&data, &chainage(), &[Requirement::required("Elevation (m)")], 500.0);
        assert_eq!(strict.filtered_rows, 1);
        let lenient = chunk(&data, &chainage(), &[Requirement::optional("Elevation (m)")], 500.0);
        assert_eq!(lenient.filtered_rows, 2);
    }

    #[test]
    fn test_band_excludes_out_of_range() {
        let data = vec![
            Row::new(vec![
                ("Chainage (m)".to_string(), Value::text("1")),
                ("DCVGPercentIR".to_string(), Value::text("150")),
            ]),
            Row::new(vec![
                ("Chainage (m)".to_string(), Value::text("2")),
                ("DCVGPercentIR".to_string(), Value::text("100")),
            ]),
        ];
        let reqs = vec![Requirement::required("DCVGPercentIR").within(0.0, 100.0)];
        let result = chunk(&data, &chainage(), &reqs, 500.0);
        assert_eq!(result.filtered_rows, 1);
        assert_eq!(result.chunks[0].rows, vec![&data[1]]);
    }

    #[test]
    fn test_non_positive_width_defaults() {
        let data = rows(&["0", "600"]);
        let result = chunk(&data, &chainage(), &[], 0.0);
        assert_eq!(result.width, 500.0);
        assert_eq!(result.chunks.len(), 2);
    }

    #[test]
    fn test_max_on_boundary_still_chunked() {
        let data = rows(&["0", "1000"]);
        let result = chunk(&data, &chainage(), &[], 500.0);
        let total: usize = result.chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 2);
        assert_eq!(result.chunks.last().map(|c| c.start), Some(1000.0));
    }

    #[test]
    fn test_negative_distance_is_filtered_out() {
        let data = rows(&["-5", "10"]);
        let result = chunk(&data, &chainage(), &[], 500.0);
        assert_eq!(result.filtered_rows, 1);
        let total: usize = result.chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, result.filtered_rows);
        assert_eq!(result.chunks[0].rows, vec![&data[1]]);

        let filtered = filter_rows(&data, &chainage(), &[]);
        assert_eq!(filtered.rows(), vec![&data[1]]);
    }

    #[test]
    fn test_huge_distance_does_not_overflow() {
        let data = rows(&["10", "1e20"]);
        let result = chunk(&data, &chainage(), &[], 1.0);
        assert_eq!(result.out_of_range, 1);
        assert_eq!(result.filtered_rows, 1);
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].rows, vec![&data[0]]);
        assert_eq!(result.max_distance, Some(10.0));
    }

    #[test]
    fn test_large_but_placeable_distance() {
        let data = rows(&["1e15"]);
        let result = chunk(&data, &chainage(), &[], 1.0);
        assert_eq!(result.out_of_range, 0);
        assert_eq!(result.chunks[0].start, 1e15);
        assert!(result.chunks[0].contains(1e15));
    }

    proptest! {
        #[test]
        fn prop_chunks_partition_filtered_rows(
            distances in proptest::collection::vec(0.0f64..5000.0, 1..200),
            width in 1.0f64..1500.0,
        ) {
            let data: Vec<Row> = distances
                .iter()
                .map(|d| Row::new(vec![("Chainage (m)".to_string(), Value::Number(*d))]))
                .collect();
            let result = chunk(&data, &chainage(), &[], width);

            let total: usize = result.chunks.iter().map(|c| c.len()).sum();
            prop_assert_eq!(total, data.len());

            for pair in result.chunks.windows(2) {
                prop_assert!(pair[0].end <= pair[1].start);
            }
            for c in &result.chunks {
                prop_assert!(!c.is_empty());
                for row in &c.rows {
                    let d = FieldState::of(row.get("Chainage (m)")).number().unwrap();
                    prop_assert!(c.contains(d));
                }
            }

            let max = distances.iter().cloned().fold(0.0f64, f64::max);
            let windows = (max / width).floor() as usize + 1;
            prop_assert!(result.chunks.len() <= windows);
        }
    }
}
