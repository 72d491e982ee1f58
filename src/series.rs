// Series assembly: pull named numeric columns out of rows for plotting

use crate::coerce::FieldState;
use crate::data::Row;
use crate::error::Status;
use crate::ir::{AxisGroup, Point, Points, Series};
use crate::resolve::{resolve, FieldSpec};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// One requested series: which column, how to label it and which axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: FieldSpec,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub axis: AxisGroup,
    /// Rows with a missing value stay in the chunk filter; the series shows a gap.
    #[serde(default)]
    pub optional: bool,
}

impl ColumnSpec {
    pub fn new(field: impl Into<FieldSpec>) -> Self {
        Self {
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn axis(mut self, axis: AxisGroup) -> Self {
        self.axis = axis;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.field.display_name())
    }
}

/// Output layout requested by the consuming chart.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Category x axis: y values aligned by row, labels taken from `x`.
    Indexed { x: Option<FieldSpec> },
    /// Linear x axis: explicit `(x, y)` pairs. With `sorted`, pairs without a
    /// y value are dropped and the rest ordered by ascending x.
    Pairs { x: FieldSpec, sorted: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesBatch {
    /// Category labels (x formatted to two decimals) for indexed output.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    /// Display names of columns that could not be resolved.
    pub missing: Vec<String>,
}

impl SeriesBatch {
    pub fn status(&self) -> Status {
        if self.missing.is_empty() {
            Status::Ok
        } else {
            Status::missing_columns(self.missing.clone())
        }
    }

    pub fn get(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }
}

fn number<R: Borrow<Row>>(row: &R, key: &str) -> Option<f64> {
    let row: &Row = row.borrow();
    FieldState::of(row.get(key)).number()
}

fn empty_points(shape: &Shape) -> Points {
    match shape {
        Shape::Indexed { .. } => Points::Indexed(Vec::new()),
        Shape::Pairs { .. } => Points::Pairs(Vec::new()),
    }
}

/// Build one series per spec from `rows` (a whole dataset or a chunk's rows).
/// Columns that cannot be resolved produce an empty series and are listed in
/// `missing`; the remaining series are still built.
pub fn build_series<R: Borrow<Row>>(rows: &[R], specs: &[ColumnSpec], shape: &Shape) -> SeriesBatch {
    let mut missing = Vec::new();
    let first: Option<&Row> = rows.first().map(|r| r.borrow());
    let lookup = |field: &FieldSpec| -> Option<String> {
        first.and_then(|row| resolve(row, field)).map(str::to_string)
    };

    let x_key = match shape {
        Shape::Indexed { x: Some(x) } | Shape::Pairs { x, .. } => {
            let key = lookup(x);
            if key.is_none() && first.is_some() {
                missing.push(x.display_name());
            }
            key
        }
        Shape::Indexed { x: None } => None,
    };

    let labels = match (shape, &x_key) {
        (Shape::Indexed { .. }, Some(key)) => rows
            .iter()
            .map(|row| match number(row, key) {
                Some(x) => format!("{:.2}", x),
                None => {
                    let row: &Row = row.borrow();
                    row.get(key).map(|v| v.to_string()).unwrap_or_default()
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut series = Vec::with_capacity(specs.len());
    for spec in specs {
        let name = spec.display_label();
        let column = lookup(&spec.field);

        let points = match (&column, shape) {
            (None, _) => {
                if first.is_some() {
                    warn!("series `{}`: column {} not found", name, spec.field);
                    missing.push(spec.field.display_name());
                }
                empty_points(shape)
            }
            (Some(key), Shape::Indexed { .. }) => {
                Points::Indexed(rows.iter().map(|row| number(row, key)).collect())
            }
            (Some(key), Shape::Pairs { sorted, .. }) => match &x_key {
                None => Points::Pairs(Vec::new()),
                Some(xk) => {
                    let mut pairs: Vec<Point> = rows
                        .iter()
                        .filter_map(|row| {
                            let x = number(row, xk)?;
                            Some(Point { x, y: number(row, key) })
                        })
                        .collect();
                    if *sorted {
                        pairs.retain(|p| p.y.is_some());
                        pairs.sort_by(|a, b| a.x.total_cmp(&b.x));
                    }
                    Points::Pairs(pairs)
                }
            },
        };

        debug!("series `{}`: {} points", name, points.len());
        series.push(Series {
            name,
            column,
            axis_group: spec.axis,
            points,
        });
    }

    SeriesBatch {
        labels,
        series,
        missing,
    }
}
