use crate::data::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Chunking
// =============================================================================

/// A distance window `[start, end)` and the rows whose distance falls in it,
/// in dataset order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk<'a> {
    pub start: f64,
    pub end: f64,
    pub rows: Vec<&'a Row>,
}

impl<'a> Chunk<'a> {
    pub fn contains(&self, distance: f64) -> bool {
        self.start <= distance && distance < self.end
    }

    /// Section title, e.g. `500m - 1000m`.
    pub fn title(&self) -> String {
        format!("{}m - {}m", self.start, self.end)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// Series
// =============================================================================

/// Which numeric axis a series is plotted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisGroup {
    #[default]
    Primary,
    Secondary,
}

impl FromStr for AxisGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "y" => Ok(AxisGroup::Primary),
            "secondary" | "y1" => Ok(AxisGroup::Secondary),
            other => Err(format!("unknown axis group `{}`", other)),
        }
    }
}

impl fmt::Display for AxisGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisGroup::Primary => f.write_str("primary"),
            AxisGroup::Secondary => f.write_str("secondary"),
        }
    }
}

/// A point on a linear x axis. `y` is `None` where the value is missing,
/// which renders as a gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Points {
    /// One value per row, aligned with a shared label axis.
    Indexed(Vec<Option<f64>>),
    /// Explicit pairs for numeric x axes.
    Pairs(Vec<Point>),
}

impl Points {
    pub fn len(&self) -> usize {
        match self {
            Points::Indexed(v) => v.len(),
            Points::Pairs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    /// Header the values were read from; `None` if the column was not found.
    pub column: Option<String>,
    pub axis_group: AxisGroup,
    pub points: Points,
}

impl Series {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Horizontal reference line drawn across a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub label: String,
    pub value: f64,
    pub axis_group: AxisGroup,
}
