// Catalog of the survey charts the pipeline knows how to prepare

use crate::chunk::Requirement;
use crate::data::Role;
use crate::ir::{AxisGroup, Threshold};
use crate::resolve::FieldSpec;
use crate::series::{ColumnSpec, Shape};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const VIRTUAL_DISTANCE: &str = "VirtualDistance (m)";
const CHAINAGE: &str = "Chainage (m)";
const XLI_CHAINAGE: &str = "XLI Chainage (m)";
const ELEVATION: &str = "Elevation (m)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChartKind {
    Acpsp,
    Acvg,
    Dcvg,
    CurrentDensity,
    WallLoss,
    Elevation,
    Velocity,
    Temperature,
    CorrosionRate,
    AvgHoldup,
    FlowRegime,
}

impl ChartKind {
    pub const ALL: [ChartKind; 11] = [
        ChartKind::Acpsp,
        ChartKind::Acvg,
        ChartKind::Dcvg,
        ChartKind::CurrentDensity,
        ChartKind::WallLoss,
        ChartKind::Elevation,
        ChartKind::Velocity,
        ChartKind::Temperature,
        ChartKind::CorrosionRate,
        ChartKind::AvgHoldup,
        ChartKind::FlowRegime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChartKind::Acpsp => "acpsp",
            ChartKind::Acvg => "acvg",
            ChartKind::Dcvg => "dcvg",
            ChartKind::CurrentDensity => "current-density",
            ChartKind::WallLoss => "wall-loss",
            ChartKind::Elevation => "elevation",
            ChartKind::Velocity => "velocity",
            ChartKind::Temperature => "temperature",
            ChartKind::CorrosionRate => "corrosion-rate",
            ChartKind::AvgHoldup => "avg-holdup",
            ChartKind::FlowRegime => "flow-regime",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChartKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ChartKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| format!("unknown chart `{}`", s))
    }
}

/// How the x axis of a chart is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum XAxis {
    /// Evenly spaced distance labels, one per row.
    Category,
    /// True numeric distance axis; `sorted` overlays drop gaps and order by x.
    Linear { sorted: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDefinition {
    pub kind: ChartKind,
    pub title: &'static str,
    pub role: Role,
    pub distance: Vec<FieldSpec>,
    pub series: Vec<ColumnSpec>,
    /// Value bands applied on top of the per-series presence checks.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<(FieldSpec, f64, f64)>,
    pub x_axis: XAxis,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<Threshold>,
}

impl ChartDefinition {
    /// Row filter for chunking: every series column, optional ones as gaps.
    pub fn requirements(&self) -> Vec<Requirement> {
        self.series
            .iter()
            .map(|spec| {
                let req = Requirement {
                    field: spec.field.clone(),
                    optional: spec.optional,
                    band: None,
                };
                match self.bands.iter().find(|(f, _, _)| *f == spec.field) {
                    Some((_, min, max)) => req.within(*min, *max),
                    None => req,
                }
            })
            .collect()
    }

    /// Same chart with `x` bound to the distance header a dataset actually uses.
    pub fn shape_for(&self, distance_column: &str) -> Shape {
        let x = FieldSpec::named(distance_column);
        match self.x_axis {
            XAxis::Category => Shape::Indexed { x: Some(x) },
            XAxis::Linear { sorted } => Shape::Pairs { x, sorted },
        }
    }
}

fn threshold(label: &str, value: f64) -> Threshold {
    Threshold {
        label: label.to_string(),
        value,
        axis_group: AxisGroup::Primary,
    }
}

fn wall_loss(kind: &str) -> ColumnSpec {
    ColumnSpec::new(FieldSpec::keywords(["wall loss", kind]))
}

fn secondary(name: &str) -> ColumnSpec {
    ColumnSpec::new(name).axis(AxisGroup::Secondary).optional()
}

pub fn definition(kind: ChartKind) -> ChartDefinition {
    let base = |role: Role, title: &'static str, distance: &[&str], series: Vec<ColumnSpec>| ChartDefinition {
        kind,
        title,
        role,
        distance: distance.iter().map(|d| FieldSpec::named(*d)).collect(),
        series,
        bands: Vec::new(),
        x_axis: XAxis::Category,
        thresholds: Vec::new(),
    };

    match kind {
        ChartKind::Acpsp => ChartDefinition {
            thresholds: vec![threshold("Threshold", 30.0)],
            ..base(
                Role::Primary,
                "ACPSP On Potential vs Virtual Distance",
                &[VIRTUAL_DISTANCE],
                vec![ColumnSpec::new("ACPSP_OnPotential")],
            )
        },
        ChartKind::Acvg => base(
            Role::Primary,
            "ACVG vs Virtual Distance",
            &[VIRTUAL_DISTANCE],
            vec![ColumnSpec::new("ACVG_VSS_DB")],
        ),
        ChartKind::Dcvg => ChartDefinition {
            bands: vec![(FieldSpec::named("DCVGPercentIR"), 0.0, 100.0)],
            ..base(
                Role::Primary,
                "DCVG %IR vs Virtual Distance",
                &[VIRTUAL_DISTANCE],
                vec![ColumnSpec::new("DCVGPercentIR")],
            )
        },
        ChartKind::CurrentDensity => base(
            Role::Primary,
            "AC Current Density",
            &[XLI_CHAINAGE, VIRTUAL_DISTANCE],
            vec![
                ColumnSpec::new("Soil Resistivity (Ohm-m)"),
                ColumnSpec::new("LT Line").optional(),
                ColumnSpec::new("AC Interference").optional(),
                ColumnSpec::new("Paved Road/Surface pavement").optional(),
                ColumnSpec::new("AC Current Density (A/m2)").axis(AxisGroup::Secondary),
                secondary("ACPSP (V)*10"),
                secondary("Actual Dig sites"),
                secondary("Threshold AC Current Density (A/m2)"),
            ],
        ),
        ChartKind::WallLoss => ChartDefinition {
            thresholds: vec![threshold("Threshold", 30.0)],
            ..base(
                Role::Secondary,
                "Wall Loss vs Chainage",
                &[CHAINAGE],
                vec![
                    wall_loss("worst").label("Wall Loss % (Worst)").optional(),
                    wall_loss("realistic").label("Wall Loss % (Realistic)").optional(),
                    wall_loss("general").label("Wall Loss % (General)"),
                    secondary(ELEVATION).label("Elevation"),
                ],
            )
        },
        ChartKind::Elevation => ChartDefinition {
            x_axis: XAxis::Linear { sorted: false },
            ..base(
                Role::Secondary,
                "Elevation Profile",
                &[CHAINAGE],
                vec![ColumnSpec::new(ELEVATION), secondary("Water Holdup (ABBL)")],
            )
        },
        ChartKind::Velocity => ChartDefinition {
            x_axis: XAxis::Linear { sorted: false },
            ..base(
                Role::Secondary,
                "Elevation & Velocities vs Chainage",
                &[CHAINAGE],
                vec![
                    ColumnSpec::new(ELEVATION),
                    secondary("Superficial Gas Velocity (ft/s)"),
                    secondary("Mixture Velocity (ft/s)"),
                    secondary("Superficial Liquid Velocity (Hydrocarbon) (ft/s)"),
                    secondary("Superficial Water Velocity (ft/s)"),
                ],
            )
        },
        ChartKind::Temperature => ChartDefinition {
            x_axis: XAxis::Linear { sorted: true },
            ..base(
                Role::Secondary,
                "Elevation & Temperature Change vs Chainage",
                &[CHAINAGE],
                vec![
                    ColumnSpec::new(ELEVATION),
                    ColumnSpec::new(FieldSpec {
                        name: Some("Temperature change (°C)".to_string()),
                        keywords: vec!["temperature change".to_string()],
                    })
                    .label("Temperature change (°C)")
                    .axis(AxisGroup::Secondary)
                    .optional(),
                ],
            )
        },
        ChartKind::CorrosionRate => ChartDefinition {
            x_axis: XAxis::Linear { sorted: false },
            ..base(
                Role::Secondary,
                "Corrosion Rate vs Chainage",
                &[XLI_CHAINAGE, CHAINAGE],
                vec![
                    ColumnSpec::new("Corrosion Rate (Worse Case) (mm/y)").optional(),
                    ColumnSpec::new("Corrosion Rate - Realistic (mmpy)").optional(),
                    ColumnSpec::new("Corrosion Rate (General) (mm/y)").optional(),
                    ColumnSpec::new("Corrosion Rate & MIC (mm/y)").optional(),
                    ColumnSpec::new("Corrosion Rate & O2 (mm/y)").optional(),
                    secondary(ELEVATION),
                ],
            )
        },
        ChartKind::AvgHoldup => ChartDefinition {
            x_axis: XAxis::Linear { sorted: false },
            ..base(
                Role::Secondary,
                "Elevation, Average HL & DEx vs Chainage",
                &[CHAINAGE],
                vec![
                    ColumnSpec::new(ELEVATION),
                    ColumnSpec::new("CONSOLIDATED HL AVERAGE (BBLS)").axis(AxisGroup::Secondary),
                    secondary("DEx"),
                ],
            )
        },
        ChartKind::FlowRegime => ChartDefinition {
            x_axis: XAxis::Linear { sorted: false },
            ..base(
                Role::Secondary,
                "Elevation & Flow Regime vs Chainage",
                &[CHAINAGE],
                vec![ColumnSpec::new(ELEVATION), secondary("FLOW REGIME")],
            )
        },
    }
}

pub fn catalog() -> Vec<ChartDefinition> {
    ChartKind::ALL.into_iter().map(definition).collect()
}
