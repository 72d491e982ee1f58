use crate::data::Role;
use crate::error::Result;
use crate::tabular::ParseOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CHUNK_WIDTH: f64 = 500.0;

/// Width of a chainage window, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkWidth;

impl ChunkWidth {
    /// Absent, non-finite or non-positive widths fall back to 500.
    pub fn normalize(width: Option<f64>) -> f64 {
        match width {
            Some(w) if w.is_finite() && w > 0.0 => w,
            _ => DEFAULT_CHUNK_WIDTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_chunk_width")]
    pub chunk_width: f64,
    #[serde(default = "default_sheet_header_row")]
    pub sheet_header_row: usize,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Role whose uploads carry latitude/longitude columns.
    #[serde(default = "default_geodata_role")]
    pub geodata_role: Role,
}

fn default_chunk_width() -> f64 { DEFAULT_CHUNK_WIDTH }
fn default_sheet_header_row() -> usize { 1 }
fn default_store_dir() -> PathBuf { PathBuf::from(".chainage") }
fn default_geodata_role() -> Role { Role::Primary }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_width: DEFAULT_CHUNK_WIDTH,
            sheet_header_row: 1,
            store_dir: default_store_dir(),
            geodata_role: Role::Primary,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            sheet_header_row: self.sheet_header_row,
        }
    }

    /// Requested width if usable, else the configured one.
    pub fn chunk_width(&self, requested: Option<f64>) -> f64 {
        match requested {
            Some(w) if w.is_finite() && w > 0.0 => w,
            _ => ChunkWidth::normalize(Some(self.chunk_width)),
        }
    }
}
