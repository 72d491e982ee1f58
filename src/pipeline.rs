// Pipeline: upload -> parse -> store -> markers, and chart requests on top

use crate::charts::{definition, ChartKind};
use crate::chunk::{chunk, filter_rows, Chunking, Requirement};
use crate::config::PipelineConfig;
use crate::data::{Dataset, Role, Row};
use crate::error::{PipelineError, Status};
use crate::ir::{Chunk, Series, Threshold};
use crate::markers::Marker;
use crate::resolve::FieldSpec;
use crate::series::{build_series, ColumnSpec, Shape};
use crate::store::{DatasetStore, FileKv, KvStore};
use crate::tabular::{self, Format};
use log::{info, warn};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReport {
    #[serde(flatten)]
    pub status: Status,
    pub role: Role,
    pub file_name: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub markers: usize,
}

/// One plotted section: a chunk, or the whole dataset when unchunked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    pub rows: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReport {
    #[serde(flatten)]
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub role: Role,
    pub distance_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<Threshold>,
    pub sections: Vec<Section>,
}

/// Chunking summary for the command line: window bounds and row counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkSummary {
    pub start: f64,
    pub end: f64,
    pub title: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    #[serde(flatten)]
    pub status: Status,
    pub role: Role,
    pub distance_column: Option<String>,
    pub width: f64,
    pub filtered_rows: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub out_of_range: usize,
    pub max_distance: Option<f64>,
    pub chunks: Vec<ChunkSummary>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ChunkReport {
    fn new(role: Role, chunking: &Chunking<'_>) -> Self {
        Self {
            status: chunking.status(),
            role,
            distance_column: chunking.distance_column.clone(),
            width: chunking.width,
            filtered_rows: chunking.filtered_rows,
            out_of_range: chunking.out_of_range,
            max_distance: chunking.max_distance,
            chunks: chunking
                .chunks
                .iter()
                .map(|c| ChunkSummary {
                    start: c.start,
                    end: c.end,
                    title: c.title(),
                    rows: c.len(),
                })
                .collect(),
        }
    }
}

/// Ties the parser, store, chunker and series assembler together behind the
/// upload, clear and chart-request boundaries.
pub struct Pipeline<K: KvStore> {
    config: PipelineConfig,
    store: DatasetStore<K>,
}

impl Pipeline<FileKv> {
    /// Pipeline persisting under `config.store_dir`.
    pub fn open(config: PipelineConfig) -> Self {
        let kv = FileKv::new(config.store_dir.clone());
        Self::with_store(config, kv)
    }
}

impl<K: KvStore> Pipeline<K> {
    pub fn with_store(config: PipelineConfig, kv: K) -> Self {
        let store = DatasetStore::open(kv, config.geodata_role);
        Self { config, store }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &DatasetStore<K> {
        &self.store
    }

    pub fn dataset(&self, role: Role) -> &Dataset {
        self.store.get(role)
    }

    pub fn markers(&self) -> &[Marker] {
        self.store.markers()
    }

    fn failed_upload(role: Role, file_name: &str, err: &PipelineError) -> UploadReport {
        warn!("upload of {} for {} rejected: {}", file_name, role, err);
        UploadReport {
            status: Status::from(err),
            role,
            file_name: file_name.to_string(),
            rows: 0,
            columns: Vec::new(),
            markers: 0,
        }
    }

    /// Parse `bytes` as the file `file_name` and store it for `role`. Problems
    /// are reported in the returned status; the previous dataset for the role
    /// is kept when parsing fails.
    pub fn upload_bytes(&mut self, role: Role, file_name: &str, bytes: &[u8]) -> UploadReport {
        let table = Format::from_file_name(file_name)
            .and_then(|format| tabular::parse(bytes, format, &self.config.parse_options()));
        let table = match table {
            Ok(t) => t,
            Err(e) => return Self::failed_upload(role, file_name, &e),
        };

        let dataset = Dataset::new(role, table.schema, table.rows).with_file_name(file_name);
        let rows = dataset.rows.len();
        let columns = dataset.schema.names().to_vec();
        let saved = self.store.save(dataset);
        info!(
            "stored {} rows for {} from {} ({} markers)",
            rows, role, file_name, saved.markers
        );

        UploadReport {
            status: saved.status,
            role,
            file_name: file_name.to_string(),
            rows,
            columns,
            markers: saved.markers,
        }
    }

    /// Read and upload a file from disk.
    pub fn upload_path(&mut self, role: Role, path: &Path) -> UploadReport {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        // reject unsupported extensions before touching the file
        if let Err(e) = Format::from_file_name(&file_name) {
            return Self::failed_upload(role, &file_name, &e);
        }
        match std::fs::read(path) {
            Ok(bytes) => self.upload_bytes(role, &file_name, &bytes),
            Err(e) => Self::failed_upload(role, &file_name, &PipelineError::malformed(e.to_string())),
        }
    }

    pub fn clear(&mut self, role: Option<Role>) -> Status {
        self.store.clear(role)
    }

    pub fn chunk(
        &self,
        role: Role,
        distance: &[FieldSpec],
        requirements: &[Requirement],
        width: Option<f64>,
    ) -> ChunkReport {
        let width = self.config.chunk_width(width);
        let chunking = chunk(&self.dataset(role).rows, distance, requirements, width);
        ChunkReport::new(role, &chunking)
    }

    /// Build series over the whole dataset, or per chunk when `width` is given.
    /// Chunking uses the shape's x field as distance; non-optional specs are
    /// required to be numeric.
    pub fn series(
        &self,
        role: Role,
        specs: &[ColumnSpec],
        shape: &Shape,
        width: Option<f64>,
    ) -> SectionReport {
        let dataset = self.dataset(role);
        let mut report = SectionReport {
            status: Status::Ok,
            title: None,
            role,
            distance_column: None,
            width: None,
            thresholds: Vec::new(),
            sections: Vec::new(),
        };
        if dataset.is_empty() {
            report.status = empty_role_status(role);
            return report;
        }

        let Some(width) = width else {
            let batch = build_series(&dataset.rows, specs, shape);
            report.status = batch.status();
            report.sections.push(Section {
                title: dataset.file_name.clone().unwrap_or_default(),
                start: None,
                end: None,
                rows: dataset.rows.len(),
                labels: batch.labels,
                series: batch.series,
            });
            return report;
        };

        let x = match shape {
            Shape::Indexed { x: Some(x) } | Shape::Pairs { x, .. } => x.clone(),
            Shape::Indexed { x: None } => {
                report.status = Status::missing_columns(vec!["distance".to_string()]);
                return report;
            }
        };
        let requirements: Vec<Requirement> = specs.iter().map(requirement_for).collect();
        let width = self.config.chunk_width(Some(width));
        let chunking = chunk(&dataset.rows, std::slice::from_ref(&x), &requirements, width);
        report.distance_column = chunking.distance_column.clone();
        report.width = Some(chunking.width);
        report.status = chunking.status();

        let mut missing = Vec::new();
        for c in &chunking.chunks {
            let (section, gaps) = section_for(c, specs, shape);
            missing.extend(gaps);
            report.sections.push(section);
        }
        merge_missing(&mut report.status, missing);
        report
    }

    /// Prepare a catalog chart for `kind`. With `width`, one section per chunk;
    /// without, a single section over every row that passes the filter.
    pub fn chart(&self, kind: ChartKind, width: Option<f64>) -> SectionReport {
        let def = definition(kind);
        let dataset = self.dataset(def.role);
        let mut report = SectionReport {
            status: Status::Ok,
            title: Some(def.title.to_string()),
            role: def.role,
            distance_column: None,
            width: None,
            thresholds: def.thresholds.clone(),
            sections: Vec::new(),
        };
        if dataset.is_empty() {
            report.status = empty_role_status(def.role);
            return report;
        }

        let requirements = def.requirements();
        let mut missing = Vec::new();

        match width {
            Some(w) => {
                let chunking = chunk(&dataset.rows, &def.distance, &requirements, self.config.chunk_width(Some(w)));
                report.distance_column = chunking.distance_column.clone();
                report.width = Some(chunking.width);
                report.status = chunking.status();
                if let Some(column) = &chunking.distance_column {
                    let shape = def.shape_for(column);
                    for c in &chunking.chunks {
                        let (section, gaps) = section_for(c, &def.series, &shape);
                        missing.extend(gaps);
                        report.sections.push(section);
                    }
                }
            }
            None => {
                let filtered = filter_rows(&dataset.rows, &def.distance, &requirements);
                report.distance_column = filtered.distance_column.clone();
                report.status = if !filtered.missing.is_empty() {
                    Status::missing_columns(filtered.missing.clone())
                } else if filtered.rows.is_empty() {
                    Status::no_data()
                } else {
                    Status::Ok
                };
                if let (Some(column), false) = (&filtered.distance_column, filtered.rows.is_empty()) {
                    let rows: Vec<&Row> = filtered.rows();
                    let batch = build_series(&rows, &def.series, &def.shape_for(column));
                    missing.extend(batch.missing);
                    report.sections.push(Section {
                        title: def.title.to_string(),
                        start: None,
                        end: None,
                        rows: rows.len(),
                        labels: batch.labels,
                        series: batch.series,
                    });
                }
            }
        }

        merge_missing(&mut report.status, missing);
        report
    }
}

fn requirement_for(spec: &ColumnSpec) -> Requirement {
    Requirement {
        field: spec.field.clone(),
        optional: spec.optional,
        band: None,
    }
}

fn section_for(chunk: &Chunk<'_>, specs: &[ColumnSpec], shape: &Shape) -> (Section, Vec<String>) {
    let batch = build_series(&chunk.rows, specs, shape);
    let section = Section {
        title: chunk.title(),
        start: Some(chunk.start),
        end: Some(chunk.end),
        rows: chunk.len(),
        labels: batch.labels,
        series: batch.series,
    };
    (section, batch.missing)
}

/// Fold series-level missing columns into a status that is otherwise fine.
fn merge_missing(status: &mut Status, mut missing: Vec<String>) {
    if missing.is_empty() {
        return;
    }
    missing.sort();
    missing.dedup();
    match status {
        Status::Ok => *status = Status::missing_columns(missing),
        Status::MissingColumns { columns, message } => {
            for m in missing {
                if !columns.contains(&m) {
                    columns.push(m);
                }
            }
            *message = format!("required columns not found: {}", columns.join(", "));
        }
        _ => {}
    }
}

fn empty_role_status(role: Role) -> Status {
    let file = match role {
        Role::Primary => "XLI",
        Role::Secondary => "ICE",
    };
    Status::NoData {
        message: format!("please upload the {} file first", file),
    }
}
