// Library exports for chainage

pub mod charts;
pub mod chunk;
pub mod coerce;
pub mod config;
pub mod data;
pub mod error;
pub mod ir;
pub mod markers;
pub mod parser;
pub mod pipeline;
pub mod resolve;
pub mod series;
pub mod store;
pub mod tabular;

pub use charts::{catalog, definition, ChartDefinition, ChartKind, XAxis};
pub use chunk::{chunk, filter_rows, Chunking, Requirement};
pub use config::{ChunkWidth, PipelineConfig, DEFAULT_CHUNK_WIDTH};
pub use data::{Dataset, DatasetId, Role, Row, Schema, Value};
pub use error::{PipelineError, Result, Status};
pub use markers::{extract_markers, Marker};
pub use pipeline::{ChunkReport, Pipeline, Section, SectionReport, UploadReport};
pub use resolve::{resolve, FieldSpec};
pub use series::{build_series, ColumnSpec, SeriesBatch, Shape};
pub use store::{DatasetStore, FileKv, KvStore, MemoryKv};
