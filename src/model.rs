use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub type KpiId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub file_name: String,
    pub working_dir: PathBuf,
}

impl Document {
    pub fn new(path: &Path, working_folder: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
        let working_dir = working_folder.join(format!("{file_name}_html"));

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            working_dir,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KpiSpec {
    pub id: KpiId,
    pub name: String,
    #[serde(default)]
    pub label_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KpiMeasurement {
    pub kpi_id: KpiId,
    pub kpi_name: String,
    pub src_file: String,
    pub page_num: u32,
    pub year: i32,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolVersions {
    pub pdftohtml: Option<String>,
    pub pdftoppm: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchPaths {
    pub input_folder: String,
    pub working_folder: String,
    pub output_folder: String,
    pub kpi_spec_path: Option<String>,
    pub store_path: String,
    pub aggregate_csv_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchCounts {
    pub document_count: usize,
    pub processed_document_count: usize,
    pub failed_document_count: usize,
    pub measurement_count: usize,
    pub kpi_spec_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRunEntry {
    pub document: String,
    pub fiscal_year: Option<i32>,
    pub convert: Option<String>,
    pub parse: Option<String>,
    pub reloaded: Option<bool>,
    pub measurement_count: usize,
    pub elapsed_ms: u128,
    pub csv_path: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub tool_versions: ToolVersions,
    pub paths: BatchPaths,
    pub counts: BatchCounts,
    pub documents: Vec<DocumentRunEntry>,
    pub total_run_seconds: f64,
    pub seconds_per_document: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketSummary {
    pub bucket: usize,
    pub matched: usize,
    pub correct: usize,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentScore {
    pub document: String,
    pub ground_truth_path: String,
    pub buckets: Vec<Vec<bool>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub match_policy: String,
    pub documents: Vec<DocumentScore>,
    pub buckets: Vec<Vec<bool>>,
    pub summary: Vec<BucketSummary>,
}
