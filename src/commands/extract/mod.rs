use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use glob::Pattern;
use regex::Regex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, trace, warn};

use crate::catalog::KpiCatalog;
use crate::cli::ExtractArgs;
use crate::commands::score;
use crate::config::{PageFilter, PipelineConfig};
use crate::model::{
    BatchCounts, BatchPaths, BatchRunManifest, Document, DocumentRunEntry, KpiMeasurement,
    KpiSpec, ToolVersions,
};
use crate::results::KpiResultSet;
use crate::store::{append_document_results, begin_run, finish_run, open_store};
use crate::util::{
    ensure_directory, now_utc_string, read_json, run_id_for, sha256_file, utc_compact_string,
    write_json_pretty, write_text,
};

mod analyzer;
mod batch;
mod collaborators;
mod pipeline;
mod poppler;
mod run;
mod stage_cache;
#[cfg(test)]
mod tests;

pub use run::run;

use analyzer::*;
use batch::*;
use collaborators::*;
use pipeline::*;
use poppler::*;
use stage_cache::*;
