use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::catalog::{BucketTable, KpiCatalog};
use crate::cli::{MatchPolicy, ScoreArgs};
use crate::config::default_store_path;
use crate::model::{BucketSummary, DocumentScore, KpiId, ScoreReport};
use crate::results::KpiResultSet;
use crate::store::{find_run, latest_run, load_run_results, open_store};
use crate::util::{now_utc_string, read_json, write_json_pretty};

mod ground_truth;
mod report;
mod run;
mod scorer;

pub use ground_truth::{LoadedGroundTruth, load_ground_truths};
pub use report::{build_report, write_score_dump};
pub use run::run;

use ground_truth::*;
use scorer::*;
