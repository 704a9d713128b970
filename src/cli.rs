use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "kpi-extract",
    version,
    about = "Rule-based KPI extraction from report PDFs, with ground-truth scoring"
)]
pub struct Cli {
    #[arg(long, global = true, default_value_t = 1)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Score(ScoreArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long)]
    pub input_folder: Option<PathBuf>,

    #[arg(long)]
    pub working_folder: Option<PathBuf>,

    #[arg(long)]
    pub output_folder: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub interactive: bool,

    #[arg(long)]
    pub kpi_spec_path: Option<PathBuf>,

    #[arg(long, default_value_t = 2022)]
    pub default_year: i32,

    #[arg(long)]
    pub pdf_name: Option<String>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub page: Option<u32>,

    #[arg(long, default_value_t = false)]
    pub force_convert: bool,

    #[arg(long, default_value_t = false)]
    pub force_parse: bool,

    #[arg(long, default_value_t = false)]
    pub assume_conversion_done: bool,

    #[arg(long, default_value_t = false)]
    pub fingerprint_cache: bool,

    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    #[arg(long)]
    pub store_path: Option<PathBuf>,

    #[arg(long)]
    pub ground_truth_folder: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = MatchPolicy::AllMatches)]
    pub match_policy: MatchPolicy,

    #[arg(long, default_value_t = 6)]
    pub bucket_offset: u32,

    #[arg(long, default_value_t = false)]
    pub legacy_usage_exit_code: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[arg(long, default_value = "output")]
    pub output_folder: PathBuf,

    #[arg(long)]
    pub store_path: Option<PathBuf>,

    #[arg(long)]
    pub ground_truth_folder: PathBuf,

    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long)]
    pub kpi_spec_path: Option<PathBuf>,

    #[arg(long, default_value_t = 6)]
    pub bucket_offset: u32,

    #[arg(long, value_enum, default_value_t = MatchPolicy::AllMatches)]
    pub match_policy: MatchPolicy,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "output")]
    pub output_folder: PathBuf,

    #[arg(long)]
    pub store_path: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MatchPolicy {
    AllMatches,
    FirstMatch,
}

impl MatchPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllMatches => "all-matches",
            Self::FirstMatch => "first-match",
        }
    }
}
