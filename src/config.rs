use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::cli::{ExtractArgs, MatchPolicy};

pub const DEFAULT_FISCAL_YEAR: i32 = 2022;
pub const DEFAULT_BUCKET_OFFSET: u32 = 6;

const DEFAULT_INPUT_FOLDER: &str = "input";
const DEFAULT_WORKING_FOLDER: &str = "working_folder";
const DEFAULT_OUTPUT_FOLDER: &str = "output";
const USAGE_EXIT_CODE: i32 = 2;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct UsageError {
    pub message: String,
    pub exit_code: i32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InputSource {
    Flags,
    Interactive,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum PageFilter {
    #[default]
    All,
    Page(u32),
}

impl PageFilter {
    pub fn is_all(self) -> bool {
        matches!(self, Self::All)
    }

    pub fn token(self) -> String {
        match self {
            Self::All => "*".to_string(),
            Self::Page(page) => format!("{page:05}"),
        }
    }

    pub fn html_glob(self) -> String {
        format!("page{}.html", self.token())
    }

    pub fn json_glob(self) -> String {
        format!("jpage{}.json", self.token())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_folder: PathBuf,
    pub working_folder: PathBuf,
    pub output_folder: PathBuf,
    pub verbosity: u8,
    pub kpi_spec_path: Option<PathBuf>,
    pub default_year: i32,
    pub page_filter: PageFilter,
    pub pdf_name: Option<String>,
    pub force_convert: bool,
    pub force_parse: bool,
    pub assume_conversion_done: bool,
    pub fingerprint_cache: bool,
    pub continue_on_error: bool,
    pub store_path: PathBuf,
    pub ground_truth_folder: Option<PathBuf>,
    pub match_policy: MatchPolicy,
    pub bucket_offset: u32,
}

impl PipelineConfig {
    pub fn with_folders(input_folder: &Path, working_folder: &Path, output_folder: &Path) -> Self {
        Self {
            input_folder: input_folder.to_path_buf(),
            working_folder: working_folder.to_path_buf(),
            output_folder: output_folder.to_path_buf(),
            verbosity: 1,
            kpi_spec_path: None,
            default_year: DEFAULT_FISCAL_YEAR,
            page_filter: PageFilter::All,
            pdf_name: None,
            force_convert: false,
            force_parse: false,
            assume_conversion_done: false,
            fingerprint_cache: false,
            continue_on_error: false,
            store_path: default_store_path(output_folder),
            ground_truth_folder: None,
            match_policy: MatchPolicy::AllMatches,
            bucket_offset: DEFAULT_BUCKET_OFFSET,
        }
    }

    pub fn from_args<R: BufRead>(args: &ExtractArgs, verbosity: u8, prompt_input: &mut R) -> Result<Self> {
        let source = if args.interactive {
            InputSource::Interactive
        } else {
            InputSource::Flags
        };
        let exit_code = if args.legacy_usage_exit_code {
            0
        } else {
            USAGE_EXIT_CODE
        };

        let input_folder = resolve_folder(
            args.input_folder.as_deref(),
            "Input folder: ",
            DEFAULT_INPUT_FOLDER,
            source,
            exit_code,
            prompt_input,
        )?;
        let working_folder = resolve_folder(
            args.working_folder.as_deref(),
            "Working folder: ",
            DEFAULT_WORKING_FOLDER,
            source,
            exit_code,
            prompt_input,
        )?;
        let output_folder = resolve_folder(
            args.output_folder.as_deref(),
            "Output folder: ",
            DEFAULT_OUTPUT_FOLDER,
            source,
            exit_code,
            prompt_input,
        )?;

        let mut config = Self::with_folders(&input_folder, &working_folder, &output_folder);
        config.verbosity = verbosity;
        config.kpi_spec_path = args.kpi_spec_path.clone();
        config.default_year = args.default_year;
        config.page_filter = args.page.map_or(PageFilter::All, PageFilter::Page);
        config.pdf_name = args.pdf_name.clone();
        config.force_convert = args.force_convert;
        config.force_parse = args.force_parse;
        config.assume_conversion_done = args.assume_conversion_done;
        config.fingerprint_cache = args.fingerprint_cache;
        config.continue_on_error = args.continue_on_error;
        if let Some(store_path) = &args.store_path {
            config.store_path = store_path.clone();
        }
        config.ground_truth_folder = args.ground_truth_folder.clone();
        config.match_policy = args.match_policy;
        config.bucket_offset = args.bucket_offset;

        Ok(config)
    }

    pub fn aggregate_csv_path(&self) -> PathBuf {
        self.output_folder.join("kpiresults.csv")
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.output_folder.join("manifests")
    }
}

pub fn default_store_path(output_folder: &Path) -> PathBuf {
    output_folder.join("kpiresults.sqlite")
}

fn resolve_folder<R: BufRead>(
    value: Option<&Path>,
    prompt: &str,
    default: &str,
    source: InputSource,
    exit_code: i32,
    prompt_input: &mut R,
) -> Result<PathBuf> {
    let raw = match (value, source) {
        (Some(path), _) => path.display().to_string(),
        (None, InputSource::Flags) => default.to_string(),
        (None, InputSource::Interactive) => {
            eprint!("{prompt}");
            std::io::stderr().flush().context("failed to flush prompt")?;
            let mut line = String::new();
            prompt_input
                .read_line(&mut line)
                .context("failed to read folder from stdin")?;
            line.trim().to_string()
        }
    };

    if raw.trim().is_empty() {
        return Err(UsageError {
            message: format!("{prompt}This must not be empty"),
            exit_code,
        }
        .into());
    }

    Ok(PathBuf::from(raw))
}
