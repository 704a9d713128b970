use super::*;

pub const ROOT_MARKER: &str = "index.html";
pub const FINGERPRINT_FILE: &str = "stage_fingerprint.json";

const CONVERTED_PAGE_GLOB: &str = "page*.html";
const PARSED_PAGE_GLOB: &str = "jpage*.json";
const RENDERED_IMAGE_GLOB: &str = "page*.png";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageArtifactSet {
    pub has_root_marker: bool,
    pub converted_pages: usize,
    pub parsed_pages: usize,
    pub rendered_images: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageDecision {
    Run { reason: &'static str },
    Skip { reason: &'static str },
}

impl StageDecision {
    pub fn should_run(self) -> bool {
        matches!(self, Self::Run { .. })
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Run { reason } | Self::Skip { reason } => reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StageFingerprint {
    page_count: usize,
    digest: String,
}

#[derive(Debug)]
pub struct StageCache<'a> {
    config: &'a PipelineConfig,
    converted: Pattern,
    parsed: Pattern,
    rendered: Pattern,
}

impl<'a> StageCache<'a> {
    pub fn new(config: &'a PipelineConfig) -> Result<Self> {
        Ok(Self {
            config,
            converted: compile_pattern(CONVERTED_PAGE_GLOB)?,
            parsed: compile_pattern(PARSED_PAGE_GLOB)?,
            rendered: compile_pattern(RENDERED_IMAGE_GLOB)?,
        })
    }

    pub fn inspect(&self, dir: &Path) -> Result<StageArtifactSet> {
        let artifacts = StageArtifactSet {
            has_root_marker: dir.join(ROOT_MARKER).is_file(),
            converted_pages: matching_files(dir, &self.converted)?.len(),
            parsed_pages: matching_files(dir, &self.parsed)?.len(),
            rendered_images: matching_files(dir, &self.rendered)?.len(),
        };

        debug!(
            dir = %dir.display(),
            has_root_marker = artifacts.has_root_marker,
            converted_pages = artifacts.converted_pages,
            parsed_pages = artifacts.parsed_pages,
            rendered_images = artifacts.rendered_images,
            "inspected stage artifacts"
        );

        Ok(artifacts)
    }

    pub fn convert_decision(&self, artifacts: &StageArtifactSet) -> StageDecision {
        if self.config.force_convert {
            StageDecision::Run { reason: "forced" }
        } else if !artifacts.has_root_marker {
            StageDecision::Run {
                reason: "root marker missing",
            }
        } else {
            StageDecision::Skip {
                reason: "root marker present",
            }
        }
    }

    pub fn parse_decision(&self, dir: &Path, artifacts: &StageArtifactSet) -> Result<StageDecision> {
        if self.config.force_parse {
            return Ok(StageDecision::Run { reason: "forced" });
        }
        if artifacts.parsed_pages != artifacts.converted_pages {
            return Ok(StageDecision::Run {
                reason: "parsed page count differs from converted page count",
            });
        }
        if self.config.fingerprint_cache {
            let stored = read_fingerprint(dir)?;
            let current = self.fingerprint(dir)?;
            if stored.as_ref() != Some(&current) {
                return Ok(StageDecision::Run {
                    reason: "converted page fingerprint changed",
                });
            }
        }

        Ok(StageDecision::Skip {
            reason: "parsed pages up to date",
        })
    }

    pub fn record_fingerprint(&self, dir: &Path) -> Result<()> {
        let fingerprint = self.fingerprint(dir)?;
        write_json_pretty(&dir.join(FINGERPRINT_FILE), &fingerprint)
    }

    fn fingerprint(&self, dir: &Path) -> Result<StageFingerprint> {
        let pages = matching_files(dir, &self.converted)?;
        let mut hasher = Sha256::new();
        for path in &pages {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(sha256_file(path)?.as_bytes());
            hasher.update(b"\n");
        }

        Ok(StageFingerprint {
            page_count: pages.len(),
            digest: format!("{:x}", hasher.finalize()),
        })
    }
}

fn read_fingerprint(dir: &Path) -> Result<Option<StageFingerprint>> {
    let path = dir.join(FINGERPRINT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    read_json(&path).map(Some)
}
