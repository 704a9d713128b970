use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    NotConverted,
    Converted,
    Parsed,
    Analyzed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAction {
    Ran,
    Skipped,
    Assumed,
}

impl StageAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ran => "ran",
            Self::Skipped => "skipped",
            Self::Assumed => "assumed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub results: KpiResultSet,
    pub fiscal_year: i32,
    pub convert: StageAction,
    pub parse: StageAction,
    /// Whether structured pages were loaded from their serialized form.
    pub reloaded: bool,
    pub state: DocumentState,
}

pub struct PipelineOrchestrator<'a> {
    config: &'a PipelineConfig,
    collaborators: Collaborators<'a>,
    cache: StageCache<'a>,
    year_pattern: Regex,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(config: &'a PipelineConfig, collaborators: Collaborators<'a>) -> Result<Self> {
        Ok(Self {
            config,
            collaborators,
            cache: StageCache::new(config)?,
            year_pattern: Regex::new(r"(?:^|[^0-9])((?:19|20)[0-9]{2})(?:[^0-9]|$)")
                .context("failed to compile fiscal year regex")?,
        })
    }

    pub fn analyze_document(
        &self,
        document: &Document,
        specs: &[KpiSpec],
        info_file: &InfoFile,
    ) -> Result<DocumentOutcome> {
        let dir = &document.working_dir;
        let filter = self.config.page_filter;
        info!(document = %document.file_name, page_filter = %filter.token(), "analyzing document");

        ensure_directory(dir)?;

        let mut state = DocumentState::NotConverted;
        let mut fresh_pages: Option<PageDirectory> = None;

        let (convert, parse) = if self.config.assume_conversion_done {
            debug!(document = %document.file_name, "conversion assumed done");
            state = DocumentState::Parsed;
            (StageAction::Assumed, StageAction::Assumed)
        } else {
            info!(document = %document.file_name, "stage: convert");
            let artifacts = self.cache.inspect(dir)?;
            let decision = self.cache.convert_decision(&artifacts);
            debug!(document = %document.file_name, reason = decision.reason(), "convert decision");
            let convert = if decision.should_run() {
                self.collaborators
                    .converter
                    .convert(document, info_file.document(&document.file_name))?;
                StageAction::Ran
            } else {
                StageAction::Skipped
            };
            state = advance(state, DocumentState::Converted);

            info!(document = %document.file_name, "stage: parse");
            let artifacts = self.cache.inspect(dir)?;
            let decision = self.cache.parse_decision(dir, &artifacts)?;
            debug!(
                document = %document.file_name,
                reason = decision.reason(),
                converted_pages = artifacts.converted_pages,
                parsed_pages = artifacts.parsed_pages,
                "parse decision"
            );
            let parse = if decision.should_run() {
                let pages = self.collaborators.extractor.parse(dir, filter)?;
                self.collaborators.extractor.render(document, filter)?;
                self.collaborators.extractor.save(&pages, dir)?;
                if filter.is_all() {
                    if self.config.fingerprint_cache {
                        self.cache.record_fingerprint(dir)?;
                    }
                    fresh_pages = Some(pages);
                }
                StageAction::Ran
            } else {
                StageAction::Skipped
            };
            state = advance(state, DocumentState::Parsed);

            (convert, parse)
        };

        let reloaded = fresh_pages.is_none();
        let pages = match fresh_pages {
            Some(pages) => pages,
            None => {
                info!(document = %document.file_name, "stage: load");
                self.collaborators.extractor.load(dir, filter)?
            }
        };

        info!(document = %document.file_name, pages = pages.len(), "stage: analyze");
        if pages.is_empty() {
            warn!(
                document = %document.file_name,
                page_filter = %filter.token(),
                "no structured pages to analyze"
            );
        }
        let fiscal_year = self
            .guess_fiscal_year(&document.file_name)
            .unwrap_or(self.config.default_year);

        let results = if specs.is_empty() {
            debug!(document = %document.file_name, "no KPI specifications to search for");
            KpiResultSet::default()
        } else {
            KpiResultSet::new(self.collaborators.analyzer.find_kpis(
                &pages,
                fiscal_year,
                specs,
                &document.file_name,
            )?)
        };
        state = advance(state, DocumentState::Analyzed);

        info!(
            document = %document.file_name,
            fiscal_year,
            convert = convert.as_str(),
            parse = parse.as_str(),
            reloaded,
            measurements = results.len(),
            "document analyzed"
        );

        Ok(DocumentOutcome {
            results,
            fiscal_year,
            convert,
            parse,
            reloaded,
            state,
        })
    }

    pub fn guess_fiscal_year(&self, file_name: &str) -> Option<i32> {
        self.year_pattern
            .captures(file_name)
            .and_then(|captures| captures.get(1))
            .and_then(|year| year.as_str().parse::<i32>().ok())
    }
}

fn advance(current: DocumentState, next: DocumentState) -> DocumentState {
    debug!(from = ?current, to = ?next, "document state transition");
    next
}
