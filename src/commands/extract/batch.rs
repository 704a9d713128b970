use super::*;

pub struct ResultWriter<'c> {
    output_folder: PathBuf,
    aggregate_csv_path: PathBuf,
    store: Option<(&'c mut Connection, String)>,
}

impl<'c> ResultWriter<'c> {
    pub fn new(config: &PipelineConfig, store: Option<(&'c mut Connection, String)>) -> Self {
        Self {
            output_folder: config.output_folder.clone(),
            aggregate_csv_path: config.aggregate_csv_path(),
            store,
        }
    }

    pub fn document_csv_path(&self, document: &Document) -> PathBuf {
        self.output_folder.join(format!("{}.csv", document.file_name))
    }

    pub fn persist_document(&mut self, document: &Document, results: &KpiResultSet) -> Result<PathBuf> {
        let path = self.document_csv_path(document);
        results.save_to_csv_file(&path)?;
        if let Some((connection, run_id)) = self.store.as_mut() {
            append_document_results(connection, run_id, &document.file_name, results)?;
        }
        Ok(path)
    }

    pub fn persist_overall(&mut self, overall: &KpiResultSet) -> Result<PathBuf> {
        overall.save_to_csv_file(&self.aggregate_csv_path)?;
        Ok(self.aggregate_csv_path.clone())
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub overall: KpiResultSet,
    pub per_document: Vec<(String, KpiResultSet)>,
    pub entries: Vec<DocumentRunEntry>,
    pub failed_document_count: usize,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

pub struct BatchRunner<'a> {
    config: &'a PipelineConfig,
    orchestrator: PipelineOrchestrator<'a>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a PipelineConfig, orchestrator: PipelineOrchestrator<'a>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn run(
        &self,
        documents: &[Document],
        specs: &[KpiSpec],
        info_file: &InfoFile,
        writer: &mut ResultWriter<'_>,
    ) -> Result<BatchOutcome> {
        let started = Instant::now();
        let mut outcome = BatchOutcome::default();

        for document in documents {
            let document_started = Instant::now();
            let result = self.orchestrator.analyze_document(document, specs, info_file);

            let analyzed = match result {
                Ok(analyzed) => analyzed,
                Err(err) if self.config.continue_on_error => {
                    let warning = format!("failed to process {}: {err:#}", document.file_name);
                    warn!(document = %document.file_name, error = %err, "document failed; continuing");
                    outcome.failed_document_count += 1;
                    outcome.warnings.push(warning);
                    outcome.entries.push(DocumentRunEntry {
                        document: document.file_name.clone(),
                        fiscal_year: None,
                        convert: None,
                        parse: None,
                        reloaded: None,
                        measurement_count: 0,
                        elapsed_ms: document_started.elapsed().as_millis(),
                        csv_path: None,
                        error: Some(format!("{err:#}")),
                    });
                    continue;
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to process {}", document.file_name));
                }
            };

            if analyzed.results.is_empty() {
                debug!(document = %document.file_name, "no KPI measurements found");
            }
            let csv_path = writer.persist_document(document, &analyzed.results)?;
            info!(
                document = %document.file_name,
                state = ?analyzed.state,
                path = %csv_path.display(),
                measurements = analyzed.results.len(),
                "wrote document results"
            );

            outcome.entries.push(DocumentRunEntry {
                document: document.file_name.clone(),
                fiscal_year: Some(analyzed.fiscal_year),
                convert: Some(analyzed.convert.as_str().to_string()),
                parse: Some(analyzed.parse.as_str().to_string()),
                reloaded: Some(analyzed.reloaded),
                measurement_count: analyzed.results.len(),
                elapsed_ms: document_started.elapsed().as_millis(),
                csv_path: Some(csv_path.display().to_string()),
                error: None,
            });
            outcome
                .per_document
                .push((document.file_name.clone(), analyzed.results.clone()));
            outcome.overall.extend(analyzed.results);
        }

        let aggregate_path = writer.persist_overall(&outcome.overall)?;
        info!(
            path = %aggregate_path.display(),
            measurements = outcome.overall.len(),
            "wrote overall results"
        );

        outcome.elapsed = started.elapsed();
        Ok(outcome)
    }
}

pub fn discover_documents(config: &PipelineConfig) -> Result<Vec<Document>> {
    let entries = fs::read_dir(&config.input_folder)
        .with_context(|| format!("failed to read {}", config.input_folder.display()))?;

    let mut pdf_paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| {
            format!("failed to read entry in {}", config.input_folder.display())
        })?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if is_pdf {
            pdf_paths.push(path);
        }
    }
    pdf_paths.sort();

    let mut documents = Vec::with_capacity(pdf_paths.len());
    for path in pdf_paths {
        let document = Document::new(&path, &config.working_folder)?;
        if config
            .pdf_name
            .as_ref()
            .is_some_and(|name| *name != document.file_name)
        {
            continue;
        }
        documents.push(document);
    }

    Ok(documents)
}
