use super::*;

const INFO_FILE_NAME: &str = "info.json";

pub fn run(args: ExtractArgs, verbosity: u8) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = run_id_for(started_ts, std::process::id());

    let config = {
        let stdin = io::stdin();
        let mut prompt_input = stdin.lock();
        PipelineConfig::from_args(&args, verbosity, &mut prompt_input)?
    };

    ensure_directory(&config.working_folder)?;
    ensure_directory(&config.output_folder)?;

    info!(
        run_id = %run_id,
        input_folder = %config.input_folder.display(),
        working_folder = %config.working_folder.display(),
        output_folder = %config.output_folder.display(),
        verbosity = config.verbosity,
        pdf_name = %config.pdf_name.clone().unwrap_or_default(),
        page_filter = %config.page_filter.token(),
        "starting extraction"
    );

    let catalog = KpiCatalog::load(config.kpi_spec_path.as_deref(), config.bucket_offset)?;
    let documents = discover_documents(&config)?;
    if documents.is_empty() {
        warn!(input_folder = %config.input_folder.display(), "no PDFs to process");
    }
    info!(documents = documents.len(), "discovered documents");

    let info_file = InfoFile::load(&config.working_folder.join(INFO_FILE_NAME))?;
    let ground_truths = match &config.ground_truth_folder {
        Some(folder) => Some(score::load_ground_truths(
            folder,
            documents.iter().map(|document| document.file_name.as_str()),
        )?),
        None => None,
    };

    let converter = PdfToHtml::new()?;
    let extractor = HtmlPageExtractor::new()?;
    let analyzer = RuleBasedAnalyzer::new()?;
    let orchestrator = PipelineOrchestrator::new(
        &config,
        Collaborators {
            converter: &converter,
            extractor: &extractor,
            analyzer: &analyzer,
        },
    )?;
    let runner = BatchRunner::new(&config, orchestrator);

    let mut connection = open_store(&config.store_path)?;
    begin_run(&connection, &run_id, &started_at)?;

    let batch = {
        let mut writer = ResultWriter::new(&config, Some((&mut connection, run_id.clone())));
        runner.run(&documents, &catalog.specs, &info_file, &mut writer)
    };
    let outcome = match batch {
        Ok(outcome) => outcome,
        Err(err) => {
            finish_run(&connection, &run_id, "failed", documents.len())?;
            return Err(err);
        }
    };
    let status = if outcome.failed_document_count == 0 {
        "completed"
    } else {
        "completed_with_failures"
    };
    finish_run(&connection, &run_id, status, documents.len())?;

    if config.verbosity > 0 {
        write_overall_dump(&outcome.overall)?;
    }

    let total_run_seconds = outcome.elapsed.as_secs_f64();
    let seconds_per_document = total_run_seconds / documents.len().max(1) as f64;
    info!(
        total_run_seconds,
        seconds_per_document,
        "total run time"
    );

    if let Some(truths) = &ground_truths {
        let report = score::build_report(
            &run_id,
            truths,
            &outcome.per_document,
            &catalog.buckets,
            config.match_policy,
        )?;
        let report_path = config
            .manifest_dir()
            .join(format!("score_{}.json", utc_compact_string(started_ts)));
        write_json_pretty(&report_path, &report)?;
        info!(path = %report_path.display(), "wrote score report");
    }

    let manifest_path = config
        .manifest_dir()
        .join(format!("batch_run_{}.json", utc_compact_string(started_ts)));
    let manifest = BatchRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_extract_command(&config),
        tool_versions: collect_tool_versions(),
        paths: BatchPaths {
            input_folder: config.input_folder.display().to_string(),
            working_folder: config.working_folder.display().to_string(),
            output_folder: config.output_folder.display().to_string(),
            kpi_spec_path: config
                .kpi_spec_path
                .as_ref()
                .map(|path| path.display().to_string()),
            store_path: config.store_path.display().to_string(),
            aggregate_csv_path: config.aggregate_csv_path().display().to_string(),
        },
        counts: BatchCounts {
            document_count: documents.len(),
            processed_document_count: outcome.per_document.len(),
            failed_document_count: outcome.failed_document_count,
            measurement_count: outcome.overall.len(),
            kpi_spec_count: catalog.specs.len(),
        },
        documents: outcome.entries,
        total_run_seconds,
        seconds_per_document,
        warnings: outcome.warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote batch run manifest");
    info!(
        run_id = %run_id,
        documents = documents.len(),
        measurements = outcome.overall.len(),
        "extraction completed"
    );

    Ok(())
}

fn write_overall_dump(overall: &KpiResultSet) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "FINAL OVERALL-RESULT")?;
    write!(output, "{overall}")?;
    output.flush()?;
    Ok(())
}

fn render_extract_command(config: &PipelineConfig) -> String {
    let mut command = vec![
        "kpi-extract".to_string(),
        "extract".to_string(),
        "--input-folder".to_string(),
        config.input_folder.display().to_string(),
        "--working-folder".to_string(),
        config.working_folder.display().to_string(),
        "--output-folder".to_string(),
        config.output_folder.display().to_string(),
        "--default-year".to_string(),
        config.default_year.to_string(),
    ];

    if let Some(path) = &config.kpi_spec_path {
        command.push("--kpi-spec-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(name) = &config.pdf_name {
        command.push("--pdf-name".to_string());
        command.push(name.clone());
    }
    if let PageFilter::Page(page) = config.page_filter {
        command.push("--page".to_string());
        command.push(page.to_string());
    }
    for (enabled, flag) in [
        (config.force_convert, "--force-convert"),
        (config.force_parse, "--force-parse"),
        (config.assume_conversion_done, "--assume-conversion-done"),
        (config.fingerprint_cache, "--fingerprint-cache"),
        (config.continue_on_error, "--continue-on-error"),
    ] {
        if enabled {
            command.push(flag.to_string());
        }
    }
    if let Some(path) = &config.ground_truth_folder {
        command.push("--ground-truth-folder".to_string());
        command.push(path.display().to_string());
        command.push("--match-policy".to_string());
        command.push(config.match_policy.as_str().to_string());
    }

    command.join(" ")
}
