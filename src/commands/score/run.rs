use super::*;

pub fn run(args: ScoreArgs) -> Result<()> {
    let store_path = args
        .store_path
        .clone()
        .unwrap_or_else(|| default_store_path(&args.output_folder));
    if !store_path.exists() {
        bail!("result store missing: {}", store_path.display());
    }

    let connection = open_store(&store_path)?;
    let stored_run = match &args.run_id {
        Some(run_id) => find_run(&connection, run_id)?
            .with_context(|| format!("run not found in {}: {run_id}", store_path.display()))?,
        None => latest_run(&connection)?
            .with_context(|| format!("no runs recorded in {}", store_path.display()))?,
    };

    info!(
        run_id = %stored_run.run_id,
        status = %stored_run.status,
        measurements = stored_run.measurement_count,
        match_policy = args.match_policy.as_str(),
        "scoring run"
    );

    let per_document = load_run_results(&connection, &stored_run.run_id)?;
    let catalog = KpiCatalog::load(args.kpi_spec_path.as_deref(), args.bucket_offset)?;
    let truths = load_ground_truths(
        &args.ground_truth_folder,
        per_document.iter().map(|(document, _)| document.as_str()),
    )?;

    let report = build_report(
        &stored_run.run_id,
        &truths,
        &per_document,
        &catalog.buckets,
        args.match_policy,
    )?;
    write_score_dump(&report)?;

    let report_path = args.report_path.clone().unwrap_or_else(|| {
        args.output_folder
            .join("manifests")
            .join(format!("score_{}.json", stored_run.run_id))
    });
    write_json_pretty(&report_path, &report)?;
    info!(path = %report_path.display(), "wrote score report");

    Ok(())
}
