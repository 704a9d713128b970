use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::config::default_store_path;
use crate::store::{count_measurements, count_runs, latest_run, open_store};

pub fn run(args: StatusArgs) -> Result<()> {
    let store_path = args
        .store_path
        .unwrap_or_else(|| default_store_path(&args.output_folder));

    info!(output_folder = %args.output_folder.display(), "status requested");

    if !store_path.exists() {
        warn!(path = %store_path.display(), "result store missing");
        return Ok(());
    }

    let connection = open_store(&store_path)?;
    let runs = count_runs(&connection).unwrap_or(0);
    let measurements = count_measurements(&connection).unwrap_or(0);

    info!(
        path = %store_path.display(),
        runs,
        measurements,
        "result store status"
    );

    match latest_run(&connection)? {
        Some(run) => info!(
            run_id = %run.run_id,
            status = %run.status,
            started_at = %run.started_at,
            updated_at = %run.updated_at,
            documents = run.document_count,
            measurements = run.measurement_count,
            "latest run"
        ),
        None => warn!(path = %store_path.display(), "result store has no runs"),
    }

    Ok(())
}
