use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::model::KpiMeasurement;
use crate::results::KpiResultSet;
use crate::util::{ensure_directory, now_utc_string};

pub const STORE_SCHEMA_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRun {
    pub run_id: String,
    pub started_at: String,
    pub updated_at: String,
    pub status: String,
    pub document_count: i64,
    pub measurement_count: i64,
}

pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let connection =
        Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
              run_id TEXT PRIMARY KEY,
              started_at TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              status TEXT NOT NULL,
              document_count INTEGER NOT NULL DEFAULT 0,
              measurement_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS measurements (
              run_id TEXT NOT NULL,
              seq INTEGER NOT NULL,
              document TEXT NOT NULL,
              kpi_id INTEGER NOT NULL,
              kpi_name TEXT NOT NULL,
              year INTEGER NOT NULL,
              value TEXT NOT NULL,
              page_num INTEGER NOT NULL,
              PRIMARY KEY(run_id, seq),
              FOREIGN KEY(run_id) REFERENCES runs(run_id)
            );

            CREATE INDEX IF NOT EXISTS idx_measurements_document
              ON measurements(run_id, document);
            ",
        )
        .context("failed to initialize result store schema")?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('store_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [STORE_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('store_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now_utc_string()],
    )?;

    Ok(())
}

pub fn begin_run(connection: &Connection, run_id: &str, started_at: &str) -> Result<()> {
    connection
        .execute(
            "INSERT INTO runs(run_id, started_at, updated_at, status)
             VALUES(?1, ?2, ?2, 'running')",
            params![run_id, started_at],
        )
        .with_context(|| format!("failed to record run {run_id} (run ids must be unique)"))?;
    Ok(())
}

pub fn append_document_results(
    connection: &mut Connection,
    run_id: &str,
    document: &str,
    results: &KpiResultSet,
) -> Result<usize> {
    let tx = connection.transaction()?;

    {
        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM measurements WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )?;

        let mut statement = tx.prepare(
            "
            INSERT INTO measurements(run_id, seq, document, kpi_id, kpi_name, year, value, page_num)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )?;

        for (offset, measurement) in results.iter().enumerate() {
            statement.execute(params![
                run_id,
                next_seq + offset as i64,
                document,
                measurement.kpi_id,
                &measurement.kpi_name,
                measurement.year,
                &measurement.value,
                measurement.page_num,
            ])?;
        }
    }

    tx.commit()
        .with_context(|| format!("failed to store results for {document}"))?;
    Ok(results.len())
}

pub fn finish_run(
    connection: &Connection,
    run_id: &str,
    status: &str,
    document_count: usize,
) -> Result<()> {
    connection
        .execute(
            "UPDATE runs SET
               status = ?2,
               updated_at = ?3,
               document_count = ?4,
               measurement_count = (SELECT COUNT(*) FROM measurements WHERE run_id = ?1)
             WHERE run_id = ?1",
            params![run_id, status, now_utc_string(), document_count as i64],
        )
        .with_context(|| format!("failed to finalize run {run_id}"))?;
    Ok(())
}

pub fn latest_run(connection: &Connection) -> Result<Option<StoredRun>> {
    let run = connection
        .query_row(
            "SELECT run_id, started_at, updated_at, status, document_count, measurement_count
             FROM runs
             ORDER BY started_at DESC, run_id DESC
             LIMIT 1",
            [],
            map_run,
        )
        .optional()?;
    Ok(run)
}

pub fn find_run(connection: &Connection, run_id: &str) -> Result<Option<StoredRun>> {
    let run = connection
        .query_row(
            "SELECT run_id, started_at, updated_at, status, document_count, measurement_count
             FROM runs
             WHERE run_id = ?1",
            [run_id],
            map_run,
        )
        .optional()?;
    Ok(run)
}

pub fn count_runs(connection: &Connection) -> Result<i64> {
    let count = connection.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
    Ok(count)
}

pub fn count_measurements(connection: &Connection) -> Result<i64> {
    let count = connection.query_row("SELECT COUNT(*) FROM measurements", [], |row| row.get(0))?;
    Ok(count)
}

pub fn load_run_results(
    connection: &Connection,
    run_id: &str,
) -> Result<Vec<(String, KpiResultSet)>> {
    let mut statement = connection.prepare(
        "
        SELECT document, kpi_id, kpi_name, year, value, page_num
        FROM measurements
        WHERE run_id = ?1
        ORDER BY seq
        ",
    )?;
    let mut rows = statement.query([run_id])?;

    let mut grouped: Vec<(String, Vec<KpiMeasurement>)> = Vec::new();
    while let Some(row) = rows.next()? {
        let document: String = row.get(0)?;
        let measurement = KpiMeasurement {
            kpi_id: row.get(1)?,
            kpi_name: row.get(2)?,
            src_file: document.clone(),
            year: row.get(3)?,
            value: row.get(4)?,
            page_num: row.get(5)?,
        };

        match grouped.last_mut() {
            Some((current, measurements)) if *current == document => measurements.push(measurement),
            _ => grouped.push((document, vec![measurement])),
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(document, measurements)| (document, KpiResultSet::new(measurements)))
        .collect())
}

fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRun> {
    Ok(StoredRun {
        run_id: row.get(0)?,
        started_at: row.get(1)?,
        updated_at: row.get(2)?,
        status: row.get(3)?,
        document_count: row.get(4)?,
        measurement_count: row.get(5)?,
    })
}
