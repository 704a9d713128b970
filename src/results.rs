use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::model::KpiMeasurement;
use crate::util::{escape_csv_cell, write_text};

const CSV_HEADER: [&str; 6] = ["kpi_id", "kpi_name", "src_file", "page_num", "year", "value"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KpiResultSet {
    measurements: Vec<KpiMeasurement>,
}

impl KpiResultSet {
    pub fn new(measurements: Vec<KpiMeasurement>) -> Self {
        Self { measurements }
    }

    pub fn extend(&mut self, other: KpiResultSet) {
        self.measurements.extend(other.measurements);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KpiMeasurement> {
        self.measurements.iter()
    }

    pub fn to_csv(&self) -> String {
        let mut lines = Vec::with_capacity(self.measurements.len() + 1);
        lines.push(CSV_HEADER.join(","));
        for measurement in &self.measurements {
            let row = [
                measurement.kpi_id.to_string(),
                measurement.kpi_name.clone(),
                measurement.src_file.clone(),
                measurement.page_num.to_string(),
                measurement.year.to_string(),
                measurement.value.clone(),
            ];
            lines.push(
                row.iter()
                    .map(|cell| escape_csv_cell(cell))
                    .collect::<Vec<String>>()
                    .join(","),
            );
        }

        let mut csv = lines.join("\n");
        csv.push('\n');
        csv
    }

    pub fn save_to_csv_file(&self, path: &Path) -> Result<()> {
        write_text(path, &self.to_csv())
    }
}

impl FromIterator<KpiMeasurement> for KpiResultSet {
    fn from_iter<I: IntoIterator<Item = KpiMeasurement>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for KpiResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "KPI results ({} measurements)", self.measurements.len())?;
        for measurement in &self.measurements {
            writeln!(
                f,
                "  {} ({}) year={} value={} page={} src={}",
                measurement.kpi_name,
                measurement.kpi_id,
                measurement.year,
                measurement.value,
                measurement.page_num,
                measurement.src_file
            )?;
        }
        Ok(())
    }
}
