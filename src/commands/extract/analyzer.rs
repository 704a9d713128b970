use super::*;

#[derive(Debug)]
pub struct RuleBasedAnalyzer {
    number: Regex,
}

impl RuleBasedAnalyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            number: Regex::new(r"-?\d{1,3}(?:[,']\d{3})+(?:\.\d+)?|-?\d+(?:\.\d+)?")
                .context("failed to compile number regex")?,
        })
    }

    fn compile_labels(spec: &KpiSpec) -> Result<Vec<Regex>> {
        spec.label_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("(?i){pattern}")).with_context(|| {
                    format!("invalid label pattern for KPI {}: {pattern}", spec.id)
                })
            })
            .collect()
    }

    fn first_value(&self, text: &str) -> Option<String> {
        self.number
            .find_iter(text)
            .map(|found| found.as_str())
            .find(|token| !is_bare_year(token))
            .map(|token| token.replace([',', '\''], ""))
    }
}

impl KpiAnalyzer for RuleBasedAnalyzer {
    fn find_kpis(
        &self,
        pages: &PageDirectory,
        year: i32,
        specs: &[KpiSpec],
        source: &str,
    ) -> Result<Vec<KpiMeasurement>> {
        let page_lines: Vec<(u32, Vec<String>)> = pages
            .pages
            .iter()
            .map(|page| (page.page_num, page.lines()))
            .collect();

        let mut measurements = Vec::new();
        for spec in specs {
            let labels = Self::compile_labels(spec)?;
            if labels.is_empty() {
                warn!(kpi_id = spec.id, kpi = %spec.name, "KPI has no label patterns");
                continue;
            }

            for (page_num, lines) in &page_lines {
                for line in lines {
                    let Some(found) = labels.iter().find_map(|label| label.find(line)) else {
                        continue;
                    };
                    let Some(value) = self.first_value(&line[found.end()..]) else {
                        continue;
                    };

                    trace!(kpi_id = spec.id, page = page_num, value = %value, line = %line, "KPI candidate");
                    measurements.push(KpiMeasurement {
                        kpi_id: spec.id,
                        kpi_name: spec.name.clone(),
                        src_file: source.to_string(),
                        page_num: *page_num,
                        year,
                        value,
                    });
                }
            }
        }

        Ok(measurements)
    }
}

fn is_bare_year(token: &str) -> bool {
    token.len() == 4
        && token
            .parse::<u32>()
            .map(|value| (1900..=2099).contains(&value))
            .unwrap_or(false)
}
