use super::*;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum KpiIdField {
    Single(KpiId),
    PerEntry(Vec<KpiId>),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GroundTruthEntry {
    #[serde(rename = "ID")]
    pub id: KpiIdField,
    #[serde(rename = "Year", default)]
    pub years: Vec<i32>,
    #[serde(rename = "Value", default)]
    pub values: Vec<Value>,
    #[serde(rename = "Page", default)]
    pub pages: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundTruthTriple {
    pub kpi_id: KpiId,
    pub year: i32,
    pub value: String,
    pub page: u32,
}

impl GroundTruthEntry {
    fn column_lengths(&self) -> Vec<usize> {
        let mut lengths = vec![self.years.len(), self.values.len(), self.pages.len()];
        if let KpiIdField::PerEntry(ids) = &self.id {
            lengths.push(ids.len());
        }
        lengths
    }

    pub fn is_ragged(&self) -> bool {
        let lengths = self.column_lengths();
        lengths.iter().any(|length| *length != lengths[0])
    }

    /// Columns zipped together; ragged columns are cut to the shortest.
    pub fn triples(&self) -> Vec<GroundTruthTriple> {
        let count = self.column_lengths().into_iter().min().unwrap_or(0);
        (0..count)
            .map(|index| GroundTruthTriple {
                kpi_id: match &self.id {
                    KpiIdField::Single(id) => *id,
                    KpiIdField::PerEntry(ids) => ids[index],
                },
                year: self.years[index],
                value: value_string(&self.values[index]),
                page: self.pages[index],
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundTruth {
    pub scopes: Vec<(String, GroundTruthEntry)>,
}

impl GroundTruth {
    pub fn load(path: &Path) -> Result<Self> {
        let value: Value = read_json(path)?;
        Self::from_value(value).with_context(|| format!("invalid ground truth {}", path.display()))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(scopes) = value else {
            bail!("ground truth must be a JSON object of scopes");
        };

        let mut parsed = Vec::with_capacity(scopes.len());
        for (scope, entry) in scopes {
            let entry: GroundTruthEntry = serde_json::from_value(entry)
                .with_context(|| format!("invalid ground-truth scope {scope}"))?;
            parsed.push((scope, entry));
        }

        Ok(Self { scopes: parsed })
    }

    pub fn triple_count(&self) -> usize {
        self.scopes
            .iter()
            .map(|(_, entry)| entry.triples().len())
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct LoadedGroundTruth {
    pub document: String,
    pub path: PathBuf,
    pub truth: GroundTruth,
}

pub fn ground_truth_path(folder: &Path, document: &str) -> PathBuf {
    let stem = Path::new(document)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(document);
    folder.join(format!("{stem}.json"))
}

pub fn load_ground_truths<'a>(
    folder: &Path,
    documents: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<LoadedGroundTruth>> {
    let mut loaded = Vec::new();
    for document in documents {
        let path = ground_truth_path(folder, document);
        let truth = GroundTruth::load(&path)
            .with_context(|| format!("failed to load ground truth for {document}"))?;

        for (scope, entry) in &truth.scopes {
            if entry.is_ragged() {
                warn!(
                    document = %document,
                    scope = %scope,
                    "ground-truth columns differ in length; extra entries ignored"
                );
            }
        }
        debug!(
            document = %document,
            path = %path.display(),
            triples = truth.triple_count(),
            "loaded ground truth"
        );

        loaded.push(LoadedGroundTruth {
            document: document.to_string(),
            path,
            truth,
        });
    }

    Ok(loaded)
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
