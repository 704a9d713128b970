use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::info;

use crate::model::{KpiId, KpiSpec};
use crate::util::read_json;

const FALLBACK_BUCKET_COUNT: u32 = 3;

#[derive(Debug, Deserialize)]
struct KpiSpecFile {
    #[serde(default)]
    kpis: Vec<KpiSpec>,
    #[serde(default)]
    buckets: Option<BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketTable {
    by_id: BTreeMap<KpiId, usize>,
    bucket_count: usize,
}

impl BucketTable {
    pub fn from_entries(entries: impl IntoIterator<Item = (KpiId, usize)>) -> Self {
        let by_id: BTreeMap<KpiId, usize> = entries.into_iter().collect();
        let bucket_count = by_id.values().max().map_or(0, |max| max + 1);
        Self {
            by_id,
            bucket_count,
        }
    }

    /// `bucket = id - offset`; ids below the offset get no bucket.
    pub fn from_offset(offset: KpiId, ids: impl IntoIterator<Item = KpiId>) -> Self {
        Self::from_entries(
            ids.into_iter()
                .filter_map(|id| id.checked_sub(offset).map(|bucket| (id, bucket as usize))),
        )
    }

    pub fn bucket_for(&self, id: KpiId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }
}

#[derive(Debug, Clone, Default)]
pub struct KpiCatalog {
    pub specs: Vec<KpiSpec>,
    pub buckets: BucketTable,
}

impl KpiCatalog {
    pub fn load(path: Option<&Path>, bucket_offset: KpiId) -> Result<Self> {
        let Some(path) = path else {
            info!(bucket_offset, "no KPI spec file given; using offset bucket table");
            return Ok(Self {
                specs: Vec::new(),
                buckets: BucketTable::from_offset(
                    bucket_offset,
                    bucket_offset..=bucket_offset.saturating_add(FALLBACK_BUCKET_COUNT - 1),
                ),
            });
        };

        let file: KpiSpecFile = read_json(path)?;
        let catalog = Self::from_parts(file.kpis, file.buckets, bucket_offset)
            .with_context(|| format!("invalid KPI spec file {}", path.display()))?;

        info!(
            path = %path.display(),
            kpi_count = catalog.specs.len(),
            bucket_count = catalog.buckets.bucket_count(),
            "loaded KPI specifications"
        );

        Ok(catalog)
    }

    fn from_parts(
        specs: Vec<KpiSpec>,
        buckets: Option<BTreeMap<String, usize>>,
        bucket_offset: KpiId,
    ) -> Result<Self> {
        let buckets = match buckets {
            Some(raw) => {
                let mut entries = Vec::with_capacity(raw.len());
                for (key, bucket) in raw {
                    let id = key
                        .trim()
                        .parse::<KpiId>()
                        .with_context(|| format!("bucket key is not a KPI id: {key}"))?;
                    entries.push((id, bucket));
                }
                BucketTable::from_entries(entries)
            }
            None => BucketTable::from_offset(bucket_offset, specs.iter().map(|spec| spec.id)),
        };

        for spec in &specs {
            if spec.name.trim().is_empty() {
                bail!("KPI {} has an empty name", spec.id);
            }
        }

        Ok(Self { specs, buckets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: KpiId) -> KpiSpec {
        KpiSpec {
            id,
            name: format!("kpi {id}"),
            label_patterns: vec![],
        }
    }

    #[test]
    fn offset_table_maps_ids_to_consecutive_buckets() {
        let table = BucketTable::from_offset(6, [6, 7, 8]);
        assert_eq!(table.bucket_for(6), Some(0));
        assert_eq!(table.bucket_for(7), Some(1));
        assert_eq!(table.bucket_for(8), Some(2));
        assert_eq!(table.bucket_for(5), None);
        assert_eq!(table.bucket_count(), 3);
    }

    #[test]
    fn explicit_bucket_table_overrides_offset() {
        let mut buckets = BTreeMap::new();
        buckets.insert("10".to_string(), 1);
        buckets.insert("20".to_string(), 0);

        let catalog = KpiCatalog::from_parts(vec![spec(10), spec(20)], Some(buckets), 6)
            .expect("catalog should build");
        assert_eq!(catalog.buckets.bucket_for(10), Some(1));
        assert_eq!(catalog.buckets.bucket_for(20), Some(0));
        assert_eq!(catalog.buckets.bucket_count(), 2);
    }

    #[test]
    fn missing_spec_file_yields_empty_catalog_with_observed_buckets() {
        let catalog = KpiCatalog::load(None, 6).expect("catalog should load");
        assert!(catalog.specs.is_empty());
        assert_eq!(catalog.buckets.bucket_for(8), Some(2));
        assert_eq!(catalog.buckets.bucket_for(9), None);
    }

    #[test]
    fn offset_near_id_limit_clamps_fallback_buckets() {
        let catalog = KpiCatalog::load(None, KpiId::MAX - 1).expect("catalog should load");
        assert_eq!(catalog.buckets.bucket_for(KpiId::MAX - 1), Some(0));
        assert_eq!(catalog.buckets.bucket_for(KpiId::MAX), Some(1));
        assert_eq!(catalog.buckets.bucket_count(), 2);
    }

    #[test]
    fn spec_file_deserializes_and_rejects_bad_bucket_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kpis.json");
        std::fs::write(
            &path,
            r#"{"kpis": [{"id": 7, "name": "Scope 2 emissions", "label_patterns": ["scope 2"]}]}"#,
        )
        .expect("write spec");

        let catalog = KpiCatalog::load(Some(&path), 6).expect("catalog should load");
        assert_eq!(catalog.specs.len(), 1);
        assert_eq!(catalog.specs[0].label_patterns, vec!["scope 2".to_string()]);
        assert_eq!(catalog.buckets.bucket_for(7), Some(1));

        std::fs::write(&path, r#"{"kpis": [], "buckets": {"scope": 0}}"#).expect("write spec");
        assert!(KpiCatalog::load(Some(&path), 6).is_err());
    }
}
