use super::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreMatrix {
    buckets: Vec<Vec<bool>>,
}

impl ScoreMatrix {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); bucket_count],
        }
    }

    pub fn push(&mut self, bucket: usize, correct: bool) {
        if bucket >= self.buckets.len() {
            self.buckets.resize_with(bucket + 1, Vec::new);
        }
        self.buckets[bucket].push(correct);
    }

    #[cfg(test)]
    pub fn bucket(&self, bucket: usize) -> &[bool] {
        self.buckets.get(bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    #[cfg(test)]
    pub fn buckets(&self) -> &[Vec<bool>] {
        &self.buckets
    }

    pub fn into_buckets(self) -> Vec<Vec<bool>> {
        self.buckets
    }

    pub fn merge(&mut self, other: &ScoreMatrix) {
        for (bucket, flags) in other.buckets.iter().enumerate() {
            if bucket >= self.buckets.len() {
                self.buckets.resize_with(bucket + 1, Vec::new);
            }
            self.buckets[bucket].extend(flags.iter().copied());
        }
    }

    pub fn summary(&self) -> Vec<BucketSummary> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(bucket, flags)| {
                let matched = flags.len();
                let correct = flags.iter().filter(|flag| **flag).count();
                BucketSummary {
                    bucket,
                    matched,
                    correct,
                    accuracy: (matched > 0).then(|| correct as f64 / matched as f64),
                }
            })
            .collect()
    }
}

impl fmt::Display for ScoreMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.buckets)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KpiScorer<'a> {
    buckets: &'a BucketTable,
    policy: MatchPolicy,
}

impl<'a> KpiScorer<'a> {
    pub fn new(buckets: &'a BucketTable, policy: MatchPolicy) -> Self {
        Self { buckets, policy }
    }

    pub fn score(&self, truth: &GroundTruth, results: &KpiResultSet) -> Result<ScoreMatrix> {
        let mut matrix = ScoreMatrix::new(self.buckets.bucket_count());
        self.evaluate(truth, results, &mut matrix)?;
        Ok(matrix)
    }

    /// Every measurement with the triple's id and year adds one flag, unless the
    /// policy is first-match. Value and page decide the flag, not the match.
    pub fn evaluate(
        &self,
        truth: &GroundTruth,
        results: &KpiResultSet,
        matrix: &mut ScoreMatrix,
    ) -> Result<()> {
        for (scope, entry) in &truth.scopes {
            for triple in entry.triples() {
                for measurement in results.iter() {
                    if measurement.kpi_id != triple.kpi_id || measurement.year != triple.year {
                        continue;
                    }

                    let bucket = self.buckets.bucket_for(triple.kpi_id).with_context(|| {
                        format!("no score bucket for KPI {} (scope {scope})", triple.kpi_id)
                    })?;
                    let correct =
                        measurement.value == triple.value && measurement.page_num == triple.page;
                    trace!(
                        scope = %scope,
                        kpi_id = triple.kpi_id,
                        year = triple.year,
                        expected_value = %triple.value,
                        actual_value = %measurement.value,
                        expected_page = triple.page,
                        actual_page = measurement.page_num,
                        correct,
                        "scored measurement"
                    );
                    matrix.push(bucket, correct);

                    if self.policy == MatchPolicy::FirstMatch {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}
