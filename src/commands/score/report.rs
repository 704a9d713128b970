use super::*;

pub fn build_report(
    run_id: &str,
    truths: &[LoadedGroundTruth],
    per_document: &[(String, KpiResultSet)],
    buckets: &BucketTable,
    policy: MatchPolicy,
) -> Result<ScoreReport> {
    let scorer = KpiScorer::new(buckets, policy);
    let empty = KpiResultSet::default();
    let mut combined = ScoreMatrix::new(buckets.bucket_count());
    let mut documents = Vec::with_capacity(truths.len());

    for loaded in truths {
        let results = per_document
            .iter()
            .find(|(document, _)| *document == loaded.document)
            .map(|(_, results)| results)
            .unwrap_or(&empty);

        let matrix = scorer
            .score(&loaded.truth, results)
            .with_context(|| format!("failed to score {}", loaded.document))?;
        info!(
            document = %loaded.document,
            measurements = results.len(),
            matrix = %matrix,
            "scored document"
        );

        combined.merge(&matrix);
        documents.push(DocumentScore {
            document: loaded.document.clone(),
            ground_truth_path: loaded.path.display().to_string(),
            buckets: matrix.into_buckets(),
        });
    }

    let summary = combined.summary();
    for bucket in &summary {
        info!(
            bucket = bucket.bucket,
            matched = bucket.matched,
            correct = bucket.correct,
            accuracy = bucket.accuracy.unwrap_or_default(),
            "bucket summary"
        );
    }

    Ok(ScoreReport {
        manifest_version: 1,
        run_id: run_id.to_string(),
        generated_at: now_utc_string(),
        match_policy: policy.as_str().to_string(),
        documents,
        buckets: combined.into_buckets(),
        summary,
    })
}

pub fn write_score_dump(report: &ScoreReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Run: {} (match policy {})", report.run_id, report.match_policy)?;
    for document in &report.documents {
        writeln!(output, "{}\t{:?}", document.document, document.buckets)?;
    }
    writeln!(output, "Overall\t{:?}", report.buckets)?;
    for bucket in &report.summary {
        let accuracy = bucket
            .accuracy
            .map(|value| format!("{:.3}", value))
            .unwrap_or_else(|| "n/a".to_string());
        writeln!(
            output,
            "bucket {}: {}/{} correct (accuracy {})",
            bucket.bucket, bucket.correct, bucket.matched, accuracy
        )?;
    }
    output.flush()?;
    Ok(())
}
