//! Metrics and observability utilities
//!
//! Metric names share the `pgvt` prefix. No exporter is installed here;
//! the embedding application picks a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all pgvt metrics
pub const METRICS_PREFIX: &str = "pgvt";

/// Register all metric descriptions
pub fn register_metrics() {
    // Corpus metrics
    describe_counter!(
        format!("{}_documents_inserted_total", METRICS_PREFIX),
        Unit::Count,
        "Total document rows inserted"
    );

    describe_counter!(
        format!("{}_corpora_replaced_total", METRICS_PREFIX),
        Unit::Count,
        "Total corpora replaced through update-if-exists inserts"
    );

    describe_counter!(
        format!("{}_corpora_deleted_total", METRICS_PREFIX),
        Unit::Count,
        "Total corpora soft-deleted or purged"
    );

    describe_histogram!(
        format!("{}_insert_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document insert transaction latency in seconds"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of search queries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Search query latency in seconds"
    );

    describe_histogram!(
        format!("{}_search_results", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from search"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding provider calls"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding provider errors"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record a completed insert
pub fn record_insert(duration_secs: f64, rows: usize, replaced: bool) {
    counter!(format!("{}_documents_inserted_total", METRICS_PREFIX)).increment(rows as u64);

    if replaced {
        counter!(format!("{}_corpora_replaced_total", METRICS_PREFIX)).increment(1);
    }

    histogram!(format!("{}_insert_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record a soft delete or purge
pub fn record_corpus_deleted(kind: &'static str) {
    counter!(
        format!("{}_corpora_deleted_total", METRICS_PREFIX),
        "kind" => kind
    )
    .increment(1);
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, mode: &str, result_count: usize) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    histogram!(
        format!("{}_search_results", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(result_count as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
        tracing::trace!(model, batch_size, duration_secs, "Embedding recorded");
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every call must be a silent no-op
        register_metrics();
        record_insert(0.01, 3, true);
        record_corpus_deleted("soft");
        record_search(0.02, "keyword", 5);
        record_embedding(0.1, "hash-embedding", 3, true);
        record_embedding(0.1, "hash-embedding", 3, false);
    }
}
