use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_processed: AtomicU64,
    chunks_indexed: AtomicU64,
    searches_served: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully processed document and the number of chunks it produced.
    pub fn record_processed(&self, chunk_count: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record one served search query.
    pub fn record_search(&self) {
        self.searches_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            searches_served: self.searches_served.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents processed to completion since startup.
    pub documents_processed: u64,
    /// Total chunk count indexed across all processed documents.
    pub chunks_indexed: u64,
    /// Number of search queries served since startup.
    pub searches_served: u64,
}
