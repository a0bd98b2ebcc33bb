//! Document-level input and output shapes.
//!
//! Outputs carry no timestamps or other run-local state, so processing the
//! same document against a warm cache serializes identically across runs.

use serde::{Deserialize, Serialize};

use linea_core::types::{LineItemRecord, RawLineItem};

/// One extracted invoice: an ordered set of raw table rows plus whatever
/// document-level supplier header the extractor found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub document_id: String,
    pub supplier_hint: Option<String>,
    pub rows: Vec<RawLineItem>,
}

/// A row the pipeline refused to process. The row is excluded from `records`;
/// its siblings are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row_index: usize,
    pub error: String,
}

/// Per-document processing counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub rows_in: usize,
    pub records_out: usize,
    pub escalations_attempted: usize,
    pub escalations_denied: usize,
    pub cache_hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutput {
    pub document_id: String,
    /// Ordered by `row_index`.
    pub records: Vec<LineItemRecord>,
    pub failures: Vec<RowFailure>,
    pub stats: DocumentStats,
}

/// Stage-by-stage trace of one row, written alongside the main output for
/// debugging escalation decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowTrace {
    pub row_index: usize,
    pub stages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugArtifact {
    pub document_id: String,
    pub rows: Vec<RowTrace>,
}
