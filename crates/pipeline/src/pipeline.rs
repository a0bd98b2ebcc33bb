//! The end-to-end document pipeline: local normalization, confidence scoring,
//! gated escalation, and a final re-score.
//!
//! Row-level problems (unparseable rows, denied or failed lookups) never stop
//! the document; only a storage failure aborts processing.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use linea_core::types::{
    FieldKind, FieldSource, LineItemRecord, LookupQuery, NormalizedField, ResolvedValue,
};
use linea_core::PipelineConfig;
use linea_lookup::{LlmClient, LookupAgent, LookupError, SnippetSource};
use linea_normalize::{ConfidenceScorer, SupplierResolver, UomNormalizer};

use crate::document::{DebugArtifact, DocumentOutput, DocumentStats, RawDocument, RowFailure, RowTrace};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

pub struct Pipeline<C, S> {
    config: PipelineConfig,
    suppliers: SupplierResolver,
    agent: LookupAgent<C, S>,
}

impl<C: LlmClient, S: SnippetSource> Pipeline<C, S> {
    pub fn new(config: PipelineConfig, agent: LookupAgent<C, S>) -> Self {
        let suppliers = SupplierResolver::from_defaults(config.fuzzy_threshold);
        Self { config, suppliers, agent }
    }

    pub fn agent(&self) -> &LookupAgent<C, S> {
        &self.agent
    }

    /// Process one document. Returns the normalized records (ordered by row
    /// index) together with a stage-by-stage debug trace.
    pub async fn process(
        &self,
        doc: &RawDocument,
    ) -> Result<(DocumentOutput, DebugArtifact), PipelineError> {
        let mut records = Vec::new();
        let mut failures = Vec::new();
        let mut traces = Vec::new();
        let mut stats = DocumentStats { rows_in: doc.rows.len(), ..DocumentStats::default() };

        // Per-document escalation state: spent budget, plus a memo so two rows
        // that reduce to the same query share one lookup.
        let mut budget_used: u32 = 0;
        let mut memo: HashMap<String, NormalizedField<ResolvedValue>> = HashMap::new();

        for row in &doc.rows {
            let mut trace = RowTrace { row_index: row.row_index, stages: Vec::new() };

            if row.raw_description.trim().is_empty() {
                failures.push(RowFailure {
                    row_index: row.row_index,
                    error: "empty description".to_string(),
                });
                trace.stages.push("rejected: empty description".to_string());
                traces.push(trace);
                continue;
            }

            let mut record = self.local_pass(doc, row);
            ConfidenceScorer::score(&mut record);
            trace.stages.push(format!("local pass: confidence {:.2}", record.record_confidence));

            for kind in ConfidenceScorer::fields_below_floor(&record, self.config.confidence_floor) {
                let query_text = self.query_text_for(doc, row, kind);
                let Some(query) = LookupQuery::new(kind, query_text) else {
                    trace.stages.push(format!("gate: no usable query for {kind}"));
                    continue;
                };

                if let Some(field) = memo.get(&query.query_key) {
                    trace.stages.push(format!("gate: {kind} reused in-run lookup"));
                    apply_escalation(&mut record, kind, field.clone());
                    continue;
                }

                if budget_used >= self.config.max_escalations_per_document {
                    trace.stages.push(format!("gate: {kind} skipped, document budget spent"));
                    push_field_evidence(&mut record, kind, "document escalation budget exhausted");
                    continue;
                }

                trace.stages.push(format!("gate: escalating {kind}"));
                let field = self
                    .agent
                    .escalate(kind, query_text, doc.supplier_hint.as_deref())
                    .await?;

                if field.source == FieldSource::CacheHit {
                    stats.cache_hits += 1;
                } else {
                    budget_used += 1;
                    stats.escalations_attempted += 1;
                    if field.evidence.iter().any(|e| e.contains("escalation denied")) {
                        stats.escalations_denied += 1;
                    }
                }
                trace.stages.push(format!(
                    "escalation: {kind} {} (confidence {:.2})",
                    if field.is_resolved() { "resolved" } else { "unresolved" },
                    field.confidence
                ));

                memo.insert(query.query_key, field.clone());
                apply_escalation(&mut record, kind, field);
            }

            ConfidenceScorer::score(&mut record);
            trace.stages.push(format!("final: confidence {:.2}", record.record_confidence));
            debug!(row = row.row_index, confidence = record.record_confidence, "row done");

            records.push(record);
            traces.push(trace);
        }

        records.sort_by_key(|r| r.raw.row_index);
        failures.sort_by_key(|f| f.row_index);
        traces.sort_by_key(|t| t.row_index);
        stats.records_out = records.len();

        info!(
            document = %doc.document_id,
            records = stats.records_out,
            escalations = stats.escalations_attempted,
            "document processed"
        );

        Ok((
            DocumentOutput {
                document_id: doc.document_id.clone(),
                records,
                failures,
                stats,
            },
            DebugArtifact { document_id: doc.document_id.clone(), rows: traces },
        ))
    }

    fn local_pass(&self, doc: &RawDocument, row: &linea_core::types::RawLineItem) -> LineItemRecord {
        let uom = UomNormalizer::normalize(&row.raw_uom_text, &row.raw_quantity_text);
        let pack_quantity = derive_pack_field(&uom);

        let supplier_text = self.supplier_text(doc, row);
        let supplier = if supplier_text.trim().is_empty() {
            NormalizedField::unresolved(vec!["no supplier text or document hint".to_string()])
        } else {
            self.suppliers.resolve(supplier_text)
        };

        LineItemRecord {
            raw: row.clone(),
            uom,
            pack_quantity,
            supplier,
            record_confidence: 0.0,
            score_evidence: Vec::new(),
        }
    }

    fn supplier_text<'a>(&self, doc: &'a RawDocument, row: &'a linea_core::types::RawLineItem) -> &'a str {
        if row.raw_supplier_text.trim().is_empty() {
            doc.supplier_hint.as_deref().unwrap_or("")
        } else {
            &row.raw_supplier_text
        }
    }

    fn query_text_for<'a>(
        &self,
        doc: &'a RawDocument,
        row: &'a linea_core::types::RawLineItem,
        kind: FieldKind,
    ) -> &'a str {
        match kind {
            FieldKind::Uom | FieldKind::PackQuantity => &row.raw_description,
            FieldKind::Supplier => self.supplier_text(doc, row),
        }
    }
}

/// Lift the pack quantity detected during UOM parsing into its own field.
fn derive_pack_field(uom: &NormalizedField<linea_core::types::UomPack>) -> NormalizedField<u32> {
    match uom.value.as_ref().and_then(|u| u.pack_quantity) {
        Some(q) => NormalizedField::resolved(
            q,
            uom.source,
            uom.confidence,
            vec!["derived from uom parse".to_string()],
        ),
        None => NormalizedField::unresolved(vec!["no pack quantity detected".to_string()]),
    }
}

fn push_field_evidence(record: &mut LineItemRecord, kind: FieldKind, note: &str) {
    match kind {
        FieldKind::Uom => record.uom.push_evidence(note),
        FieldKind::PackQuantity => record.pack_quantity.push_evidence(note),
        FieldKind::Supplier => record.supplier.push_evidence(note),
    }
}

/// Merge an escalation result into the record. An unresolved result only
/// contributes its evidence trail; a resolved one replaces the field when it
/// actually improves on the local confidence.
fn apply_escalation(
    record: &mut LineItemRecord,
    kind: FieldKind,
    field: NormalizedField<ResolvedValue>,
) {
    let NormalizedField { value, source, confidence, evidence } = field;

    let Some(value) = value else {
        for note in evidence {
            push_field_evidence(record, kind, &note);
        }
        return;
    };

    match (kind, value) {
        (FieldKind::Uom, ResolvedValue::UomPack(pack)) => {
            if confidence <= record.uom.confidence {
                return;
            }
            if let Some(q) = pack.pack_quantity {
                if !record.pack_quantity.is_resolved() {
                    record.pack_quantity = NormalizedField::resolved(
                        q,
                        source,
                        confidence,
                        vec!["derived from escalated uom".to_string()],
                    );
                }
            }
            record.uom = NormalizedField::resolved(pack, source, confidence, evidence);
        }
        (FieldKind::PackQuantity, ResolvedValue::PackQuantity(q)) => {
            if confidence > record.pack_quantity.confidence {
                record.pack_quantity = NormalizedField::resolved(q, source, confidence, evidence);
            }
        }
        (FieldKind::Supplier, ResolvedValue::Supplier(id)) => {
            if confidence > record.supplier.confidence {
                record.supplier = NormalizedField::resolved(id, source, confidence, evidence);
            }
        }
        (kind, _) => {
            push_field_evidence(record, kind, "lookup returned a value of the wrong kind");
        }
    }
}
