//! Deterministic confidence scoring. No I/O; safe to invoke both before and
//! after escalation.
//!
//! The aggregate is the minimum of the three field confidences. Escalation
//! only ever replaces an unresolved field (confidence 0) with a positive one,
//! so re-scoring after escalation can never lower the aggregate.

use linea_core::config::is_pack_uom;
use linea_core::types::{FieldKind, LineItemRecord, ScoreEvidence};

pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// Recompute `record_confidence` and rebuild the itemized evidence chain.
    pub fn score(record: &mut LineItemRecord) {
        let mut evidence = Vec::new();

        let fields = [
            (FieldKind::Uom, record.uom.confidence, record.uom.is_resolved(), record.uom.source, record.uom.evidence.first().cloned()),
            (FieldKind::PackQuantity, record.pack_quantity.confidence, record.pack_quantity.is_resolved(), record.pack_quantity.source, record.pack_quantity.evidence.first().cloned()),
            (FieldKind::Supplier, record.supplier.confidence, record.supplier.is_resolved(), record.supplier.source, record.supplier.evidence.first().cloned()),
        ];

        let mut aggregate = 1.0f32;
        for (kind, confidence, resolved, source, note) in fields {
            aggregate = aggregate.min(confidence);
            evidence.push(ScoreEvidence::new(
                format!("{}_{}", kind, source),
                confidence,
                resolved,
                note,
            ));
        }

        // Flag the case the price computation downstream cares about most:
        // a pack-class UOM whose pack quantity is still unknown.
        let pack_without_qty = record
            .uom
            .value
            .as_ref()
            .map(|u| is_pack_uom(&u.uom) && !record.pack_quantity.is_resolved())
            .unwrap_or(false);
        evidence.push(ScoreEvidence::new(
            "pack_uom_without_pack_qty",
            0.0,
            pack_without_qty,
            pack_without_qty.then(|| "pack-class UOM but pack quantity unknown".to_string()),
        ));

        evidence.push(ScoreEvidence::new(
            "aggregate_min",
            aggregate,
            true,
            Some("record confidence = min(field confidences)".to_string()),
        ));

        record.record_confidence = aggregate.clamp(0.0, 1.0);
        record.score_evidence = evidence;
    }

    /// Fields whose confidence sits below the escalation floor, in the order
    /// the DecisionGate should try them.
    pub fn fields_below_floor(record: &LineItemRecord, floor: f32) -> Vec<FieldKind> {
        let mut out = Vec::new();
        if record.uom.confidence < floor {
            out.push(FieldKind::Uom);
        }
        if record.pack_quantity.confidence < floor {
            out.push(FieldKind::PackQuantity);
        }
        if record.supplier.confidence < floor {
            out.push(FieldKind::Supplier);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linea_core::types::{FieldSource, NormalizedField, RawLineItem, SupplierId, UomPack};

    fn raw(row_index: usize) -> RawLineItem {
        RawLineItem {
            row_index,
            raw_description: "NITRILE GLOVES LG".into(),
            raw_uom_text: "25/CS".into(),
            raw_quantity_text: "2".into(),
            raw_supplier_text: "ULINE".into(),
        }
    }

    fn record_with(
        uom: NormalizedField<UomPack>,
        pack: NormalizedField<u32>,
        supplier: NormalizedField<SupplierId>,
    ) -> LineItemRecord {
        LineItemRecord {
            raw: raw(0),
            uom,
            pack_quantity: pack,
            supplier,
            record_confidence: 0.0,
            score_evidence: Vec::new(),
        }
    }

    fn resolved_uom(uom: &str, pack: Option<u32>, confidence: f32) -> NormalizedField<UomPack> {
        NormalizedField::resolved(
            UomPack { uom: uom.into(), pack_quantity: pack, each_size: None },
            FieldSource::LocalRule,
            confidence,
            vec!["rule qty_slash_uom matched".into()],
        )
    }

    #[test]
    fn aggregate_is_minimum_of_fields() {
        let mut rec = record_with(
            resolved_uom("CS", Some(25), 0.95),
            NormalizedField::resolved(25, FieldSource::LocalRule, 0.95, vec![]),
            NormalizedField::resolved(SupplierId("Uline".into()), FieldSource::LocalRule, 0.8, vec![]),
        );
        ConfidenceScorer::score(&mut rec);
        assert!((rec.record_confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unresolved_field_pins_aggregate_to_zero() {
        let mut rec = record_with(
            resolved_uom("CS", None, 0.95),
            NormalizedField::unresolved(vec!["no rule matched".into()]),
            NormalizedField::resolved(SupplierId("Uline".into()), FieldSource::LocalRule, 1.0, vec![]),
        );
        ConfidenceScorer::score(&mut rec);
        assert_eq!(rec.record_confidence, 0.0);

        // The pack-class flag is raised.
        let flag = rec
            .score_evidence
            .iter()
            .find(|e| e.rule_name == "pack_uom_without_pack_qty")
            .unwrap();
        assert!(flag.triggered);
    }

    #[test]
    fn rescoring_after_escalation_is_monotone() {
        let mut rec = record_with(
            resolved_uom("CS", None, 0.95),
            NormalizedField::unresolved(vec!["no rule matched".into()]),
            NormalizedField::resolved(SupplierId("Uline".into()), FieldSource::LocalRule, 1.0, vec![]),
        );
        ConfidenceScorer::score(&mut rec);
        let before = rec.record_confidence;

        rec.pack_quantity =
            NormalizedField::resolved(25, FieldSource::CacheHit, 0.8, vec!["cache hit".into()]);
        ConfidenceScorer::score(&mut rec);
        assert!(rec.record_confidence >= before);
        assert!((rec.record_confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn scoring_twice_is_idempotent() {
        let mut rec = record_with(
            resolved_uom("EA", Some(1), 0.7),
            NormalizedField::resolved(1, FieldSource::LocalRule, 0.7, vec![]),
            NormalizedField::unresolved(vec!["no supplier match".into()]),
        );
        ConfidenceScorer::score(&mut rec);
        let first = rec.clone();
        ConfidenceScorer::score(&mut rec);
        assert_eq!(rec, first);
    }

    #[test]
    fn fields_below_floor_in_gate_order() {
        let mut rec = record_with(
            resolved_uom("CS", Some(25), 0.95),
            NormalizedField::unresolved(vec![]),
            NormalizedField::unresolved(vec![]),
        );
        ConfidenceScorer::score(&mut rec);
        assert_eq!(
            ConfidenceScorer::fields_below_floor(&rec, 0.6),
            vec![FieldKind::PackQuantity, FieldKind::Supplier]
        );
    }

    #[test]
    fn evidence_chain_covers_every_field() {
        let mut rec = record_with(
            resolved_uom("CS", Some(25), 0.95),
            NormalizedField::resolved(25, FieldSource::LocalRule, 0.95, vec![]),
            NormalizedField::resolved(SupplierId("Uline".into()), FieldSource::LocalRule, 1.0, vec![]),
        );
        ConfidenceScorer::score(&mut rec);
        let names: Vec<&str> = rec.score_evidence.iter().map(|e| e.rule_name.as_str()).collect();
        assert!(names.contains(&"uom_local_rule"));
        assert!(names.contains(&"pack_quantity_local_rule"));
        assert!(names.contains(&"supplier_local_rule"));
        assert!(names.contains(&"aggregate_min"));
    }
}
