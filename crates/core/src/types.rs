use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which normalized attribute of a line item a value or lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Uom,
    PackQuantity,
    Supplier,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Uom => "uom",
            FieldKind::PackQuantity => "pack_quantity",
            FieldKind::Supplier => "supplier",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a normalized value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    LocalRule,
    CacheHit,
    LlmLookup,
    Unresolved,
}

impl std::fmt::Display for FieldSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldSource::LocalRule => "local_rule",
            FieldSource::CacheHit => "cache_hit",
            FieldSource::LlmLookup => "llm_lookup",
            FieldSource::Unresolved => "unresolved",
        };
        f.write_str(s)
    }
}

/// A normalized attribute with its provenance, confidence (0.0–1.0), and an
/// ordered evidence trail explaining the derivation.
///
/// Constructed only through [`NormalizedField::resolved`] and
/// [`NormalizedField::unresolved`], which maintain the invariant that an
/// unresolved field carries no value and confidence 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedField<T> {
    pub value: Option<T>,
    pub source: FieldSource,
    pub confidence: f32,
    pub evidence: Vec<String>,
}

impl<T> NormalizedField<T> {
    pub fn resolved(value: T, source: FieldSource, confidence: f32, evidence: Vec<String>) -> Self {
        Self {
            value: Some(value),
            source,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
        }
    }

    pub fn unresolved(evidence: Vec<String>) -> Self {
        Self {
            value: None,
            source: FieldSource::Unresolved,
            confidence: 0.0,
            evidence,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }

    pub fn push_evidence(&mut self, note: impl Into<String>) {
        self.evidence.push(note.into());
    }
}

/// Canonical unit-of-measure plus any pack information detected alongside it.
///
/// "12x500ML" yields `uom = "ML"`, `pack_quantity = Some(12)`,
/// `each_size = Some(500)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UomPack {
    pub uom: String,
    pub pack_quantity: Option<u32>,
    pub each_size: Option<Decimal>,
}

/// Canonical supplier identity (the normalized display name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierId(pub String);

impl std::fmt::Display for SupplierId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One raw row of an extracted invoice table, as produced by the upstream
/// extraction collaborator. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLineItem {
    pub row_index: usize,
    pub raw_description: String,
    pub raw_uom_text: String,
    pub raw_quantity_text: String,
    pub raw_supplier_text: String,
}

/// One itemized entry in a confidence breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvidence {
    pub rule_name: String,
    pub weight: f32,
    pub triggered: bool,
    pub note: Option<String>,
}

impl ScoreEvidence {
    pub fn new(rule_name: impl Into<String>, weight: f32, triggered: bool, note: Option<String>) -> Self {
        Self { rule_name: rule_name.into(), weight, triggered, note }
    }
}

/// A fully normalized, confidence-annotated line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRecord {
    pub raw: RawLineItem,
    pub uom: NormalizedField<UomPack>,
    pub pack_quantity: NormalizedField<u32>,
    pub supplier: NormalizedField<SupplierId>,
    /// Aggregate confidence: the minimum of the three field confidences.
    pub record_confidence: f32,
    pub score_evidence: Vec<ScoreEvidence>,
}

/// The value side of an escalated lookup, tagged by field kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedValue {
    UomPack(UomPack),
    PackQuantity(u32),
    Supplier(SupplierId),
}

/// A canonical lookup request. Two queries with the same `query_key` are
/// interchangeable, which is what makes the cache and in-run dedupe sound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupQuery {
    pub query_key: String,
    pub field_kind: FieldKind,
}

impl LookupQuery {
    /// Derive the canonical key from raw text: lowercase, strip everything but
    /// alphanumerics, `/` and `-`, collapse whitespace, keep the first ten
    /// words. Returns `None` when no usable handle remains.
    pub fn new(field_kind: FieldKind, raw_text: &str) -> Option<Self> {
        let cleaned: String = raw_text
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '/' || c == '-' {
                    c
                } else {
                    ' '
                }
            })
            .collect();
        let words: Vec<&str> = cleaned.split_whitespace().take(10).collect();
        let key = words.join(" ");
        if key.len() < 3 {
            return None;
        }
        Some(Self {
            query_key: format!("{}:{}", field_kind.as_str(), key),
            field_kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_field_clamps_confidence() {
        let f = NormalizedField::resolved("x", FieldSource::LocalRule, 1.7, vec![]);
        assert_eq!(f.confidence, 1.0);
        let f = NormalizedField::resolved("x", FieldSource::LocalRule, -0.2, vec![]);
        assert_eq!(f.confidence, 0.0);
    }

    #[test]
    fn unresolved_field_has_no_value_and_zero_confidence() {
        let f: NormalizedField<UomPack> = NormalizedField::unresolved(vec!["nothing".into()]);
        assert!(f.value.is_none());
        assert_eq!(f.source, FieldSource::Unresolved);
        assert_eq!(f.confidence, 0.0);
    }

    #[test]
    fn query_key_is_canonical() {
        let a = LookupQuery::new(FieldKind::Uom, "  Nitrile GLOVES,  large (Box)  ").unwrap();
        let b = LookupQuery::new(FieldKind::Uom, "nitrile gloves large box").unwrap();
        assert_eq!(a.query_key, b.query_key);
        assert!(a.query_key.starts_with("uom:"));
    }

    #[test]
    fn query_key_truncates_to_ten_words() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let q = LookupQuery::new(FieldKind::Supplier, text).unwrap();
        assert!(!q.query_key.contains("eleven"));
        assert!(q.query_key.ends_with("ten"));
    }

    #[test]
    fn query_rejects_unusable_text() {
        assert!(LookupQuery::new(FieldKind::Uom, "").is_none());
        assert!(LookupQuery::new(FieldKind::Uom, "!!").is_none());
    }

    #[test]
    fn field_source_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FieldSource::LlmLookup).unwrap(),
            "\"llm_lookup\""
        );
    }
}
