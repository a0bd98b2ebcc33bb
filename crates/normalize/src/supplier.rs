//! Supplier identity resolution: exact alias lookup, then progressively
//! shorter prefix aliases, then fuzzy matching against the known-supplier
//! list.

use std::collections::HashMap;

use linea_core::config::{KNOWN_SUPPLIERS, SUPPLIER_ALIASES};
use linea_core::types::{FieldSource, NormalizedField, SupplierId};

use crate::util::similarity;

const PREFIX_ALIAS_WEIGHT: f32 = 0.95;

pub struct SupplierResolver {
    aliases: HashMap<String, String>,
    known: Vec<String>,
    /// Minimum similarity for a fuzzy match to be accepted.
    threshold: f32,
}

impl SupplierResolver {
    pub fn new(aliases: HashMap<String, String>, known: Vec<String>, threshold: f32) -> Self {
        Self { aliases, known, threshold }
    }

    /// Resolver loaded with the shipped alias and known-supplier tables.
    pub fn from_defaults(threshold: f32) -> Self {
        let aliases = SUPPLIER_ALIASES
            .iter()
            .map(|(a, c)| ((*a).to_string(), (*c).to_string()))
            .collect();
        let known = KNOWN_SUPPLIERS.iter().map(|s| (*s).to_string()).collect();
        Self::new(aliases, known, threshold)
    }

    pub fn resolve(&self, raw_supplier_text: &str) -> NormalizedField<SupplierId> {
        let key = normalize_key(raw_supplier_text);
        if key.is_empty() {
            return NormalizedField::unresolved(vec!["empty supplier text".to_string()]);
        }

        // Stage 1: exact alias.
        if let Some(canonical) = self.aliases.get(&key) {
            return NormalizedField::resolved(
                SupplierId(canonical.clone()),
                FieldSource::LocalRule,
                1.0,
                vec![format!("alias exact match {key:?} -> {canonical:?}")],
            );
        }

        // Stage 1b: progressively shorter word prefixes of the key.
        let words: Vec<&str> = key.split(' ').collect();
        for count in (1..words.len()).rev() {
            let prefix = words[..count].join(" ");
            if let Some(canonical) = self.aliases.get(&prefix) {
                return NormalizedField::resolved(
                    SupplierId(canonical.clone()),
                    FieldSource::LocalRule,
                    PREFIX_ALIAS_WEIGHT,
                    vec![format!("alias prefix match {prefix:?} -> {canonical:?}")],
                );
            }
        }

        // Stage 2: fuzzy match. Highest similarity wins; ties go to the
        // shortest canonical name.
        let mut best: Option<(&str, f32)> = None;
        for name in &self.known {
            let sim = similarity(&key, &normalize_key(name));
            if sim < self.threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_name, best_sim)) => {
                    sim > best_sim || (sim == best_sim && name.len() < best_name.len())
                }
            };
            if better {
                best = Some((name.as_str(), sim));
            }
        }

        if let Some((name, sim)) = best {
            return NormalizedField::resolved(
                SupplierId(name.to_string()),
                FieldSource::LocalRule,
                sim,
                vec![format!("fuzzy match {name:?} similarity {sim:.3}")],
            );
        }

        NormalizedField::unresolved(vec![format!(
            "no supplier match for {key:?} (threshold {:.2})",
            self.threshold
        )])
    }
}

/// Case/whitespace/punctuation-normalized comparison key.
fn normalize_key(s: &str) -> String {
    s.to_uppercase()
        .replace(['.', ','], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> SupplierResolver {
        SupplierResolver::from_defaults(0.75)
    }

    #[test]
    fn exact_alias_after_normalization() {
        let mut aliases = HashMap::new();
        aliases.insert("ACME CORP".to_string(), "Acme Corporation".to_string());
        let r = SupplierResolver::new(aliases, vec![], 0.75);

        let f = r.resolve("ACME Corp.");
        assert_eq!(f.value.unwrap().0, "Acme Corporation");
        assert_eq!(f.confidence, 1.0);
        assert_eq!(f.source, FieldSource::LocalRule);
    }

    #[test]
    fn shipped_alias_table_resolves() {
        let f = resolver().resolve("  sysco ");
        assert_eq!(f.value.unwrap().0, "Sysco");
        assert_eq!(f.confidence, 1.0);
    }

    #[test]
    fn prefix_alias_matches_longer_header_lines() {
        let f = resolver().resolve("GALA JANITORIAL SUPPLY DIVISION NORTH");
        assert_eq!(f.value.unwrap().0, "Gala Janitorial Supplies");
        assert!(f.confidence < 1.0);
    }

    #[test]
    fn fuzzy_match_catches_ocr_misspelling() {
        let f = resolver().resolve("GRANGER");
        assert_eq!(f.value.unwrap().0, "Grainger");
        assert!(f.confidence >= 0.75 && f.confidence < 1.0);
        assert!(f.evidence[0].contains("fuzzy match"));
    }

    #[test]
    fn below_threshold_is_unresolved() {
        let f = resolver().resolve("COMPLETELY UNKNOWN VENDOR 123");
        assert!(f.value.is_none());
        assert_eq!(f.source, FieldSource::Unresolved);
        assert_eq!(f.confidence, 0.0);
        assert!(f.evidence[0].contains("no supplier match"));
    }

    #[test]
    fn tie_breaks_by_shortest_canonical_name() {
        let known = vec!["ABCD Supply".to_string(), "ABCD".to_string()];
        let r = SupplierResolver::new(HashMap::new(), known, 0.5);
        // Equidistant-enough input that favors the exact short form.
        let f = r.resolve("ABCD");
        assert_eq!(f.value.unwrap().0, "ABCD");
    }

    #[test]
    fn empty_input_is_unresolved() {
        let f = resolver().resolve("   ");
        assert!(f.value.is_none());
    }

    #[test]
    fn deterministic() {
        let a = resolver().resolve("GRANGER");
        let b = resolver().resolve("GRANGER");
        assert_eq!(a, b);
    }
}
