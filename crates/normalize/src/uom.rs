//! UOM and pack-quantity detection. Pure regex rules, deterministic, no I/O.
//!
//! Rules are declared most specific first; the first match wins and its fixed
//! weight becomes the field confidence.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use linea_core::config::{canonical_uom, is_each_uom, UOM_ALIASES};
use linea_core::types::{FieldSource, NormalizedField, UomPack};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_pack_by_size, r"(?i)\b(\d+)\s*x\s*(\d+(?:\.\d+)?)\s*([A-Za-z]{1,4})\b");
re!(re_qty_slash_uom, r"\b(\d+)\s*/\s*([A-Za-z]{2,})\b");
re!(re_pack_of, r"(?i)\b(CASE|BOX|PACK|PACKAGE|PKG)\s+OF\s+(\d+)\b");
re!(re_pk_prefix, r"(?i)\b(PK|PACK|PKG)\s*(\d+)\b");
re!(re_per_pack, r"(?i)\(?\s*(\d+)\s+PER\s+(PACK|CASE|BOX|PACKAGE|PKG|ROLL|BAG)\s*\)?");
re!(re_count_each, r"(?i)\b(\d+)\s+(EA|EACH|UNIT|PC|PCS|PIECE|PIECES)\b");
re!(re_uom_then_qty, r"(?i)\b(CS|CASE|BX|BOX|PK|PACK|PKG)\s+(\d+)\b");

fn re_uom_token() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        let mut tokens: Vec<&str> = UOM_ALIASES.iter().map(|(alias, _)| *alias).collect();
        // Longest first so e.g. "PIECES" wins over "PC".
        tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
        Regex::new(&format!(r"(?i)\b({})\b", tokens.join("|"))).expect("invalid regex")
    })
}

// ── OCR noise pre-pass ───────────────────────────────────────────────────────

re!(re_ws, r"\s+");
re!(re_c4se, r"(?i)\bC4SE\b");
re!(re_ca5e, r"(?i)\bCA5E\b");
re!(re_b0x, r"(?i)\bB0X\b");
re!(re_split_pk, r"(?i)\bP\s*K\s*(\d)");
re!(re_split_ea, r"(?i)\bE\s*A\b");
re!(re_letter_o_ten, r"\b1O\b");
re!(re_i_digit, r"\bI(\d)\b");
re!(re_digit_o, r"(\d)O\b");
re!(re_digit_l, r"(\d)l\b");
re!(re_digit_s, r"(\d)S\b");

/// Fix common digit/letter OCR misreads and normalize whitespace.
fn clean_ocr(text: &str) -> String {
    let text = re_ws().replace_all(text.trim(), " ");
    let text = text.trim_end_matches('.');
    let text = re_c4se().replace_all(text, "CASE");
    let text = re_ca5e().replace_all(&text, "CASE");
    let text = re_b0x().replace_all(&text, "BOX");
    let text = re_split_pk().replace_all(&text, "PK$1");
    let text = re_split_ea().replace_all(&text, "EA");
    let text = re_letter_o_ten().replace_all(&text, "10");
    let text = re_i_digit().replace_all(&text, "1$1");
    let text = re_digit_o().replace_all(&text, "${1}0");
    let text = re_digit_l().replace_all(&text, "${1}1");
    let text = re_digit_s().replace_all(&text, "${1}5");
    text.into_owned()
}

// ── Rule set ─────────────────────────────────────────────────────────────────

struct RuleHit {
    raw_uom: String,
    pack_quantity: Option<u32>,
    each_size: Option<Decimal>,
    matched: String,
}

struct Rule {
    name: &'static str,
    weight: f32,
    matcher: fn(&str) -> Option<RuleHit>,
}

/// Ordered rule table; declaration order is the tie-break.
const RULES: &[Rule] = &[
    Rule { name: "pack_by_size", weight: 1.0, matcher: match_pack_by_size },
    Rule { name: "qty_slash_uom", weight: 0.95, matcher: match_qty_slash_uom },
    Rule { name: "pack_of", weight: 0.95, matcher: match_pack_of },
    Rule { name: "pk_prefix", weight: 0.90, matcher: match_pk_prefix },
    Rule { name: "per_pack", weight: 0.90, matcher: match_per_pack },
    Rule { name: "count_each", weight: 0.85, matcher: match_count_each },
    Rule { name: "uom_then_qty", weight: 0.80, matcher: match_uom_then_qty },
    Rule { name: "uom_token", weight: 0.70, matcher: match_uom_token },
];

fn match_pack_by_size(text: &str) -> Option<RuleHit> {
    let c = re_pack_by_size().captures(text)?;
    Some(RuleHit {
        raw_uom: c.get(3)?.as_str().to_uppercase(),
        pack_quantity: c.get(1)?.as_str().parse().ok(),
        each_size: Decimal::from_str(c.get(2)?.as_str()).ok(),
        matched: c.get(0)?.as_str().to_string(),
    })
}

fn match_qty_slash_uom(text: &str) -> Option<RuleHit> {
    let c = re_qty_slash_uom().captures(text)?;
    Some(RuleHit {
        raw_uom: c.get(2)?.as_str().to_uppercase(),
        pack_quantity: c.get(1)?.as_str().parse().ok(),
        each_size: None,
        matched: c.get(0)?.as_str().to_string(),
    })
}

fn match_pack_of(text: &str) -> Option<RuleHit> {
    let c = re_pack_of().captures(text)?;
    Some(RuleHit {
        raw_uom: c.get(1)?.as_str().to_uppercase(),
        pack_quantity: c.get(2)?.as_str().parse().ok(),
        each_size: None,
        matched: c.get(0)?.as_str().to_string(),
    })
}

fn match_pk_prefix(text: &str) -> Option<RuleHit> {
    let c = re_pk_prefix().captures(text)?;
    Some(RuleHit {
        raw_uom: c.get(1)?.as_str().to_uppercase(),
        pack_quantity: c.get(2)?.as_str().parse().ok(),
        each_size: None,
        matched: c.get(0)?.as_str().to_string(),
    })
}

fn match_per_pack(text: &str) -> Option<RuleHit> {
    let c = re_per_pack().captures(text)?;
    Some(RuleHit {
        raw_uom: c.get(2)?.as_str().to_uppercase(),
        pack_quantity: c.get(1)?.as_str().parse().ok(),
        each_size: None,
        matched: c.get(0)?.as_str().to_string(),
    })
}

fn match_count_each(text: &str) -> Option<RuleHit> {
    let c = re_count_each().captures(text)?;
    Some(RuleHit {
        raw_uom: c.get(2)?.as_str().to_uppercase(),
        pack_quantity: c.get(1)?.as_str().parse().ok(),
        each_size: None,
        matched: c.get(0)?.as_str().to_string(),
    })
}

fn match_uom_then_qty(text: &str) -> Option<RuleHit> {
    let c = re_uom_then_qty().captures(text)?;
    Some(RuleHit {
        raw_uom: c.get(1)?.as_str().to_uppercase(),
        pack_quantity: c.get(2)?.as_str().parse().ok(),
        each_size: None,
        matched: c.get(0)?.as_str().to_string(),
    })
}

fn match_uom_token(text: &str) -> Option<RuleHit> {
    let c = re_uom_token().captures(text)?;
    let raw_uom = c.get(1)?.as_str().to_uppercase();
    // A bare EA-class token means one base unit per purchasable unit.
    let pack_quantity = if is_each_uom(&canonical_uom(&raw_uom)) {
        Some(1)
    } else {
        None
    };
    Some(RuleHit {
        raw_uom,
        pack_quantity,
        each_size: None,
        matched: c.get(0)?.as_str().to_string(),
    })
}

// ── Public API ───────────────────────────────────────────────────────────────

pub struct UomNormalizer;

impl UomNormalizer {
    /// Parse UOM + pack info out of the raw UOM column, falling back to the
    /// raw quantity column. Identical input always yields identical output.
    pub fn normalize(raw_uom_text: &str, raw_quantity_text: &str) -> NormalizedField<UomPack> {
        let inputs = [("uom_text", raw_uom_text), ("quantity_text", raw_quantity_text)];

        for (label, text) in inputs {
            if text.trim().is_empty() {
                continue;
            }
            let cleaned = clean_ocr(text);
            for rule in RULES {
                if let Some(hit) = (rule.matcher)(&cleaned) {
                    let value = UomPack {
                        uom: canonical_uom(&hit.raw_uom),
                        pack_quantity: hit.pack_quantity,
                        each_size: hit.each_size,
                    };
                    let evidence = vec![format!(
                        "rule {} matched {:?} in {}",
                        rule.name, hit.matched, label
                    )];
                    return NormalizedField::resolved(
                        value,
                        FieldSource::LocalRule,
                        rule.weight,
                        evidence,
                    );
                }
            }
        }

        let attempted: Vec<&str> = RULES.iter().map(|r| r.name).collect();
        NormalizedField::unresolved(vec![
            "no rule matched".to_string(),
            format!("attempted rules: {}", attempted.join(", ")),
        ])
    }
}
