use serde::Deserialize;

/// All tuning knobs for the pipeline, with the defaults the system ships with.
/// Loadable from TOML so deployments can override individual values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-field confidence below which the DecisionGate considers escalation.
    pub confidence_floor: f32,
    /// Minimum string similarity for a fuzzy supplier match to be accepted.
    pub fuzzy_threshold: f32,
    /// Token-bucket capacity for the short rate window.
    pub window_capacity: u32,
    /// Length of the short rate window in seconds.
    pub window_secs: u64,
    /// Maximum external lookups per UTC day, shared across processes.
    pub daily_cap: u32,
    /// How long a cached lookup result stays valid.
    pub lookup_ttl_secs: u64,
    /// Hard timeout on a single external lookup call.
    pub lookup_timeout_secs: u64,
    /// Backoff before the single retry of a failed external call.
    pub retry_backoff_ms: u64,
    /// Maximum external lookup attempts per document (cache hits are free).
    pub max_escalations_per_document: u32,
    /// Confidence assigned to an LLM result that reports no certainty.
    pub default_llm_confidence: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.60,
            fuzzy_threshold: 0.75,
            window_capacity: 7,
            window_secs: 60,
            daily_cap: 20,
            lookup_ttl_secs: 30 * 24 * 3600,
            lookup_timeout_secs: 30,
            retry_backoff_ms: 1500,
            max_escalations_per_document: 3,
            default_llm_confidence: 0.60,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

// ── UOM canonicalization tables ───────────────────────────────────────────────

/// Raw UOM token → canonical short code.
pub const UOM_ALIASES: &[(&str, &str)] = &[
    ("EACH", "EA"),
    ("UNIT", "EA"),
    ("PC", "EA"),
    ("PCS", "EA"),
    ("PIECE", "EA"),
    ("PIECES", "EA"),
    ("EA", "EA"),
    ("CS", "CS"),
    ("CASE", "CS"),
    ("CASES", "CS"),
    ("BX", "BX"),
    ("BOX", "BX"),
    ("BOXES", "BX"),
    ("PK", "PK"),
    ("PACK", "PK"),
    ("PACKS", "PK"),
    ("PKG", "PK"),
    ("PACKAGE", "PK"),
    ("RL", "RL"),
    ("ROLL", "RL"),
    ("ROLLS", "RL"),
    ("DZ", "DZ"),
    ("DOZEN", "DZ"),
    ("CT", "CT"),
    ("COUNT", "CT"),
    ("BG", "BG"),
    ("BAG", "BG"),
    ("BAGS", "BG"),
    ("TB", "TB"),
    ("TUBE", "TB"),
    ("BT", "BT"),
    ("BTL", "BT"),
    ("BOTTLE", "BT"),
    ("GL", "GL"),
    ("GAL", "GL"),
    ("GALLON", "GL"),
    ("LB", "LB"),
    ("LBS", "LB"),
    ("POUND", "LB"),
    ("OZ", "OZ"),
    ("OUNCE", "OZ"),
    ("SH", "SH"),
    ("SHEET", "SH"),
    ("SHEETS", "SH"),
];

/// Canonical codes that denote a bundle of multiple base units.
pub const PACK_UOMS: &[&str] = &["CS", "BX", "PK", "RL", "DZ", "CT", "BG", "TB", "BT"];

/// Canonical codes that are already per-base-unit.
pub const EACH_UOMS: &[&str] = &["EA"];

// ── supplier normalization tables ─────────────────────────────────────────────

pub const KNOWN_SUPPLIERS: &[&str] = &[
    "Sysco",
    "US Foods",
    "Performance Food Group",
    "Gordon Food Service",
    "McLane Company",
    "Ben E. Keith",
    "Shamrock Foods",
    "Reinhart Foodservice",
    "Gala Janitorial Supplies",
    "Interboro Packaging",
    "Imperial Dade",
    "Essendant",
    "S.P. Richards",
    "Fastenal",
    "Grainger",
    "HD Supply",
    "Wesco International",
    "MSC Industrial",
    "Uline",
    "Staples",
    "Office Depot",
    "Magid Glove and Safety Manufacturing Co. LLC",
    "Cintas Corp",
];

/// Upper-cased alias → canonical supplier name.
pub const SUPPLIER_ALIASES: &[(&str, &str)] = &[
    ("SYSCO", "Sysco"),
    ("US FOODS", "US Foods"),
    ("USFOODS", "US Foods"),
    ("PFG", "Performance Food Group"),
    ("GFS", "Gordon Food Service"),
    ("GORDON FOOD", "Gordon Food Service"),
    ("MCLANE", "McLane Company"),
    ("SHAMROCK", "Shamrock Foods"),
    ("REINHART", "Reinhart Foodservice"),
    ("GALA", "Gala Janitorial Supplies"),
    ("GALA JANITORIAL", "Gala Janitorial Supplies"),
    ("INTERBORO", "Interboro Packaging"),
    ("IMPERIAL DADE", "Imperial Dade"),
    ("FASTENAL", "Fastenal"),
    ("GRAINGER", "Grainger"),
    ("ULINE", "Uline"),
    ("STAPLES", "Staples"),
    ("OFFICE DEPOT", "Office Depot"),
    ("MSC", "MSC Industrial"),
    ("MAGID", "Magid Glove and Safety Manufacturing Co. LLC"),
];

pub fn canonical_uom(raw: &str) -> String {
    let key = raw.trim().to_uppercase();
    for (alias, canon) in UOM_ALIASES {
        if *alias == key {
            return (*canon).to_string();
        }
    }
    key
}

pub fn is_pack_uom(canonical: &str) -> bool {
    PACK_UOMS.contains(&canonical)
}

pub fn is_each_uom(canonical: &str) -> bool {
    EACH_UOMS.contains(&canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_policy() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.window_capacity, 7);
        assert_eq!(cfg.daily_cap, 20);
        assert_eq!(cfg.confidence_floor, 0.60);
        assert_eq!(cfg.max_escalations_per_document, 3);
    }

    #[test]
    fn toml_overrides_single_field() {
        let cfg = PipelineConfig::from_toml_str("daily_cap = 5").unwrap();
        assert_eq!(cfg.daily_cap, 5);
        // Everything else keeps its default.
        assert_eq!(cfg.window_capacity, 7);
    }

    #[test]
    fn alias_lookup_maps_to_canonical() {
        assert_eq!(canonical_uom("case"), "CS");
        assert_eq!(canonical_uom(" BOXES "), "BX");
        // Unknown codes pass through upper-cased.
        assert_eq!(canonical_uom("ml"), "ML");
    }

    #[test]
    fn pack_and_each_classes_are_disjoint() {
        for u in PACK_UOMS {
            assert!(!EACH_UOMS.contains(u));
        }
        assert!(is_pack_uom("CS"));
        assert!(is_each_uom("EA"));
        assert!(!is_pack_uom("EA"));
    }
}
