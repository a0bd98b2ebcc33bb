pub mod config;
pub mod types;

pub use config::{canonical_uom, is_each_uom, is_pack_uom, PipelineConfig};
pub use types::{
    FieldKind, FieldSource, LineItemRecord, LookupQuery, NormalizedField, RawLineItem,
    ResolvedValue, ScoreEvidence, SupplierId, UomPack,
};
