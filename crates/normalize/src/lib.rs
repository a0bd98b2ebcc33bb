pub mod scoring;
pub mod supplier;
pub mod uom;
pub mod util;

pub use scoring::ConfidenceScorer;
pub use supplier::SupplierResolver;
pub use uom::UomNormalizer;
