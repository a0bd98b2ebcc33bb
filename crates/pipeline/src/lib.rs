pub mod document;
pub mod output;
pub mod pipeline;

pub use document::{DebugArtifact, DocumentOutput, DocumentStats, RawDocument, RowFailure, RowTrace};
pub use output::{write_outputs, OutputError};
pub use pipeline::{Pipeline, PipelineError};
