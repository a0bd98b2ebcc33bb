//! Output persistence: pretty-printed JSON, written atomically so a crash
//! mid-write never leaves a truncated file behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use serde::Serialize;

use crate::document::{DebugArtifact, DocumentOutput};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("output serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write `{document_id}.json` and `{document_id}.debug.json` into `dir`.
/// Returns the path of the main output file.
pub fn write_outputs(
    dir: &Path,
    output: &DocumentOutput,
    debug: &DebugArtifact,
) -> Result<PathBuf, OutputError> {
    fs::create_dir_all(dir)?;
    let main_path = dir.join(format!("{}.json", output.document_id));
    write_atomic(&main_path, output)?;
    write_atomic(&dir.join(format!("{}.debug.json", output.document_id)), debug)?;
    Ok(main_path)
}

/// Serialize to a sibling temp file, then rename over the target.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
