//! Local store: a pipeline definition as a JSON file on disk.

use std::path::Path;

use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::utils::io;

/// Read and parse a pipeline definition file.
pub fn load(path: &Path) -> Result<Pipeline> {
    let raw = io::read_file(path, "load pipeline")?;
    serde_json::from_str(&raw).map_err(|e| Error::pipeline_invalid_json(path.display().to_string(), e))
}

/// Serialize a pipeline with stable indentation (diff-friendly under
/// version control) and write it atomically, creating or overwriting.
pub fn save(path: &Path, pipeline: &Pipeline) -> Result<()> {
    let body = serde_json::to_string_pretty(pipeline)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize pipeline".to_string())))?;
    io::write_file_atomic(path, &format!("{}\n", body), "save pipeline")
}
