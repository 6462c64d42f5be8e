use std::path::PathBuf;

use thiserror::Error;

/// Fatal pipeline failures. Library functions return `anyhow::Result`
/// and carry one of these inside when the failure is a validation or
/// collaborator problem rather than a plain I/O error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("staging error: {0}")]
    Staging(String),

    #[error("run metadata error: {0}")]
    Metadata(String),

    #[error("sample sheet error: {0}")]
    Manifest(String),

    #[error("index_id {index_id:?} of sample {sample_id:?} is not acceptable, it should start with BP or BC followed by the barcode number")]
    BarcodeResolution { sample_id: String, index_id: String },

    #[error("sample directory {0:?} already exists, the sample was already processed in this run")]
    DirectoryConflict(PathBuf),

    #[error("{tool} failed: {reason}")]
    Collaborator { tool: String, reason: String },

    #[error("merging reads from {source_dir:?} failed: {reason}")]
    Merge { source_dir: PathBuf, reason: String },
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Staging(_) => 3,
            PipelineError::Metadata(_) => 4,
            PipelineError::Manifest(_) => 5,
            PipelineError::BarcodeResolution { .. } => 6,
            PipelineError::DirectoryConflict(_) => 7,
            PipelineError::Collaborator { .. } => 8,
            PipelineError::Merge { .. } => 9,
        }
    }
}

/// Exit status for any error reaching the top level.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map_or(1, PipelineError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_through_context() {
        let res: anyhow::Result<()> = Err(PipelineError::Metadata("kit id is not valid".to_string()).into());
        let err = res.context("reading flowcell info").unwrap_err();
        assert_eq!(exit_code(&err), 4);
    }

    #[test]
    fn exit_code_plain_io() {
        let err = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(exit_code(&err), 1);
    }
}
