use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::errors::PipelineError;
use crate::tree::copy_tree;

pub const FAST5_DIR: &str = "fast5";

/// A run copied into the staging area, with its raw signal folder
/// confirmed present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRun {
    name: String,
    path: PathBuf,
    fast5: PathBuf,
}

impl StagedRun {
    /// Checks an already staged run directory without copying anything.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = run_name(&path)?;
        let fast5 = path.join(FAST5_DIR);
        if !fast5.is_dir() {
            return Err(PipelineError::Staging(format!("fast5 path {:?} does not exist", fast5)).into());
        }
        Ok(StagedRun { name, path, fast5 })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn fast5(&self) -> &Path {
        &self.fast5
    }
}

/// The run name is the final component of the resolved input path. An
/// input that does not exist (deposit already cleaned up) is taken as
/// written.
pub fn run_name<P: AsRef<Path>>(input: P) -> Result<String> {
    let input = input.as_ref();
    let resolved = match input.canonicalize() {
        Ok(resolved) => resolved,
        Err(e) => {
            log::debug!("cannot resolve run path {:?}: {}", input, e);
            input.to_path_buf()
        }
    };
    let name = resolved
        .file_name()
        .ok_or_else(|| PipelineError::Staging(format!("run path {:?} has no final component", resolved)))?;
    Ok(name.to_string_lossy().into_owned())
}

/// Copies `<base_dir>/<run>` into `<output_dir>/<run>` unless a staged
/// copy already exists, in which case the existing copy is used as-is.
pub fn stage_run(config: &Config, name: &str) -> Result<StagedRun> {
    let source = config.paths.base_dir.join(name);
    let target = config.paths.output_dir.join(name);

    if target.exists() {
        log::warn!("a run with the same name is already staged at {:?}, using it", target);
    } else {
        if !source.is_dir() {
            return Err(PipelineError::Staging(format!("run directory {:?} does not exist", source)).into());
        }
        log::info!("copying run {:?} to {:?}", source, target);
        copy_tree(&source, &target).with_context(|| format!("staging run {}", name))?;
    }

    StagedRun::open(&target)
}
