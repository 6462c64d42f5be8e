use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::errors::PipelineError;
use crate::run::StagedRun;

pub const SUMMARY_PREFIX: &str = "final_summary";
pub const PROTOCOL_KEY: &str = "protocol=";
pub const FASTQ_DIR: &str = "fastq";

/// Flowcell and kit identifiers taken from the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowcellMetadata {
    flowcell: String,
    kit: String,
}

impl FlowcellMetadata {
    /// Both identifiers must be in the configured allow-lists.
    pub fn new(config: &Config, flowcell: &str, kit: &str) -> Result<Self> {
        if !config.is_compatible_flowcell(flowcell) {
            return Err(PipelineError::Metadata(format!("flowcell id {:?} is not valid", flowcell)).into());
        }
        if !config.is_compatible_kit(kit) {
            return Err(PipelineError::Metadata(format!("kit id {:?} is not valid", kit)).into());
        }
        Ok(FlowcellMetadata {
            flowcell: flowcell.to_string(),
            kit: kit.to_string(),
        })
    }

    pub fn flowcell(&self) -> &str {
        &self.flowcell
    }
    pub fn kit(&self) -> &str {
        &self.kit
    }

    pub fn is_rna_kit(&self) -> bool {
        self.kit.contains("RNA")
    }

    /// Parses the first `protocol=` line and stops. The value is either
    /// `<script>:<flowcell>:<kit>` or the bare `<flowcell>:<kit>`.
    pub fn read<R: Read>(config: &Config, input: R) -> Result<Self> {
        for line_res in BufReader::new(input).lines() {
            let line = line_res.map_err(|e| PipelineError::Metadata(format!("unreadable run summary line: {}", e)))?;
            let value = match line.strip_prefix(PROTOCOL_KEY) {
                Some(value) => value.trim_end_matches(|c| c == '\n' || c == '\r'),
                None => continue,
            };

            let fields: Vec<&str> = value.split(':').collect();
            let (flowcell, kit) = match fields.len() {
                2 => (fields[0], fields[1]),
                n if n >= 3 => (fields[1], fields[2]),
                _ => {
                    return Err(PipelineError::Metadata(format!("malformed protocol line {:?}", line)).into())
                }
            };
            return Self::new(config, flowcell, kit);
        }

        Err(PipelineError::Metadata(format!("no {:?} line in run summary", PROTOCOL_KEY)).into())
    }
}

/// Everything downstream stages need to know about the run. Built once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    name: String,
    path: PathBuf,
    fast5: PathBuf,
    fastq: PathBuf,
    metadata: FlowcellMetadata,
}

impl RunContext {
    pub fn new(staged: StagedRun, metadata: FlowcellMetadata) -> Self {
        let fastq = staged.path().join(FASTQ_DIR);
        RunContext {
            name: staged.name().to_string(),
            path: staged.path().to_path_buf(),
            fast5: staged.fast5().to_path_buf(),
            fastq,
            metadata,
        }
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
    /// Base calling output folder.
    pub fn fastq(&self) -> &Path {
        &self.fastq
    }
    pub fn metadata(&self) -> &FlowcellMetadata {
        &self.metadata
    }
}

/// Finds the one `final_summary*` file in the run directory.
pub fn find_summary_file<P: AsRef<Path>>(run_path: P) -> Result<PathBuf> {
    let run_path = run_path.as_ref();
    let dir_str = run_path
        .to_str()
        .ok_or_else(|| PipelineError::Metadata(format!("run path {:?} is not valid UTF-8", run_path)))?;
    let pattern = format!("{}/{}*", glob::Pattern::escape(dir_str), SUMMARY_PREFIX);

    let mut summaries = Vec::new();
    for path_res in glob::glob(&pattern).with_context(|| format!("summary file pattern {:?}", pattern))? {
        summaries.push(path_res?);
    }

    match summaries.len() {
        0 => Err(PipelineError::Metadata(format!("final summary file does not exist in {:?}", run_path)).into()),
        1 => Ok(summaries.remove(0)),
        n => Err(PipelineError::Metadata(format!(
            "{} final summary files in {:?}, expected exactly one",
            n, run_path
        ))
        .into()),
    }
}

pub fn read_flowcell_info(config: &Config, staged: StagedRun) -> Result<RunContext> {
    let summary_file = find_summary_file(staged.path())?;
    log::debug!("reading run summary {:?}", summary_file);
    let file = fs::File::open(&summary_file).with_context(|| format!("opening {:?}", summary_file))?;
    let metadata = FlowcellMetadata::read(config, file).with_context(|| format!("reading {:?}", summary_file))?;
    log::info!("flowcell {} with kit {}", metadata.flowcell(), metadata.kit());
    Ok(RunContext::new(staged, metadata))
}
