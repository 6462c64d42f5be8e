use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

use crate::barcode::BarcodeKit;
use crate::config::{Config, ToolSpec};
use crate::demux::{DemuxSample, SampleTable};
use crate::errors::PipelineError;
use crate::flowcell::RunContext;
use crate::layout::OutputLayout;

/// External tools the pipeline drives. Each call blocks until the tool
/// finishes; any failure aborts the run.
pub trait Collaborators {
    fn base_call(&self, run: &RunContext, barcode_kit: &BarcodeKit) -> Result<()>;

    fn qc_reads(&self, run: &RunContext, samples: &SampleTable, barcode_kit: &BarcodeKit) -> Result<()>;

    fn map_reads(&self, run: &RunContext, samples: &SampleTable, reference: &str) -> Result<()>;

    fn qc_alignments(
        &self,
        run: &RunContext,
        samples: &SampleTable,
        barcode_kit: &BarcodeKit,
        reference: &str,
    ) -> Result<()>;

    fn contamination_report(&self, run: &RunContext, samples: &SampleTable, reference: &str) -> Result<()>;
}

/// Launches the programs named in `[tools.*]`.
pub struct ExternalTools<'a> {
    config: &'a Config,
}

impl<'a> ExternalTools<'a> {
    pub fn new(config: &'a Config) -> Self {
        ExternalTools { config }
    }

    fn layout<'b>(&'b self, run: &'b RunContext) -> OutputLayout<'b> {
        OutputLayout::new(self.config, run)
    }

    fn sample_vars(sample: &DemuxSample) -> Vars {
        let mut vars = Vars::new();
        vars.insert("sample", sample.record().sample_id().to_string());
        vars.insert("sample_name", sample.record().sample_name().to_string());
        vars.insert("barcode", sample.barcode().to_string());
        vars.insert_path("fastq", sample.merged_reads());
        vars
    }
}

impl<'a> Collaborators for ExternalTools<'a> {
    fn base_call(&self, run: &RunContext, barcode_kit: &BarcodeKit) -> Result<()> {
        let mut vars = Vars::new();
        vars.insert("run", run.name().to_string());
        vars.insert_path("fast5", run.fast5());
        vars.insert_path("fastq", run.fastq());
        vars.insert("flowcell", run.metadata().flowcell().to_string());
        vars.insert("kit", run.metadata().kit().to_string());
        vars.insert("barcode_kit", barcode_kit.to_string());

        fs::create_dir_all(run.fastq()).with_context(|| format!("creating {:?}", run.fastq()))?;
        run_tool("basecaller", &self.config.tools.basecaller, &vars, barcode_kit.is_barcoded())
    }

    fn qc_reads(&self, run: &RunContext, samples: &SampleTable, barcode_kit: &BarcodeKit) -> Result<()> {
        let layout = self.layout(run);
        for sample in samples.samples() {
            let outdir = layout.qc_sample_dir(sample.record());
            fs::create_dir_all(&outdir).with_context(|| format!("creating {:?}", outdir))?;

            let mut vars = Self::sample_vars(sample);
            vars.insert_path("summary", &layout.sequencing_summary());
            vars.insert_path("outdir", &outdir);
            run_tool("read_qc", &self.config.tools.read_qc, &vars, barcode_kit.is_barcoded())?;
        }
        Ok(())
    }

    fn map_reads(&self, run: &RunContext, samples: &SampleTable, reference: &str) -> Result<()> {
        let layout = self.layout(run);
        let reference_fasta = layout.reference_fasta(reference);
        for sample in samples.samples() {
            let (outdir, bam) = mapping_paths(&layout, sample, reference)?;
            fs::create_dir_all(&outdir).with_context(|| format!("creating {:?}", outdir))?;

            let mut vars = Self::sample_vars(sample);
            vars.insert_path("reference", &reference_fasta);
            vars.insert_path("outdir", &outdir);
            vars.insert_path("bam", &bam);
            run_tool("mapping", &self.config.tools.mapping, &vars, samples.barcode_kit().is_barcoded())?;
        }
        Ok(())
    }

    fn qc_alignments(
        &self,
        run: &RunContext,
        samples: &SampleTable,
        barcode_kit: &BarcodeKit,
        reference: &str,
    ) -> Result<()> {
        let tool = match &self.config.tools.alignment_qc {
            Some(tool) => tool,
            None => {
                log::warn!("no [tools.alignment_qc] configured, skipping alignment QC");
                return Ok(());
            }
        };

        let layout = self.layout(run);
        for sample in samples.samples() {
            let (outdir, bam) = mapping_paths(&layout, sample, reference)?;
            let mut vars = Self::sample_vars(sample);
            vars.insert_path("summary", &layout.sequencing_summary());
            vars.insert_path("outdir", &outdir);
            vars.insert_path("bam", &bam);
            run_tool("alignment_qc", tool, &vars, barcode_kit.is_barcoded())?;
        }
        Ok(())
    }

    fn contamination_report(&self, run: &RunContext, samples: &SampleTable, reference: &str) -> Result<()> {
        let tool = match &self.config.tools.contamination {
            Some(tool) => tool,
            None => {
                log::warn!("no [tools.contamination] configured, skipping contamination report");
                return Ok(());
            }
        };

        let layout = self.layout(run);
        for sample in samples.samples() {
            let outdir = layout
                .contamination_dir(sample.record())
                .ok_or_else(|| no_group(sample))?;
            fs::create_dir_all(&outdir).with_context(|| format!("creating {:?}", outdir))?;

            let mut vars = Self::sample_vars(sample);
            vars.insert_path("reference", &layout.reference_fasta(reference));
            vars.insert_path("outdir", &outdir);
            run_tool("contamination", tool, &vars, samples.barcode_kit().is_barcoded())?;
        }
        Ok(())
    }
}

fn no_group(sample: &DemuxSample) -> PipelineError {
    PipelineError::Manifest(format!(
        "cannot derive a group from project {:?}",
        sample.record().project()
    ))
}

fn mapping_paths(
    layout: &OutputLayout,
    sample: &DemuxSample,
    reference: &str,
) -> Result<(std::path::PathBuf, std::path::PathBuf)> {
    let outdir = layout
        .mapping_sample_dir(sample.record(), reference)
        .ok_or_else(|| no_group(sample))?;
    let bam = layout
        .aligned_reads(sample.record(), reference)
        .ok_or_else(|| no_group(sample))?;
    Ok((outdir, bam))
}

/// Placeholder values for one tool invocation.
#[derive(Debug, Clone, Default)]
pub struct Vars(HashMap<&'static str, String>);

impl Vars {
    pub fn new() -> Self {
        Vars(HashMap::new())
    }

    pub fn insert(&mut self, key: &'static str, value: String) {
        self.0.insert(key, value);
    }

    pub fn insert_path(&mut self, key: &'static str, value: &Path) {
        self.0.insert(key, value.to_string_lossy().into_owned());
    }

    /// Replaces every `{key}` in `template`; unknown keys stay verbatim.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    match self.0.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

pub fn tool_args(tool: &ToolSpec, vars: &Vars, barcoded: bool) -> Vec<String> {
    let extra: &[String] = if barcoded { &tool.barcoded_args } else { &[] };
    tool.args
        .iter()
        .chain(extra.iter())
        .map(|arg| vars.substitute(arg))
        .collect()
}

/// Runs one tool to completion. A spawn failure or non-zero exit is a
/// collaborator error.
pub fn run_tool(name: &str, tool: &ToolSpec, vars: &Vars, barcoded: bool) -> Result<()> {
    let args = tool_args(tool, vars, barcoded);
    log::info!("running {}: {} {}", name, tool.program, args.join(" "));

    let status = Command::new(&tool.program)
        .args(&args)
        .status()
        .map_err(|e| PipelineError::Collaborator {
            tool: name.to_string(),
            reason: format!("cannot start {:?}: {}", tool.program, e),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(PipelineError::Collaborator {
            tool: name.to_string(),
            reason: format!("{:?} exited with {}", tool.program, status),
        }
        .into())
    }
}
