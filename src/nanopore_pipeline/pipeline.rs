use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::deliver::transfer_data;
use crate::demux::{demultiplex, SampleTable};
use crate::flowcell::{read_flowcell_info, FlowcellMetadata};
use crate::layout::OutputLayout;
use crate::run::{run_name, stage_run};
use crate::samplesheet::read_samplesheet;

/// Sequencing protocol declared on the command line.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Protocol {
    Dna,
    Rna,
    Cdna,
}

impl Protocol {
    pub const NAMES: [&'static str; 3] = ["dna", "rna", "cdna"];
}

impl FromStr for Protocol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dna" => Ok(Protocol::Dna),
            "rna" => Ok(Protocol::Rna),
            "cdna" => Ok(Protocol::Cdna),
            _ => bail!("unknown protocol {:?}, valid options are dna, rna or cdna", s),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Dna => "dna",
            Protocol::Rna => "rna",
            Protocol::Cdna => "cdna",
        };
        write!(f, "{}", name)
    }
}

/// Downstream steps selected for a run.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct Route {
    pub map_reads: bool,
    pub contamination_report: bool,
}

impl Route {
    /// An RNA kit forces the RNA steps whatever protocol was declared.
    pub fn new(metadata: &FlowcellMetadata, protocol: Protocol) -> Self {
        let rna_kit = metadata.is_rna_kit();
        Route {
            map_reads: rna_kit || protocol == Protocol::Rna || protocol == Protocol::Cdna,
            contamination_report: rna_kit || protocol == Protocol::Rna,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunArgs {
    pub input: PathBuf,
    pub reference: String,
    pub protocol: Protocol,
}

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub run_name: String,
    pub metadata: FlowcellMetadata,
    pub samples: SampleTable,
    pub route: Route,
    pub delivered: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Staging,
    FlowcellInfo,
    SampleSheet,
    BaseCalling,
    Demultiplexing,
    ReadQc,
    Transfer,
    Mapping,
    AlignmentQc,
    Contamination,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Staging => "staging run",
            Stage::FlowcellInfo => "reading flowcell info",
            Stage::SampleSheet => "reading sample sheet",
            Stage::BaseCalling => "base calling",
            Stage::Demultiplexing => "merging reads per sample",
            Stage::ReadQc => "read QC",
            Stage::Transfer => "transferring data",
            Stage::Mapping => "mapping",
            Stage::AlignmentQc => "alignment QC",
            Stage::Contamination => "contamination report",
        };
        write!(f, "{}", name)
    }
}

fn begin(stage: Stage) -> Stage {
    log::info!("{} starts", stage);
    stage
}

/// Runs every stage in order and stops at the first failure. Nothing
/// already created or copied is rolled back.
pub fn run_pipeline<C: Collaborators>(config: &Config, tools: &C, args: &RunArgs) -> Result<PipelineSummary> {
    let stage = begin(Stage::Staging);
    let name = run_name(&args.input).with_context(|| stage.to_string())?;
    let staged = stage_run(config, &name).with_context(|| stage.to_string())?;

    let stage = begin(Stage::FlowcellInfo);
    let run = read_flowcell_info(config, staged).with_context(|| stage.to_string())?;
    let layout = OutputLayout::new(config, &run);

    let stage = begin(Stage::SampleSheet);
    let sheet = read_samplesheet(&run).with_context(|| stage.to_string())?;

    let stage = begin(Stage::BaseCalling);
    log::info!("base calling with barcode kit {}", sheet.barcode_kit());
    tools
        .base_call(&run, sheet.barcode_kit())
        .with_context(|| stage.to_string())?;

    let stage = begin(Stage::Demultiplexing);
    let samples = demultiplex(&layout, &sheet).with_context(|| stage.to_string())?;

    let stage = begin(Stage::ReadQc);
    tools
        .qc_reads(&run, &samples, samples.barcode_kit())
        .with_context(|| stage.to_string())?;

    let stage = begin(Stage::Transfer);
    let delivered = transfer_data(&layout, &samples, &args.reference).with_context(|| stage.to_string())?;

    let route = Route::new(run.metadata(), args.protocol);
    log::debug!("kit {} with protocol {}: {:?}", run.metadata().kit(), args.protocol, route);

    if route.map_reads {
        let stage = begin(Stage::Mapping);
        tools
            .map_reads(&run, &samples, &args.reference)
            .with_context(|| stage.to_string())?;

        let stage = begin(Stage::AlignmentQc);
        tools
            .qc_alignments(&run, &samples, samples.barcode_kit(), &args.reference)
            .with_context(|| stage.to_string())?;
    } else {
        log::warn!("no mapping step for protocol {} with kit {}", args.protocol, run.metadata().kit());
    }

    if route.contamination_report {
        let stage = begin(Stage::Contamination);
        tools
            .contamination_report(&run, &samples, &args.reference)
            .with_context(|| stage.to_string())?;
    }

    log::info!("run {} finished", run.name());

    Ok(PipelineSummary {
        run_name: run.name().to_string(),
        metadata: run.metadata().clone(),
        samples,
        route,
        delivered,
    })
}
