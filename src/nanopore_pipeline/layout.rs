use std::path::PathBuf;

use crate::barcode::BarcodeAssignment;
use crate::config::Config;
use crate::flowcell::RunContext;
use crate::samplesheet::SampleRecord;

pub const READS_EXTENSION: &str = "fastq.gz";
pub const ALIGNMENT_EXTENSION: &str = "bam";
pub const SEQUENCING_SUMMARY: &str = "sequencing_summary.txt";
pub const REFERENCE_FASTA: &str = "genome.fa";
pub const CONTAMINATION_DIR: &str = "contamination_report";

/// Group owning a project: the lowercase token after the last `_`,
/// e.g. `Project_1234_Smith_Lab` belongs to `lab`.
pub fn group_name(project: &str) -> Option<String> {
    project
        .rsplit('_')
        .next()
        .filter(|group| !group.is_empty())
        .map(str::to_lowercase)
}

/// Every path the pipeline reads or writes for one run. Nothing here
/// touches the filesystem.
#[derive(Debug, Clone, Copy)]
pub struct OutputLayout<'a> {
    config: &'a Config,
    run: &'a RunContext,
}

impl<'a> OutputLayout<'a> {
    pub fn new(config: &'a Config, run: &'a RunContext) -> Self {
        OutputLayout { config, run }
    }

    pub fn sequencing_summary(&self) -> PathBuf {
        self.run.fastq().join(SEQUENCING_SUMMARY)
    }

    /// Base calling output holding a sample's reads.
    pub fn basecalled_reads_dir(&self, barcode: &BarcodeAssignment) -> PathBuf {
        match barcode.folder() {
            Some(folder) => self.run.fastq().join(folder),
            None => self.run.fastq().to_path_buf(),
        }
    }

    pub fn reference_fasta(&self, reference: &str) -> PathBuf {
        self.config.paths.genome_dir.join(reference).join(REFERENCE_FASTA)
    }

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.run.path().join(project_dir_name(project))
    }

    pub fn sample_dir(&self, record: &SampleRecord) -> PathBuf {
        self.project_dir(record.project()).join(sample_dir_name(record))
    }

    pub fn merged_reads(&self, record: &SampleRecord) -> PathBuf {
        self.sample_dir(record)
            .join(format!("{}.{}", record.sample_name(), READS_EXTENSION))
    }

    pub fn qc_project_dir(&self, project: &str) -> PathBuf {
        self.run.path().join(qc_dir_name(project))
    }

    pub fn qc_sample_dir(&self, record: &SampleRecord) -> PathBuf {
        self.qc_project_dir(record.project()).join(sample_dir_name(record))
    }

    /// `<group_dir>/<group>/sequencing_data/<platform>/<run>`
    pub fn group_run_dir(&self, project: &str) -> Option<PathBuf> {
        group_name(project).map(|group| {
            self.config
                .paths
                .group_dir
                .join(group)
                .join("sequencing_data")
                .join(&self.config.pipeline.platform)
                .join(self.run.name())
        })
    }

    pub fn delivered_project_dir(&self, project: &str) -> Option<PathBuf> {
        self.group_run_dir(project).map(|dir| dir.join(project_dir_name(project)))
    }

    pub fn delivered_qc_dir(&self, project: &str) -> Option<PathBuf> {
        self.group_run_dir(project).map(|dir| dir.join(qc_dir_name(project)))
    }

    pub fn analysis_dir(&self, project: &str) -> Option<PathBuf> {
        self.group_run_dir(project)
            .map(|dir| dir.join(format!("Analysis_{}", project)))
    }

    pub fn mapping_dir(&self, project: &str, reference: &str) -> Option<PathBuf> {
        self.analysis_dir(project)
            .map(|dir| dir.join(format!("mapping_on_{}", reference)))
    }

    pub fn mapping_sample_dir(&self, record: &SampleRecord, reference: &str) -> Option<PathBuf> {
        self.mapping_dir(record.project(), reference)
            .map(|dir| dir.join(sample_dir_name(record)))
    }

    pub fn aligned_reads(&self, record: &SampleRecord, reference: &str) -> Option<PathBuf> {
        self.mapping_sample_dir(record, reference)
            .map(|dir| dir.join(format!("{}.{}", record.sample_name(), ALIGNMENT_EXTENSION)))
    }

    pub fn contamination_dir(&self, record: &SampleRecord) -> Option<PathBuf> {
        self.analysis_dir(record.project())
            .map(|dir| dir.join(CONTAMINATION_DIR).join(sample_dir_name(record)))
    }
}

fn project_dir_name(project: &str) -> String {
    format!("Project_{}", project)
}

fn qc_dir_name(project: &str) -> String {
    format!("FASTQC_Project_{}", project)
}

fn sample_dir_name(record: &SampleRecord) -> String {
    format!("Sample_{}", record.sample_id())
}
