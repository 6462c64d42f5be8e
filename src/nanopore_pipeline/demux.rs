use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::barcode::{BarcodeAssignment, BarcodeKit};
use crate::errors::PipelineError;
use crate::layout::{OutputLayout, READS_EXTENSION};
use crate::samplesheet::{SampleRecord, SampleSheet};

/// A sample after barcode resolution. `record().index_id()` holds the
/// canonical barcode folder name for barcoded runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxSample {
    record: SampleRecord,
    barcode: BarcodeAssignment,
    source_dir: PathBuf,
    sample_dir: PathBuf,
    merged_reads: PathBuf,
}

impl DemuxSample {
    pub fn record(&self) -> &SampleRecord {
        &self.record
    }
    pub fn barcode(&self) -> &BarcodeAssignment {
        &self.barcode
    }
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
    pub fn sample_dir(&self) -> &Path {
        &self.sample_dir
    }
    pub fn merged_reads(&self) -> &Path {
        &self.merged_reads
    }
}

/// Normalized, read-only sample table consumed by every stage after
/// demultiplexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTable {
    barcode_kit: BarcodeKit,
    samples: BTreeMap<String, DemuxSample>,
}

impl SampleTable {
    /// Resolves every sample's barcode without touching the filesystem.
    pub fn normalize(layout: &OutputLayout, sheet: &SampleSheet) -> Result<Self> {
        let barcode_kit = sheet.barcode_kit().clone();
        if !barcode_kit.is_barcoded() && sheet.len() != 1 {
            return Err(PipelineError::Manifest(format!(
                "run without barcodes must have exactly one sample, sample sheet lists {}",
                sheet.len()
            ))
            .into());
        }

        let mut samples = BTreeMap::new();
        for (sample_id, raw) in sheet.samples() {
            let (barcode, record) = if barcode_kit.is_barcoded() {
                let barcode = BarcodeAssignment::resolve(sample_id, raw.index_id())?;
                let record = raw.with_index_id(&barcode.to_string());
                (barcode, record)
            } else {
                (BarcodeAssignment::Unbarcoded, raw.clone())
            };

            let sample = DemuxSample {
                source_dir: layout.basecalled_reads_dir(&barcode),
                sample_dir: layout.sample_dir(&record),
                merged_reads: layout.merged_reads(&record),
                record,
                barcode,
            };
            samples.insert(sample_id.to_string(), sample);
        }

        Ok(SampleTable { barcode_kit, samples })
    }

    pub fn barcode_kit(&self) -> &BarcodeKit {
        &self.barcode_kit
    }

    pub fn samples(&self) -> impl Iterator<Item = &DemuxSample> {
        self.samples.values()
    }

    pub fn get(&self, sample_id: &str) -> Option<&DemuxSample> {
        self.samples.get(sample_id)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Distinct project names, sorted.
    pub fn projects(&self) -> BTreeSet<&str> {
        self.samples.values().map(|s| s.record.project()).collect()
    }
}

/// Resolves barcodes, creates `Project_*/Sample_*` directories and merges
/// each sample's reads into one file.
pub fn demultiplex(layout: &OutputLayout, sheet: &SampleSheet) -> Result<SampleTable> {
    let table = SampleTable::normalize(layout, sheet)?;

    for sample in table.samples() {
        let project_dir = layout.project_dir(sample.record.project());
        if !project_dir.exists() {
            fs::create_dir(&project_dir).with_context(|| format!("creating {:?}", project_dir))?;
        }

        match fs::create_dir(&sample.sample_dir) {
            Ok(()) => (),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::DirectoryConflict(sample.sample_dir.clone()).into())
            }
            Err(e) => return Err(e).with_context(|| format!("creating {:?}", sample.sample_dir)),
        }

        let nfiles = merge_reads(&sample.source_dir, &sample.merged_reads)?;
        log::info!(
            "sample {} ({}): merged {} read files from {:?}",
            sample.record.sample_id(),
            sample.barcode,
            nfiles,
            sample.source_dir
        );
    }

    Ok(table)
}

/// Read files in `source_dir`, in lexicographic order.
pub fn read_files(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir_str = source_dir.to_str().ok_or_else(|| PipelineError::Merge {
        source_dir: source_dir.to_path_buf(),
        reason: "path is not valid UTF-8".to_string(),
    })?;
    let pattern = format!("{}/*.{}", glob::Pattern::escape(dir_str), READS_EXTENSION);

    let mut files = Vec::new();
    for path_res in glob::glob(&pattern).with_context(|| format!("read file pattern {:?}", pattern))? {
        let path = path_res?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Concatenates every read file in `source_dir` into `dest`, leaving the
/// sources in place. Returns the number of files merged.
pub fn merge_reads(source_dir: &Path, dest: &Path) -> Result<usize> {
    let files = read_files(source_dir)?;
    if files.is_empty() {
        return Err(PipelineError::Merge {
            source_dir: source_dir.to_path_buf(),
            reason: format!("no *.{} files", READS_EXTENSION),
        }
        .into());
    }

    let mut out = BufWriter::new(fs::File::create(dest).with_context(|| format!("creating {:?}", dest))?);
    for file in files.iter() {
        let mut input = fs::File::open(file).with_context(|| format!("opening {:?}", file))?;
        io::copy(&mut input, &mut out).map_err(|e| PipelineError::Merge {
            source_dir: source_dir.to_path_buf(),
            reason: format!("copying {:?} into {:?}: {}", file, dest, e),
        })?;
    }
    out.flush().with_context(|| format!("writing {:?}", dest))?;

    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::scratch_config;
    use crate::config::Config;
    use crate::flowcell::{FlowcellMetadata, RunContext};
    use crate::run::StagedRun;
    use rand::Rng;

    fn scratch_run(config: &Config) -> RunContext {
        let run_path = config.paths.output_dir.join("run1");
        fs::create_dir_all(run_path.join("fast5")).unwrap();
        fs::create_dir_all(run_path.join("fastq")).unwrap();
        let staged = StagedRun::open(&run_path).unwrap();
        RunContext::new(staged, FlowcellMetadata::new(config, "FLO-MIN106", "SQK-LSK109").unwrap())
    }

    fn write_reads(dir: &Path, name: &str, contents: &[u8]) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), contents).unwrap();
    }

    fn sheet(records: Vec<SampleRecord>) -> SampleSheet {
        SampleSheet::new(records).unwrap()
    }

    #[test]
    fn normalizes_index_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        let run = scratch_run(&config);
        let layout = OutputLayout::new(&config, &run);

        let sheet = sheet(vec![
            SampleRecord::new("S1", "liver", "1_Lab", "EXP-NBD104", "BC01"),
            SampleRecord::new("S2", "heart", "1_Lab", "EXP-NBD104", "BP3"),
        ]);
        let table = SampleTable::normalize(&layout, &sheet).unwrap();

        let s1 = table.get("S1").unwrap();
        assert_eq!(s1.record().index_id(), "barcode01");
        assert_eq!(s1.barcode(), &BarcodeAssignment::Folder("barcode01".to_string()));
        assert_eq!(s1.source_dir(), run.fastq().join("barcode01").as_path());
        assert_eq!(table.get("S2").unwrap().record().index_id(), "barcode3");

        // the parsed sheet itself keeps the raw identifiers
        assert_eq!(sheet.samples()["S1"].index_id(), "BC01");
        assert!(!run.path().join("Project_1_Lab").exists());
    }

    #[test]
    fn bad_prefix_fails_before_any_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        let run = scratch_run(&config);
        let layout = OutputLayout::new(&config, &run);

        let sheet = sheet(vec![
            SampleRecord::new("S1", "liver", "1_Lab", "EXP-NBD104", "BC01"),
            SampleRecord::new("S2", "heart", "1_Lab", "EXP-NBD104", "NB02"),
        ]);
        let err = demultiplex(&layout, &sheet).unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::BarcodeResolution { index_id, .. }) => assert_eq!(index_id, "NB02"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!run.path().join("Project_1_Lab").exists());
    }

    #[test]
    fn unbarcoded_single_sample() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        let run = scratch_run(&config);
        let layout = OutputLayout::new(&config, &run);
        write_reads(run.fastq(), "fastq_runid_0.fastq.gz", b"@r1\nACGT\n+\nIIII\n");

        let sheet = sheet(vec![SampleRecord::new("S1", "pool", "1_Lab", "no_bc", "no_bc")]);
        let table = demultiplex(&layout, &sheet).unwrap();
        let s1 = table.get("S1").unwrap();
        assert_eq!(s1.barcode(), &BarcodeAssignment::Unbarcoded);
        assert_eq!(s1.record().index_id(), "no_bc");
        assert_eq!(fs::read(s1.merged_reads()).unwrap(), b"@r1\nACGT\n+\nIIII\n");
        assert_eq!(s1.merged_reads(), run.path().join("Project_1_Lab/Sample_S1/pool.fastq.gz").as_path());
    }

    #[test]
    fn unbarcoded_many_samples() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        let run = scratch_run(&config);
        let layout = OutputLayout::new(&config, &run);

        let sheet = sheet(vec![
            SampleRecord::new("S1", "a", "1_Lab", "no_bc", "no_bc"),
            SampleRecord::new("S2", "b", "1_Lab", "no_bc", "no_bc"),
        ]);
        let err = demultiplex(&layout, &sheet).unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::Manifest(_))));
    }

    #[test]
    fn merge_is_concatenation() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("barcode05");
        let mut rng = rand::thread_rng();

        let mut expected = Vec::new();
        let mut sources = Vec::new();
        for i in 0..4 {
            let len = rng.gen_range(0..5000);
            let contents: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let name = format!("fastq_runid_abc_{}.fastq.gz", i);
            write_reads(&source, &name, &contents);
            expected.extend_from_slice(&contents);
            sources.push((source.join(name), contents));
        }
        write_reads(&source, "sequencing_summary.txt", b"not reads");

        let dest = tmp.path().join("merged.fastq.gz");
        assert_eq!(merge_reads(&source, &dest).unwrap(), 4);
        assert_eq!(fs::read(&dest).unwrap(), expected);
        for (path, contents) in sources {
            assert_eq!(fs::read(path).unwrap(), contents);
        }
    }

    #[test]
    fn merge_without_reads() {
        let tmp = tempfile::tempdir().unwrap();
        let err = merge_reads(tmp.path(), &tmp.path().join("out.fastq.gz")).unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::Merge { .. })));
    }

    #[test]
    fn existing_sample_dir_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        let run = scratch_run(&config);
        let layout = OutputLayout::new(&config, &run);
        write_reads(&run.fastq().join("barcode01"), "a.fastq.gz", b"reads");

        let sheet = sheet(vec![SampleRecord::new("S1", "liver", "1_Lab", "EXP-NBD104", "BC01")]);
        demultiplex(&layout, &sheet).unwrap();

        let err = demultiplex(&layout, &sheet).unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::DirectoryConflict(dir)) => {
                assert_eq!(dir, &run.path().join("Project_1_Lab/Sample_S1"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn projects_are_distinct() {
        let tmp = tempfile::tempdir().unwrap();
        let config = scratch_config(tmp.path());
        let run = scratch_run(&config);
        let layout = OutputLayout::new(&config, &run);
        for bc in ["barcode01", "barcode02", "barcode03"] {
            write_reads(&run.fastq().join(bc), "a.fastq.gz", bc.as_bytes());
        }

        let sheet = sheet(vec![
            SampleRecord::new("S1", "a", "1_Smith_Lab", "EXP-NBD104", "BC01"),
            SampleRecord::new("S2", "b", "1_Smith_Lab", "EXP-NBD104", "BC02"),
            SampleRecord::new("S3", "c", "2_Doe_Genomics", "EXP-NBD104", "BC03"),
        ]);
        let table = demultiplex(&layout, &sheet).unwrap();
        assert_eq!(table.projects().into_iter().collect::<Vec<_>>(), vec!["1_Smith_Lab", "2_Doe_Genomics"]);
        assert_eq!(fs::read(table.get("S3").unwrap().merged_reads()).unwrap(), b"barcode03");
    }
}
