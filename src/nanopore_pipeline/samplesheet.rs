use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::Deserialize;

use crate::barcode::{BarcodeKit, NO_BARCODE};
use crate::errors::PipelineError;
use crate::flowcell::RunContext;

pub const SAMPLE_SHEET: &str = "SampleSheet.csv";

/// One row of the sample sheet, with missing values replaced by `no_bc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    sample_id: String,
    sample_name: String,
    project: String,
    barcode_kit: String,
    index_id: String,
}

impl SampleRecord {
    pub fn new(sample_id: &str, sample_name: &str, project: &str, barcode_kit: &str, index_id: &str) -> Self {
        SampleRecord {
            sample_id: sample_id.to_string(),
            sample_name: sample_name.to_string(),
            project: project.to_string(),
            barcode_kit: barcode_kit.to_string(),
            index_id: index_id.to_string(),
        }
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }
    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }
    pub fn project(&self) -> &str {
        &self.project
    }
    pub fn barcode_kit(&self) -> &str {
        &self.barcode_kit
    }
    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    /// Copy of this record with `index_id` replaced, used when
    /// normalizing raw index identifiers to barcode folder names.
    pub fn with_index_id(&self, index_id: &str) -> Self {
        SampleRecord {
            index_id: index_id.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SampleRow {
    #[serde(rename = "Sample_ID", default)]
    sample_id: Option<String>,
    #[serde(rename = "Sample_Name", default)]
    sample_name: Option<String>,
    #[serde(rename = "Sample_Project", default)]
    project: Option<String>,
    #[serde(rename = "barcode_kits", default)]
    barcode_kit: Option<String>,
    #[serde(rename = "index_id", default)]
    index_id: Option<String>,
}

impl SampleRow {
    fn into_record(self) -> SampleRecord {
        fn or_sentinel(value: Option<String>) -> String {
            value.unwrap_or_else(|| NO_BARCODE.to_string())
        }

        SampleRecord {
            sample_id: or_sentinel(self.sample_id),
            sample_name: or_sentinel(self.sample_name),
            project: or_sentinel(self.project),
            barcode_kit: or_sentinel(self.barcode_kit),
            index_id: or_sentinel(self.index_id),
        }
    }
}

/// Parsed sample sheet: one barcode kit shared by all samples, keyed by
/// sample id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSheet {
    barcode_kit: BarcodeKit,
    samples: BTreeMap<String, SampleRecord>,
}

impl SampleSheet {
    /// Enforces unique sample ids, a single barcode kit and at least one
    /// sample.
    pub fn new<I: IntoIterator<Item = SampleRecord>>(records: I) -> Result<Self> {
        let mut samples = BTreeMap::new();
        for record in records {
            if samples.contains_key(record.sample_id()) {
                return Err(PipelineError::Manifest(format!("duplicate Sample_ID {:?}", record.sample_id())).into());
            }
            samples.insert(record.sample_id().to_string(), record);
        }

        let kits: Vec<&str> = samples.values().map(SampleRecord::barcode_kit).unique().collect();
        let barcode_kit = match kits.as_slice() {
            [] => return Err(PipelineError::Manifest("sample sheet lists no samples".to_string()).into()),
            [kit] => BarcodeKit::new(kit),
            _ => {
                return Err(PipelineError::Manifest(format!(
                    "a run cannot mix barcode kits, found {}",
                    kits.iter().join(", ")
                ))
                .into())
            }
        };

        Ok(SampleSheet { barcode_kit, samples })
    }

    /// Reads a sample sheet: one banner line, then a CSV table with a
    /// header row.
    pub fn read<R: Read>(input: R) -> Result<Self> {
        let mut reader = BufReader::new(input);
        let mut banner = String::new();
        reader.read_line(&mut banner).context("reading sample sheet banner")?;

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut records = Vec::new();
        for (row_no, row_res) in csv_reader.deserialize::<SampleRow>().enumerate() {
            let row = row_res.map_err(|e| PipelineError::Manifest(format!("data row {}: {}", row_no + 1, e)))?;
            records.push(row.into_record());
        }

        Self::new(records)
    }

    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let filename = filename.as_ref();
        let file = fs::File::open(filename)
            .map_err(|e| PipelineError::Manifest(format!("cannot open {:?}: {}", filename, e)))?;
        Self::read(file).with_context(|| format!("reading sample sheet {:?}", filename))
    }

    pub fn barcode_kit(&self) -> &BarcodeKit {
        &self.barcode_kit
    }

    pub fn samples(&self) -> &BTreeMap<String, SampleRecord> {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub fn read_samplesheet(run: &RunContext) -> Result<SampleSheet> {
    let sheet = SampleSheet::from_file(run.path().join(SAMPLE_SHEET))?;
    log::info!("sample sheet lists {} samples with barcode kit {}", sheet.len(), sheet.barcode_kit());
    for record in sheet.samples().values() {
        log::debug!("{:?}", record);
    }
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARCODED: &str = r#"[Data],,,,
Sample_ID,Sample_Name,Sample_Project,barcode_kits,index_id,Description
S1,liver_a,1234_Smith_Lab,EXP-NBD104,BC01,first
S2,liver_b,1234_Smith_Lab,EXP-NBD104,BC02,
S3,kidney,77_Doe_Genomics,EXP-NBD104,,
"#;

    fn manifest_err(res: Result<SampleSheet>) -> String {
        match res.unwrap_err().downcast::<PipelineError>() {
            Ok(PipelineError::Manifest(msg)) => msg,
            other => panic!("expected manifest error, got {:?}", other),
        }
    }

    #[test]
    fn barcoded_sheet() {
        let sheet = SampleSheet::read(BARCODED.as_bytes()).unwrap();
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet.barcode_kit(), &BarcodeKit::Kit("EXP-NBD104".to_string()));

        let s1 = &sheet.samples()["S1"];
        assert_eq!(s1, &SampleRecord::new("S1", "liver_a", "1234_Smith_Lab", "EXP-NBD104", "BC01"));
        assert_eq!(sheet.samples()["S3"].index_id(), NO_BARCODE);
        assert_eq!(sheet.samples()["S3"].project(), "77_Doe_Genomics");
    }

    #[test]
    fn unbarcoded_sheet() {
        let text = "[Data]\nSample_ID,Sample_Name,Sample_Project,barcode_kits,index_id\nS1,pool,1_Lab,,\n";
        let sheet = SampleSheet::read(text.as_bytes()).unwrap();
        assert_eq!(sheet.barcode_kit(), &BarcodeKit::Unbarcoded);
        assert_eq!(sheet.samples()["S1"].barcode_kit(), NO_BARCODE);
    }

    #[test]
    fn missing_column() {
        let text = "banner\nSample_ID,Sample_Name,Sample_Project,index_id\nS1,pool,1_Lab,BC04\n";
        let sheet = SampleSheet::read(text.as_bytes()).unwrap();
        assert_eq!(sheet.barcode_kit(), &BarcodeKit::Unbarcoded);
        assert_eq!(sheet.samples()["S1"].index_id(), "BC04");
    }

    #[test]
    fn mixed_kits() {
        let text = BARCODED.replace("S3,kidney,77_Doe_Genomics,EXP-NBD104", "S3,kidney,77_Doe_Genomics,EXP-NBD114");
        let msg = manifest_err(SampleSheet::read(text.as_bytes()));
        assert!(msg.contains("EXP-NBD104") && msg.contains("EXP-NBD114"));
    }

    #[test]
    fn kit_missing_on_one_row() {
        let text = BARCODED.replace("S2,liver_b,1234_Smith_Lab,EXP-NBD104", "S2,liver_b,1234_Smith_Lab,");
        manifest_err(SampleSheet::read(text.as_bytes()));
    }

    #[test]
    fn duplicate_sample_id() {
        let text = BARCODED.replace("S2,", "S1,");
        let msg = manifest_err(SampleSheet::read(text.as_bytes()));
        assert!(msg.contains("S1"));
    }

    #[test]
    fn no_rows() {
        let text = "banner\nSample_ID,Sample_Name,Sample_Project,barcode_kits,index_id\n";
        manifest_err(SampleSheet::read(text.as_bytes()));
    }

    #[test]
    fn missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        manifest_err(SampleSheet::from_file(tmp.path().join(SAMPLE_SHEET)));
    }
}
