use std::fmt;

use crate::errors::PipelineError;

/// Sentinel used for missing sample sheet values and unbarcoded runs.
pub const NO_BARCODE: &str = "no_bc";

/// Barcode cartridge and barcode plate index prefixes.
pub const INDEX_PREFIXES: [&str; 2] = ["BC", "BP"];

pub const BARCODE_FOLDER_PREFIX: &str = "barcode";

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum BarcodeKit {
    Unbarcoded,
    Kit(String),
}

impl BarcodeKit {
    pub fn new(value: &str) -> Self {
        if value == NO_BARCODE {
            BarcodeKit::Unbarcoded
        } else {
            BarcodeKit::Kit(value.to_string())
        }
    }

    pub fn is_barcoded(&self) -> bool {
        matches!(self, BarcodeKit::Kit(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            BarcodeKit::Unbarcoded => NO_BARCODE,
            BarcodeKit::Kit(kit) => kit,
        }
    }
}

impl fmt::Display for BarcodeKit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a sample's reads live in the base calling output.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum BarcodeAssignment {
    /// Single-sample run, reads are in the base output folder.
    Unbarcoded,
    /// Canonical barcode folder name, e.g. `barcode01`.
    Folder(String),
}

impl BarcodeAssignment {
    /// Resolves a sample sheet `index_id` such as `BC01` or `BP3` to its
    /// barcode folder name.
    pub fn resolve(sample_id: &str, index_id: &str) -> Result<Self, PipelineError> {
        let suffix = INDEX_PREFIXES
            .iter()
            .find_map(|prefix| index_id.strip_prefix(*prefix))
            .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| PipelineError::BarcodeResolution {
                sample_id: sample_id.to_string(),
                index_id: index_id.to_string(),
            })?;
        Ok(BarcodeAssignment::Folder(format!("{}{}", BARCODE_FOLDER_PREFIX, suffix)))
    }

    pub fn folder(&self) -> Option<&str> {
        match self {
            BarcodeAssignment::Unbarcoded => None,
            BarcodeAssignment::Folder(folder) => Some(folder),
        }
    }
}

impl fmt::Display for BarcodeAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.folder().unwrap_or(NO_BARCODE))
    }
}
