pub mod barcode;
pub mod collaborators;
pub mod config;
pub mod deliver;
pub mod demux;
pub mod errors;
pub mod flowcell;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod run;
pub mod samplesheet;
pub mod tree;
