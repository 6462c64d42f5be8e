use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PLATFORM: &str = "OxfordNanopore";
pub const DEFAULT_CONFIG_NAME: &str = "config.toml";

/// Site configuration, loaded once at startup and passed by reference to
/// every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub flowcell: FlowcellConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowcellConfig {
    pub compatible_flowcells: Vec<String>,
    pub compatible_kits: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where the sequencer deposits finished runs.
    pub base_dir: PathBuf,
    /// Staging area where runs are copied and processed.
    pub output_dir: PathBuf,
    /// Root of per-group storage.
    pub group_dir: PathBuf,
    /// Reference genomes, one subdirectory per reference holding `genome.fa`.
    pub genome_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_platform")]
    pub platform: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            platform: default_platform(),
        }
    }
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub basecaller: ToolSpec,
    pub read_qc: ToolSpec,
    pub mapping: ToolSpec,
    pub alignment_qc: Option<ToolSpec>,
    pub contamination: Option<ToolSpec>,
}

/// One external program. `args` may contain `{placeholder}` tokens;
/// `barcoded_args` are appended only for barcoded runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub barcoded_args: Vec<String>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(config_file: P) -> Result<Self> {
        let config_file = config_file.as_ref();
        let mut file = fs::File::open(config_file)
            .with_context(|| format!("opening config file {:?}", config_file))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .with_context(|| format!("reading config file {:?}", config_file))?;
        Self::from_toml(&contents).with_context(|| format!("parsing config file {:?}", config_file))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.flowcell.compatible_flowcells.is_empty() {
            bail!("[flowcell] compatible_flowcells is empty");
        }
        if self.flowcell.compatible_kits.is_empty() {
            bail!("[flowcell] compatible_kits is empty");
        }
        for (name, tool) in self.tools.named() {
            if tool.program.trim().is_empty() {
                bail!("[tools.{}] program is empty", name);
            }
        }
        Ok(())
    }

    pub fn is_compatible_flowcell(&self, flowcell: &str) -> bool {
        self.flowcell.compatible_flowcells.iter().any(|f| f == flowcell)
    }

    pub fn is_compatible_kit(&self, kit: &str) -> bool {
        self.flowcell.compatible_kits.iter().any(|k| k == kit)
    }

    /// Default location: `config.toml` beside the running executable.
    pub fn default_path() -> Result<PathBuf> {
        let exe = std::env::current_exe().context("locating executable")?;
        let dir = exe
            .parent()
            .with_context(|| format!("executable {:?} has no parent directory", exe))?;
        Ok(dir.join(DEFAULT_CONFIG_NAME))
    }
}

impl ToolsConfig {
    pub fn named(&self) -> Vec<(&'static str, &ToolSpec)> {
        let mut tools = vec![
            ("basecaller", &self.basecaller),
            ("read_qc", &self.read_qc),
            ("mapping", &self.mapping),
        ];
        if let Some(tool) = &self.alignment_qc {
            tools.push(("alignment_qc", tool));
        }
        if let Some(tool) = &self.contamination {
            tools.push(("contamination", tool));
        }
        tools
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const EXAMPLE_TOML: &str = r#"
[flowcell]
compatible_flowcells = ["FLO-MIN106", "FLO-PRO002"]
compatible_kits = ["SQK-RNA002", "SQK-LSK109", "SQK-PCS109"]

[paths]
base_dir = "/data/nanopore"
output_dir = "/rapidus/nanopore"
group_dir = "/data/groups"
genome_dir = "/data/genomes"

[tools.basecaller]
program = "guppy_basecaller"
args = ["--input_path", "{fast5}", "--save_path", "{fastq}", "--flowcell", "{flowcell}", "--kit", "{kit}"]
barcoded_args = ["--barcode_kits", "{barcode_kit}"]

[tools.read_qc]
program = "pycoQC"
args = ["-f", "{summary}", "-o", "{outdir}/pycoQC.html"]

[tools.mapping]
program = "minimap2"
args = ["-a", "-x", "splice", "-o", "{bam}", "{reference}", "{fastq}"]
"#;

    /// Configuration rooted in a scratch directory with no-op tools.
    pub(crate) fn scratch_config(root: &Path) -> Config {
        let noop = ToolSpec {
            program: "true".to_string(),
            args: Vec::new(),
            barcoded_args: Vec::new(),
        };
        Config {
            flowcell: FlowcellConfig {
                compatible_flowcells: vec!["FLO-MIN106".to_string()],
                compatible_kits: vec!["SQK-RNA002".to_string(), "SQK-LSK109".to_string()],
            },
            paths: PathsConfig {
                base_dir: root.join("base"),
                output_dir: root.join("staging"),
                group_dir: root.join("groups"),
                genome_dir: root.join("genomes"),
            },
            pipeline: PipelineConfig::default(),
            tools: ToolsConfig {
                basecaller: noop.clone(),
                read_qc: noop.clone(),
                mapping: noop,
                alignment_qc: None,
                contamination: None,
            },
        }
    }

    #[test]
    fn parse_example() {
        let config = Config::from_toml(EXAMPLE_TOML).unwrap();
        assert_eq!(config.pipeline.platform, "OxfordNanopore");
        assert!(config.is_compatible_flowcell("FLO-MIN106"));
        assert!(!config.is_compatible_flowcell("FLO-MIN107"));
        assert!(config.is_compatible_kit("SQK-RNA002"));
        assert_eq!(config.tools.basecaller.barcoded_args.len(), 2);
        assert!(config.tools.alignment_qc.is_none());
        assert_eq!(config.tools.named().len(), 3);
    }

    #[test]
    fn parse_shipped_example() {
        let config = Config::from_toml(include_str!("../../config.toml.example")).unwrap();
        assert_eq!(config.tools.named().len(), 5);
        assert!(config.is_compatible_kit("SQK-PCS109"));
    }

    #[test]
    fn empty_allow_list() {
        let toml = EXAMPLE_TOML.replace(
            r#"compatible_kits = ["SQK-RNA002", "SQK-LSK109", "SQK-PCS109"]"#,
            "compatible_kits = []",
        );
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn missing_tool_section() {
        let toml = EXAMPLE_TOML.replace("[tools.mapping]", "[tools.unused]");
        assert!(Config::from_toml(&toml).is_err());
    }
}
