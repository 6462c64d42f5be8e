use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

use nanopore_pipeline::config::Config;
use nanopore_pipeline::demux::SampleTable;
use nanopore_pipeline::errors;
use nanopore_pipeline::flowcell::read_flowcell_info;
use nanopore_pipeline::layout::{group_name, OutputLayout};
use nanopore_pipeline::logging::init_log;
use nanopore_pipeline::run::StagedRun;
use nanopore_pipeline::samplesheet::read_samplesheet;

#[derive(Debug)]
struct CLI {
    input: PathBuf,
    config_file: Option<PathBuf>,
}

impl CLI {
    fn new(matches: &ArgMatches) -> Result<Self> {
        let input = matches
            .get_one::<String>("input")
            .context("missing argument input")?;
        Ok(CLI {
            input: PathBuf::from(input),
            config_file: matches.get_one::<String>("config").map(PathBuf::from),
        })
    }

    fn run(&self) -> Result<()> {
        let config_file = match &self.config_file {
            Some(config_file) => config_file.clone(),
            None => Config::default_path()?,
        };
        let config = Config::from_file(&config_file)?;

        let staged = StagedRun::open(&self.input)?;
        let run = read_flowcell_info(&config, staged)?;
        let sheet = read_samplesheet(&run)?;
        let layout = OutputLayout::new(&config, &run);
        let table = SampleTable::normalize(&layout, &sheet)?;

        let mut out = BufWriter::new(io::stdout());
        for sample in table.samples() {
            let record = sample.record();
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}",
                record.sample_id(),
                record.sample_name(),
                record.project(),
                sample.barcode(),
                group_name(record.project()).unwrap_or_else(|| "-".to_string())
            )?;
        }
        out.flush()?;
        Ok(())
    }
}

fn main() {
    let matches = Command::new("np-check")
        .version("1.0")
        .about("Check a staged nanopore run and print its sample plan")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("RUN_DIR")
                .help("Staged run directory")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("CONFIG.TOML")
                .help("Site configuration, by default config.toml beside the executable"),
        )
        .get_matches();

    init_log(false);

    match CLI::new(&matches).and_then(|cli| cli.run()) {
        Ok(_) => (),
        Err(err) => {
            log::error!("{:#}", err);
            std::process::exit(errors::exit_code(&err));
        }
    }
}
