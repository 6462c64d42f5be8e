use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use nanopore_pipeline::collaborators::ExternalTools;
use nanopore_pipeline::config::Config;
use nanopore_pipeline::errors;
use nanopore_pipeline::logging::init_log;
use nanopore_pipeline::pipeline::{run_pipeline, Protocol, RunArgs};

#[derive(Debug)]
struct CLI {
    input: PathBuf,
    reference: String,
    protocol: Protocol,
    config_file: Option<PathBuf>,
}

impl CLI {
    fn new(matches: &ArgMatches) -> Result<Self> {
        Ok(CLI {
            input: PathBuf::from(required(matches, "input")?),
            reference: required(matches, "ref")?,
            protocol: required(matches, "protocol")?.parse()?,
            config_file: matches.get_one::<String>("config").map(PathBuf::from),
        })
    }

    fn run(&self) -> Result<()> {
        let config_file = match &self.config_file {
            Some(config_file) => config_file.clone(),
            None => Config::default_path()?,
        };
        let config = Config::from_file(&config_file)?;
        log::debug!("configuration from {:?}", config_file);

        let args = RunArgs {
            input: self.input.clone(),
            reference: self.reference.clone(),
            protocol: self.protocol,
        };
        let summary = run_pipeline(&config, &ExternalTools::new(&config), &args)?;

        for group_run_dir in summary.delivered.iter() {
            log::info!("delivered to {:?}", group_run_dir);
        }
        Ok(())
    }
}

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing argument {}", name))
}

fn main() {
    let matches = Command::new("np-pipeline")
        .version("1.0")
        .about("Stage, base call, demultiplex and deliver a nanopore run")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("RUN_DIR")
                .help("Run directory as deposited by the sequencer")
                .required(true),
        )
        .arg(
            Arg::new("ref")
                .short('r')
                .long("ref")
                .value_name("REFERENCE")
                .help("Reference genome name under the genome directory")
                .required(true),
        )
        .arg(
            Arg::new("protocol")
                .short('p')
                .long("protocol")
                .value_name("PROTOCOL")
                .help("Sequencing protocol")
                .value_parser(Protocol::NAMES)
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("CONFIG.TOML")
                .help("Site configuration, by default config.toml beside the executable"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_log(matches.get_flag("verbose"));

    match CLI::new(&matches).and_then(|cli| cli.run()) {
        Ok(_) => (),
        Err(err) => {
            log::error!("{:#}", err);
            std::process::exit(errors::exit_code(&err));
        }
    }
}
