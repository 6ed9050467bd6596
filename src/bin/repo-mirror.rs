#[macro_use]
extern crate log;

use chrono::Local;
use env_logger::Builder;
use failure::{Error, ResultExt};
use log::LevelFilter;
use repo_mirror::config::{config_path, EXAMPLE_CONFIG};
use repo_mirror::errors::{exit_code, EXIT_FAILURE, EXIT_SUCCESS};
use repo_mirror::{Config, Driver, UpdateFailure};
use std::env;
use std::io::{self, Write};
use std::process;
use structopt::StructOpt;

fn main() {
    let args = Args::from_args();

    if args.example_config {
        print!("{}", EXAMPLE_CONFIG);
        return;
    }

    if let Err(e) = initialize_logging(&args) {
        eprintln!("Error: {}", e);
        process::exit(EXIT_FAILURE);
    }

    // an interrupted run is a clean run, whatever was in flight is simply
    // picked up next time
    if let Err(e) = ctrlc::set_handler(|| process::exit(EXIT_SUCCESS)) {
        warn!("Unable to install the Ctrl-C handler: {}", e);
    }

    let code = match run(&args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            report_error(&e);
            exit_code(&e)
        }
    };

    process::exit(code);
}

fn run(args: &Args) -> Result<(), Error> {
    let cfg = args.config()?;

    if log_enabled!(log::Level::Debug) {
        for line in format!("{:#?}", cfg).lines() {
            debug!("{}", line);
        }
    }

    let driver = Driver::with_config(cfg);

    if args.dry_run {
        return driver.dry_run();
    }

    let report = driver.run()?;
    info!(
        "Finished, {} cloned and {} updated",
        report.cloned, report.updated
    );

    Ok(())
}

fn report_error(e: &Error) {
    if let Some(update_failure) = e.downcast_ref::<UpdateFailure>() {
        let mut stderr = io::stderr();
        if update_failure.display(&mut stderr).is_ok() {
            return;
        }
    }

    error!("{}", e);
    for cause in e.iter_causes() {
        error!("\tCaused By: {}", cause);
    }
}

#[derive(Debug, Clone, PartialEq, StructOpt)]
#[structopt(about = "Mirror your GitLab and GitHub repositories as bare clones.")]
struct Args {
    #[structopt(
        short = "c",
        long = "config",
        default_value = "~/.repo-mirror.toml",
        help = "The configuration file to use."
    )]
    config_file: String,
    #[structopt(
        short = "v",
        long = "verbose",
        parse(from_occurrences),
        help = "Verbose output (repeat for more verbosity)"
    )]
    verbosity: u64,
    #[structopt(short = "q", long = "quiet", help = "Only print warnings and errors")]
    quiet: bool,
    #[structopt(
        long = "dry-run",
        help = "List what would be cloned or updated without touching anything"
    )]
    dry_run: bool,
    #[structopt(
        long = "example-config",
        help = "Generate an example config and immediately exit."
    )]
    example_config: bool,
}

impl Args {
    pub fn config(&self) -> Result<Config, Error> {
        let config_file = config_path(&self.config_file)?;

        Config::from_file(&config_file)
            .context("Couldn't load the config")
            .map_err(Into::into)
    }
}

fn initialize_logging(args: &Args) -> Result<(), Error> {
    let mut builder = Builder::new();

    let level = if args.quiet {
        LevelFilter::Warn
    } else {
        match args.verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    builder
        .filter(None, LevelFilter::Warn)
        .filter(Some("repo_mirror"), level);

    if let Ok(filter) = env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    }

    builder.format(|out, record| match record.line() {
        Some(line) => writeln!(
            out,
            "{} [{:5}] ({}#{}): {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            line,
            record.args()
        ),
        None => writeln!(
            out,
            "{} [{:5}] ({}): {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        ),
    });

    builder.try_init()?;

    Ok(())
}
