use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use weld::{Config, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "weld", version, about = "Merge two script modules into one HTML page")]
struct Cli {
    /// Project root; source and output paths resolve against it
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Configuration file (defaults to <root>/weld.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = Config::load(&cli.root, cli.config.as_deref())
        .with_context(|| format!("failed to load configuration for {}", cli.root.display()))?;
    let report = Pipeline::new(&config, &cli.root)
        .run()
        .with_context(|| format!("build failed in {}", cli.root.display()))?;

    #[allow(clippy::print_stdout)]
    {
        println!("{report}");
    }
    Ok(())
}
