//! taueff CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tau_yields::DataDrivenNames;

mod input;
mod run;
mod yields;

#[derive(Parser)]
#[command(name = "taueff")]
#[command(about = "taueff - tau identification efficiency from Z->tau tau and Z->mu mu")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify and fill one sample
    Process {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Input ntuple (Parquet)
        #[arg(short, long)]
        input: PathBuf,

        /// Output histogram file (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Run summary (pretty JSON). Defaults to stdout.
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Threads (0 = auto, 1 = sequential). Overrides the config.
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Print the region catalog of a configuration
    Regions {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Ntuple whose columns the channel is resolved against
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a yield table for one region and variable
    Tabulate {
        /// Histogram file of a process, as NAME=PATH (repeatable; equal names are summed)
        #[arg(short, long = "input", required = true)]
        inputs: Vec<String>,

        /// Region path without the systematic, e.g. LooseIso/os/HiMT/bjets0
        #[arg(long)]
        region: String,

        /// Variable whose integral is the yield
        #[arg(long)]
        variable: String,

        /// Shape systematics to take shifts from (comma separated)
        #[arg(long, value_delimiter = ',')]
        shape_sys: Vec<String>,

        /// Replace simulated W+jets with the data-driven estimate and add ABCD QCD
        #[arg(long)]
        data_driven: bool,

        /// Process label of the W+jets simulation
        #[arg(long, default_value = "WJets")]
        wjets: String,

        /// Process labels of the Z simulations subtracted from data (comma separated)
        #[arg(long, value_delimiter = ',', default_value = "Z_tautau")]
        zjets: Vec<String>,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute the tau ID efficiency per object ID
    Efficiency {
        /// Yield table of the mu-mu channel
        #[arg(long)]
        mumu: PathBuf,

        /// Yield table of the mu-tau channel, as ID=PATH (repeatable)
        #[arg(long, required = true)]
        mutau: Vec<String>,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Process { config, input, output, summary, threads } => {
            let s = run::cmd_process(&config, &input, &output, threads)?;
            write_json(summary.as_ref(), serde_json::to_value(&s)?)
        }
        Commands::Regions { config, input, output } => {
            write_json(output.as_ref(), run::cmd_regions(&config, &input)?)
        }
        Commands::Tabulate { inputs, region, variable, shape_sys, data_driven, wjets, zjets, output } => {
            let data_driven =
                data_driven.then(|| DataDrivenNames { wjets, zjets, ..DataDrivenNames::default() });
            let table = yields::cmd_tabulate(&yields::TabulateArgs {
                inputs: &inputs,
                region: &region,
                variable: &variable,
                shape_systematics: &shape_sys,
                data_driven,
            })?;
            write_json(output.as_ref(), serde_json::to_value(&table)?)
        }
        Commands::Efficiency { mumu, mutau, output } => {
            let report = yields::cmd_efficiency(&mumu, &mutau)?;
            write_json(output.as_ref(), serde_json::to_value(&report)?)
        }
    }
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
