#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use enet_gram::batch_weight;
use enet_gram::problem::{Problem, ProblemError};

#[derive(Parser)]
#[command(
    name = "enet-gram",
    about = "Elastic-net and ridge solvers over precomputed Gram matrices",
    long_about = "Solves batches of sparse-coding regressions described in a TOML problem \
                 file, by Cholesky for pure ridge and by coordinate descent otherwise."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve the regression batch described in a TOML problem file
    #[command(about = "Solve a regression batch (outputs: solution TOML)")]
    Solve {
        /// Path to the problem file
        #[arg(value_name = "PROBLEM_PATH")]
        problem: PathBuf,

        /// Write the solution here instead of standard output
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Weight of the newest mini-batch in an online running average
    #[command(about = "Compute the mini-batch blending weight")]
    BatchWeight {
        /// Number of samples seen so far, including the current batch
        #[arg(long)]
        count: usize,

        /// Number of samples in the current batch
        #[arg(long)]
        batch_size: usize,

        /// Decay exponent of the per-sample weights
        #[arg(long, default_value = "1.0")]
        learning_rate: f64,

        /// Delay before the decay sets in
        #[arg(long, default_value = "0.0")]
        offset: f64,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let Cli { command } = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = match command {
        Some(Commands::Solve { problem, output }) => {
            run_solve(problem, output).map_err(Into::into)
        }
        Some(Commands::BatchWeight {
            count,
            batch_size,
            learning_rate,
            offset,
        }) => batch_weight(count, batch_size, learning_rate, offset)
            .map(|weight| println!("{weight}"))
            .map_err(Into::into),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_solve(problem_path: PathBuf, output: Option<PathBuf>) -> Result<(), ProblemError> {
    log::info!("Loading problem from {}", problem_path.display());
    let problem = Problem::load(&problem_path)?;
    let solution = problem.solve()?;

    match output {
        Some(path) => {
            solution.save(&path)?;
            println!("Solution saved to: {}", path.display());
        }
        None => print!("{}", solution.to_toml_string()?),
    }
    Ok(())
}
