use super::*;

mod optimize;
pub use optimize::*;

mod inspect;
pub use inspect::*;

mod aggregate;
pub use aggregate::*;

/// All CLI commands available in this binary.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Optimize the switch settings of a problem. Ctrl-C stops early and keeps the best result.
    #[command(alias = "o")]
    Optimize(Optimize),

    /// Print the topology of the initial switch settings.
    #[command(alias = "i")]
    Inspect(Inspect),

    /// Print how much the network shrinks under aggregation.
    #[command(alias = "a")]
    Aggregate(Aggregate),
}

#[derive(clap::Args, Debug)]
pub struct Optimize {
    /// Path to the JSON file containing the problem.
    path: PathBuf,
    /// Print the results as JSON (Hint: redirect stdout)
    #[arg(short, long, default_value_t = false)]
    json: bool,
    /// Time limit in seconds.
    #[arg(short, long)]
    time_limit: Option<f64>,
    /// Limit on search iterations.
    #[arg(long)]
    max_iterations: Option<u64>,
    /// Seed of the random number generator.
    #[arg(short, long)]
    seed: Option<u64>,
    /// Search on the full network instead of the aggregated one.
    #[arg(long, default_value_t = false)]
    no_aggregate: bool,
    /// Stop once the verified objective is this close to zero.
    #[arg(short, long)]
    gap: Option<f64>,
    /// Use iterated descent with this many kicks.
    #[arg(short, long)]
    kicks: Option<usize>,
    /// Cost of one switching operation, in kWh of losses.
    #[arg(long)]
    switching_cost: Option<f64>,
    /// Verify with disaggregated search flows instead of recomputing them.
    #[arg(long, default_value_t = false)]
    reuse_flows: bool,
}

#[derive(clap::Args, Debug)]
pub struct Inspect {
    /// Path to the JSON file containing the problem.
    path: PathBuf,
    /// Print the results as JSON (Hint: redirect stdout)
    #[arg(short, long, default_value_t = false)]
    json: bool,
}

#[derive(clap::Args, Debug)]
pub struct Aggregate {
    /// Path to the JSON file containing the problem.
    path: PathBuf,
    /// Print the results as JSON (Hint: redirect stdout)
    #[arg(short, long, default_value_t = false)]
    json: bool,
    /// List every merged line.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Command {
    pub fn run(self) {
        match self {
            Command::Optimize(args) => args.run(),
            Command::Inspect(args) => args.run(),
            Command::Aggregate(args) => args.run(),
        }
    }
}

fn read_problem<P: AsRef<Path>>(path: P) -> ProblemFile {
    match read_problem_from_file(path) {
        Ok(x) => x,
        Err(err) => fatal_error!(1, "Cannot read problem: {}", err),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(err) => fatal_error!(1, "Cannot serialize the result: {}", err),
    }
}

fn join_names(names: &[String]) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}
