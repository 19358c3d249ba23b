//! Agon - Application Entry Point

use agon_common::AgonError;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use agon::{
    commands::{
        log::{self, LogOrder, LogQuery},
        run::{self, RunOptions},
    },
    config::ContestConfig,
    constants::DEFAULT_LOG_FILTER,
};

#[derive(Parser, Debug)]
#[command(name = "agon", version, about = "Benchmark harness for optimization contests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the solution and run it over a test set
    Run(RunArgs),
    /// Inspect the score history
    Log(LogArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Test set to run (defaults to DefaultSet)
    #[arg(short, long)]
    set: Option<String>,
    /// Print only "GM AM cases errors"
    #[arg(short, long)]
    quiet: bool,
    /// Only run cases whose parameters match, e.g. "N >= 50 && M < 10"
    #[arg(short, long)]
    filter: Option<String>,
    /// Run every case this many times, keeping the best score
    #[arg(short = 'l', long = "loop", default_value_t = 1)]
    repetitions: usize,
    /// Run a single case and show its rank
    #[arg(short, long)]
    target: Option<usize>,
    /// Record the run in the history under this comment
    #[arg(short = 'w', long = "write", default_value = "")]
    comment: String,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
struct LogArgs {
    #[command(subcommand)]
    action: Option<LogAction>,
    /// History number or `best`; lists recent entries when omitted
    id: Option<String>,
    #[command(flatten)]
    query: QueryArgs,
}

#[derive(Args, Debug, Clone)]
struct QueryArgs {
    #[arg(short, long)]
    set: Option<String>,
    /// Sort by rank or ratio
    #[arg(short, long, value_enum)]
    order: Option<LogOrder>,
    #[arg(short, long)]
    filter: Option<String>,
    /// Number of rows to show
    #[arg(short, long)]
    count: Option<usize>,
}

impl From<QueryArgs> for LogQuery {
    fn from(args: QueryArgs) -> Self {
        LogQuery {
            set: args.set,
            order: args.order,
            filter: args.filter,
            count: args.count,
        }
    }
}

#[derive(Subcommand, Debug)]
enum LogAction {
    /// Compare two history entries (the last two by default)
    Diff {
        from: Option<u64>,
        to: Option<u64>,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Move the run and history logs aside
    Clear {
        #[arg(short, long)]
        set: Option<String>,
    },
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = ContestConfig::load().map_err(AgonError::from)?;

    match cli.command {
        Command::Run(args) => {
            let opts = RunOptions {
                set: args.set,
                quiet: args.quiet,
                filter: args.filter,
                repetitions: args.repetitions,
                target: args.target,
                comment: args.comment,
                json: args.json,
            };
            run::execute(&config, &opts).await
        }
        Command::Log(args) => {
            let text = match (args.action, args.id) {
                (Some(LogAction::Diff { from, to, query }), _) => log::diff(&config, &query.into(), from, to)?,
                (Some(LogAction::Clear { set }), _) => {
                    let rotated = log::clear(&config, set.as_deref())?;
                    if rotated.is_empty() {
                        "Nothing to clear\n".to_string()
                    } else {
                        rotated
                            .iter()
                            .map(|path| format!("Moved to {}\n", path.display()))
                            .collect()
                    }
                }
                (None, Some(id)) => log::show(&config, &args.query.into(), &id)?,
                (None, None) => log::list(&config, &args.query.into())?,
            };
            print!("{}", text);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout is reserved for results
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        match e.downcast_ref::<AgonError>() {
            Some(agon) if agon.is_fatal() => tracing::error!("Aborted before any task ran: {}", agon),
            _ => tracing::error!("{:#}", e),
        }
        return Err(e);
    }
    Ok(())
}
