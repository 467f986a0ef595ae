//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::dataset::{load_records, SweBenchFetcher};
use crate::episode::{EpisodeController, RandomPicker};
use crate::sandbox::{BindMount, SandboxConfig};
use crate::session::{SessionConfig, ToolSpec, TOOLS_MOUNT};

/// Sandboxed SWE episodes with patch-distance rewards.
#[derive(Parser)]
#[command(name = "swe-env")]
#[command(about = "Drive agent shell episodes in a sandbox and score diffs against reference patches")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Fetch SWE-bench records into a local JSONL file.
    Fetch(FetchArgs),

    /// Run an interactive episode: one shell command per stdin line,
    /// observation/score/done printed per step.
    Run(RunArgs),
}

/// Arguments for `swe-env fetch`.
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// HuggingFace dataset name.
    #[arg(long, default_value = "princeton-nlp/SWE-bench_Lite")]
    pub dataset: String,

    /// Dataset split.
    #[arg(long, default_value = "test")]
    pub split: String,

    /// Number of records to fetch.
    #[arg(short = 'n', long, default_value = "25")]
    pub limit: usize,

    /// Starting offset in the split.
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Output JSONL path.
    #[arg(short, long, default_value = "records.jsonl")]
    pub output: PathBuf,
}

/// Arguments for `swe-env run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// JSONL file of project records.
    #[arg(short, long)]
    pub records: PathBuf,

    /// Sandbox image (.sif file).
    #[arg(short, long)]
    pub image: PathBuf,

    /// Container runtime binary.
    #[arg(long, default_value = "apptainer")]
    pub runtime: String,

    /// Host directory of agent tools to bind into the sandbox.
    #[arg(long)]
    pub tools_dir: Option<PathBuf>,

    /// Tool name under the tools directory to install during bootstrap.
    /// Repeatable.
    #[arg(long = "tool")]
    pub tools: Vec<String>,

    /// Seed for reproducible project selection.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Maximum number of steps before giving up on the episode.
    #[arg(long, default_value = "50")]
    pub max_steps: usize,

    /// Per-command timeout in seconds. Waits forever when unset.
    #[arg(long)]
    pub command_timeout: Option<u64>,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Dispatches the parsed CLI to its handler.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Fetch(args) => fetch(args).await,
        Commands::Run(args) => run_episode(args).await,
    }
}

async fn fetch(args: FetchArgs) -> anyhow::Result<()> {
    let fetcher = SweBenchFetcher::with_dataset(args.dataset.as_str(), args.split.as_str());
    let records = fetcher.fetch(args.limit, args.offset).await?;
    anyhow::ensure!(!records.is_empty(), "no records returned for {}", args.dataset);

    let mut lines = Vec::with_capacity(records.len());
    for record in &records {
        lines.push(serde_json::to_string(record)?);
    }
    std::fs::write(&args.output, lines.join("\n") + "\n")?;

    info!(
        count = records.len(),
        path = %args.output.display(),
        "Wrote records"
    );
    Ok(())
}

async fn run_episode(args: RunArgs) -> anyhow::Result<()> {
    let records = load_records(&args.records)?;
    anyhow::ensure!(
        !records.is_empty(),
        "no records in {}",
        args.records.display()
    );

    let mut sandbox_config = SandboxConfig::new(&args.image).with_runtime(args.runtime.as_str());
    if let Some(dir) = &args.tools_dir {
        sandbox_config = sandbox_config.with_bind(BindMount::new(dir, TOOLS_MOUNT));
    }

    let mut session_config = SessionConfig::default();
    if let Some(secs) = args.command_timeout {
        session_config = session_config.with_command_timeout(Duration::from_secs(secs));
    }

    let picker = match args.seed {
        Some(seed) => RandomPicker::seeded(seed),
        None => RandomPicker::new(),
    };

    let mut controller = EpisodeController::new(records, sandbox_config)
        .with_tools(args.tools.iter().map(|name| ToolSpec::new(name.as_str())).collect())
        .with_session_config(session_config)
        .with_picker(Box::new(picker));

    controller.reset().await?;
    if let Some(project) = controller.current_project() {
        println!("# project: {}", project.name());
        println!("{}", project.problem_statement);
        if !project.hint.is_empty() {
            println!("hint: {}", project.hint);
        }
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut steps = 0usize;
    let result = loop {
        if steps >= args.max_steps {
            println!("step limit reached");
            break Ok(());
        }
        let Some(command) = stdin.next_line().await? else {
            break Ok(());
        };
        if command.trim().is_empty() {
            continue;
        }

        match controller.step(&command).await {
            Ok(outcome) => {
                steps += 1;
                print!("{}", outcome.output);
                println!("score: {:.3}  done: {}", outcome.score, outcome.done);
                if outcome.done {
                    println!("episode complete in {} steps", steps);
                    break Ok(());
                }
            }
            Err(e) => break Err(e.into()),
        }
    };

    controller.close().await;
    result
}
