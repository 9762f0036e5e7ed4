use clap::{Parser, Subcommand};
use gitguard::config::ConfigError;
use gitguard::{
    Checkpoint, Config, ConfirmationPolicy, Confirmer, ExecutionRecord, GitVersion, Guard,
    GuardError, Outcome, Plan, Repository, RestoreResult,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when a plan stopped at a failing command
const EXIT_PARTIAL_FAILURE: u8 = 3;
/// Exit status when the user declined a plan
const EXIT_ABORTED: u8 = 4;

#[derive(Parser)]
#[command(name = "gitguard", version, about = "Checkpointed, risk-gated execution of git plans")]
struct Cli {
    /// Repository to operate on (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    repo: Option<PathBuf>,

    /// Debug-level diagnostics on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Checkpoint the repository, then execute a JSON plan
    Run {
        /// Plan file; read from stdin when omitted
        #[arg(long)]
        plan: Option<PathBuf>,
    },
    /// Restore the most recent checkpoint
    Rollback {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Restore a specific checkpoint
    Restore { id: String },
    /// Take a checkpoint without running anything
    Checkpoint,
    /// List checkpoints, most recent first
    List,
    /// Show executed plans, most recent first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the effective configuration
    #[command(name = "config")]
    Settings {
        /// Write the default config file if none exists yet
        #[arg(long)]
        init: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode, GuardError> {
    if let Command::Settings { init } = cli.command {
        return show_config(init);
    }

    let version = GitVersion::validate()?;
    tracing::debug!(%version, "git version");

    let repo = match &cli.repo {
        Some(path) => Repository::discover_from(path)?,
        None => Repository::discover()?,
    };
    let config = Config::load_or_default()?;
    let guard = Guard::open(repo, &config)?;

    match cli.command {
        Command::Run { plan } => run_plan(&guard, plan),
        Command::Rollback { yes } => rollback(&guard, yes),
        Command::Restore { id } => {
            print_restore(&guard.restore(&id)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Checkpoint => {
            let checkpoint = guard.checkpoint()?;
            println!("Created checkpoint {}", describe(&checkpoint));
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            let checkpoints = guard.list_checkpoints()?;
            if checkpoints.is_empty() {
                println!("No checkpoints.");
            }
            for checkpoint in &checkpoints {
                println!("{}", describe(checkpoint));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Settings { init } => show_config(init),
        Command::History { limit } => {
            let history = guard.history()?;
            if history.is_empty() {
                println!("No plans executed yet.");
            }
            for record in history.iter().take(limit) {
                print_record(record);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn show_config(init: bool) -> Result<ExitCode, GuardError> {
    let path = Config::config_path()?;

    if init {
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            Config::default_config().save()?;
            println!("Wrote default config to {}", path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load_or_default()?;
    let rendered = toml::to_string_pretty(&config).map_err(ConfigError::from)?;
    println!("# {}", path.display());
    print!("{}", rendered);
    Ok(ExitCode::SUCCESS)
}

fn run_plan(guard: &Guard, plan_path: Option<PathBuf>) -> Result<ExitCode, GuardError> {
    let (json, mut confirmer) = match plan_path {
        Some(path) => (
            std::fs::read_to_string(path)?,
            TerminalConfirmer::new(Box::new(BufReader::new(io::stdin()))),
        ),
        None => {
            let mut json = String::new();
            io::stdin().read_to_string(&mut json)?;
            // stdin carried the plan; answers have to come from the terminal
            let tty: Box<dyn BufRead> = match File::open("/dev/tty") {
                Ok(tty) => Box::new(BufReader::new(tty)),
                Err(e) => {
                    tracing::debug!(error = %e, "no terminal for confirmation");
                    Box::new(io::empty())
                }
            };
            (json, TerminalConfirmer::new(tty))
        }
    };

    let plan = guard.parse_plan(&json)?;
    let record = guard.run(&plan, &mut confirmer)?;
    print_record(&record);

    Ok(match record.outcome {
        Outcome::Success => ExitCode::SUCCESS,
        Outcome::PartialFailure => {
            eprintln!("Undo with: gitguard rollback");
            ExitCode::from(EXIT_PARTIAL_FAILURE)
        }
        Outcome::AbortedByUser => ExitCode::from(EXIT_ABORTED),
    })
}

fn rollback(guard: &Guard, yes: bool) -> Result<ExitCode, GuardError> {
    if yes {
        print_restore(&guard.rollback()?);
        return Ok(ExitCode::SUCCESS);
    }

    let target = guard.rollback_target()?.ok_or(GuardError::NothingToRollBack)?;

    eprint!("Restore checkpoint {}? [y/N] ", describe(&target));
    io::stderr().flush()?;
    let answer = read_answer(&mut BufReader::new(io::stdin()))?;
    if !ConfirmationPolicy::YesNo.accepts(answer.as_deref()) {
        println!("Rollback cancelled.");
        return Ok(ExitCode::from(EXIT_ABORTED));
    }

    // Restore exactly what was shown, even if a checkpoint was added meanwhile
    print_restore(&guard.restore(&target.id)?);
    Ok(ExitCode::SUCCESS)
}

/// Prompts on stderr and reads one answer line
struct TerminalConfirmer {
    input: Box<dyn BufRead>,
}

impl TerminalConfirmer {
    fn new(input: Box<dyn BufRead>) -> Self {
        Self { input }
    }
}

impl Confirmer for TerminalConfirmer {
    fn confirm(&mut self, plan: &Plan, policy: ConfirmationPolicy) -> io::Result<Option<String>> {
        let mut err = io::stderr();
        writeln!(err, "Plan: {}", plan.summary())?;
        writeln!(err, "Risk: {}", plan.risk_level())?;
        for command in plan.commands() {
            writeln!(err, "  $ {}", command.text())?;
        }
        write!(err, "Proceed? {} ", policy.hint())?;
        err.flush()?;

        read_answer(&mut self.input)
    }
}

fn read_answer(input: &mut dyn BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn describe(checkpoint: &Checkpoint) -> String {
    let short = checkpoint.commit.get(..7).unwrap_or(&checkpoint.commit);
    let mut line = format!("{}  {}", checkpoint.id, short);
    if let Some(branch) = &checkpoint.branch {
        line.push_str(&format!("  ({})", branch));
    }
    if checkpoint.snapshot.is_some() {
        line.push_str("  +uncommitted");
    }
    line
}

fn print_record(record: &ExecutionRecord) {
    println!(
        "[{}] {} {:?}: {}",
        record.finished_at.format("%Y-%m-%d %H:%M:%S"),
        record.risk_level,
        record.outcome,
        record.plan_summary
    );
    if let Some(id) = &record.checkpoint_id {
        println!("  checkpoint: {}", id);
    }
    for command in &record.commands {
        println!("  [exit:{}] {}", command.exit_code, command.command);
    }
    if let Some(failure) = &record.failure {
        if failure.timed_out {
            println!("  timed out: {}", failure.command);
        }
        if !failure.stderr.is_empty() {
            println!("  {}", failure.stderr);
        }
    }
}

fn print_restore(result: &RestoreResult) {
    println!("Restored checkpoint {}", result.checkpoint_id);
    match &result.branch {
        Some(branch) => println!("  HEAD: {} ({})", result.head, branch),
        None => println!("  HEAD: {} (detached)", result.head),
    }
    if !result.head_moved {
        println!("  HEAD did not move");
    }
    if result.snapshot_reapplied {
        println!("  uncommitted changes reapplied");
    }
    for path in &result.files_touched {
        println!("  touched: {}", path);
    }
}
