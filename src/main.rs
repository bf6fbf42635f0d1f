// Standard library imports
use std::{
    io::{self, BufRead, IsTerminal, Write},
    sync::Arc,
    time::Duration,
};

// External crate imports
use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use milvus_cli::{
    config::{CliConfig, DEFAULT_ALIAS, DEFAULT_HOST, DEFAULT_PORT},
    csv_io::{SilentProgress, StderrProgress},
    types, Outcome, Session,
};

const PROMPT: &str = "milvus_cli > ";

// --- Command Line Arguments ---

/// Interactive command-line client for Milvus.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Default Milvus host for `connect`.
    #[arg(long, env = "MILVUS_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Default Milvus port for `connect`.
    #[arg(long, env = "MILVUS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Alias used when `connect` is given none.
    #[arg(long, env = "MILVUS_ALIAS", default_value = DEFAULT_ALIAS)]
    alias: String,

    /// Bearer token (`user:password` or an API key) sent with every request.
    #[arg(long, env = "MILVUS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Seconds allowed for fetching a remote CSV file.
    #[arg(long, env = "MILVUS_CLI_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Seconds allowed for a REST request without an explicit timeout.
    #[arg(long, default_value_t = 60)]
    request_timeout: u64,

    /// Enable debug logging. By default, only errors are logged unless RUST_LOG is set.
    #[arg(long)]
    debug: bool,

    /// Run this single command instead of the interactive shell.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Args {
    fn config(&self) -> CliConfig {
        CliConfig {
            host: self.host.clone(),
            port: self.port,
            alias: self.alias.clone(),
            token: self.token.clone().filter(|t| !t.is_empty()),
            fetch_timeout: Duration::from_secs(self.fetch_timeout),
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }
}

/// Initializes the tracing subscriber for logging.
fn initialize_logging(debug_enabled: bool) -> Result<()> {
    // Default level is OFF, unless --debug is passed (then DEBUG).
    // RUST_LOG environment variable overrides the default.
    let default_level = if debug_enabled { "debug" } else { "off" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("setting default subscriber failed: {}", e))
}

/// Quotes a token so the shell tokenizer reads it back unchanged.
fn requote(token: &str) -> String {
    if !token.is_empty() && !token.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        token.to_string()
    } else if token.contains('"') {
        format!("'{}'", token)
    } else {
        format!("\"{}\"", token)
    }
}

fn print_outcome(outcome: Outcome) -> bool {
    match outcome {
        Outcome::Output(text) => {
            if !text.is_empty() {
                println!("{}", text);
            }
            true
        }
        Outcome::Clear => {
            print!("\x1B[2J\x1B[1;1H");
            let _ = io::stdout().flush();
            true
        }
        Outcome::Exit => false,
    }
}

/// Reads commands from stdin until EOF or `exit`. Returns the number of failed commands.
async fn run_shell(session: &mut Session, interactive: bool) -> Result<usize> {
    let stdin = io::stdin();
    let mut failures = 0usize;
    let mut line = String::new();
    loop {
        if interactive {
            print!("{}", PROMPT);
            io::stdout().flush()?;
        }
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match session.run_line(line.trim()).await {
            Ok(outcome) => {
                if !print_outcome(outcome) {
                    break;
                }
            }
            Err(e) => {
                failures += 1;
                debug!("Command failed ({:?}): {:?}", e.kind(), e);
                eprintln!("Error! {}", e);
            }
        }
    }
    Ok(failures)
}

fn confirm_on_stdin(prompt: &str) -> bool {
    eprint!("{} Do you want to continue? [y/N]: ", prompt);
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    initialize_logging(args.debug)?;

    types::check_vocabulary().map_err(|e| anyhow!("vocabulary tables are inconsistent: {}", e))?;

    let interactive = args.command.is_empty() && io::stdin().is_terminal();
    let mut session = Session::new(args.config());
    if interactive {
        session = session
            .with_progress(Arc::new(StderrProgress))
            .with_confirm(Box::new(confirm_on_stdin));
    } else {
        session = session.with_progress(Arc::new(SilentProgress));
    }

    if !args.command.is_empty() {
        let line: Vec<String> = args.command.iter().map(|t| requote(t)).collect();
        info!("Running one-shot command: {}", line.join(" "));
        return match session.run_line(&line.join(" ")).await {
            Ok(outcome) => {
                print_outcome(outcome);
                Ok(())
            }
            Err(e) => {
                error!("Command failed: {:?}", e);
                eprintln!("Error! {}", e);
                std::process::exit(1);
            }
        };
    }

    if interactive {
        println!("Milvus Cli v{}. Type `help` for the command list.", env!("CARGO_PKG_VERSION"));
    }
    let failures = run_shell(&mut session, interactive).await?;
    if !interactive && failures > 0 {
        error!("{} command(s) failed", failures);
        std::process::exit(1);
    }
    Ok(())
}
