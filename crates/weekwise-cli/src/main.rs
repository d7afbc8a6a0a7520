mod config;
mod export_cmd;
mod generate_cmd;
mod output;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use weekwise_core::plan::{ComposeOptions, ValidationError, compose_with};
use weekwise_core::{BuildError, ErrorKind, PlanError};

use config::CliOverrides;
use generate_cmd::PlanRequest;
use output::OutputPaths;

#[derive(Parser)]
#[command(name = "weekwise", about = "Turn a project description into a week-by-week plan")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a weekwise config file
    Init {
        /// Provider command line, split on whitespace (e.g. "llm -m gemini-1.5-flash")
        #[arg(long)]
        command: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Generate a plan with the configured provider and export it
    Generate {
        #[command(flatten)]
        request: PlanRequest,
        /// Retries after the first attempt (overrides WEEKWISE_MAX_RETRIES)
        #[arg(long)]
        max_retries: Option<u32>,
        /// Per-call provider timeout in seconds (overrides WEEKWISE_TIMEOUT_SECS)
        #[arg(long)]
        timeout: Option<u64>,
        #[command(flatten)]
        outputs: OutputPaths,
    },
    /// Print the prompt that would be sent to the provider
    Prompt {
        #[command(flatten)]
        request: PlanRequest,
    },
    /// Validate a saved plan JSON file and export it again
    Export {
        /// Path to a plan JSON file
        #[arg(long)]
        plan: PathBuf,
        #[command(flatten)]
        outputs: OutputPaths,
    },
}

/// Execute the `weekwise init` command: write config file.
fn cmd_init(command: Option<&str>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mut cfg = config::ConfigFile::default();
    if let Some(line) = command {
        let Some((program, args)) = config::split_command(line) else {
            anyhow::bail!("--command must not be empty");
        };
        cfg.provider.command = program;
        cfg.provider.args = args;
    }

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!(
        "  provider.command = {} {}",
        cfg.provider.command,
        cfg.provider.args.join(" ")
    );
    println!("  output.dir = {}", cfg.output.dir.display());
    println!();
    println!("Next: run `weekwise generate --description \"...\" --weeks N`.");

    Ok(())
}

/// Execute the `weekwise prompt` command: print the composed prompt.
fn cmd_prompt(request: &PlanRequest) -> anyhow::Result<()> {
    let description = request.description()?;
    let options = ComposeOptions {
        hours_per_week: request.hours_per_week,
        ..ComposeOptions::default()
    };
    let prompt = compose_with(&description, request.start_date(), request.weeks, &options)?;
    print!("{prompt}");
    Ok(())
}

/// Map a failure to the process exit code.
///
/// 2: invalid input (including an invalid saved plan), 3: provider
/// unavailable, 4: retries exhausted, 1: anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(build) = cause.downcast_ref::<BuildError>() {
            return match build.kind() {
                ErrorKind::ProviderUnavailable => 3,
                ErrorKind::ExhaustedRetries => 4,
                _ => 2,
            };
        }
        if cause.is::<PlanError>() || cause.is::<ValidationError>() {
            return 2;
        }
    }
    1
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init { command, force } => cmd_init(command.as_deref(), force),
        Commands::Generate {
            request,
            max_retries,
            timeout,
            outputs,
        } => {
            let overrides = CliOverrides {
                max_retries,
                timeout_secs: timeout,
            };
            generate_cmd::run_generate(&request, &overrides, outputs).await
        }
        Commands::Prompt { request } => cmd_prompt(&request),
        Commands::Export { plan, outputs } => export_cmd::run_export(&plan, outputs),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so `weekwise prompt` output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
