//! Configuration file management for weekwise.
//!
//! Provides a TOML-based config file at `~/.config/weekwise/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use weekwise_core::plan::{ComposeOptions, FeedbackPolicy};
use weekwise_core::{BuilderConfig, CommandProvider, GenerationParams, RetryPolicy};

pub const PROVIDER_COMMAND_ENV: &str = "WEEKWISE_PROVIDER_COMMAND";
pub const MAX_RETRIES_ENV: &str = "WEEKWISE_MAX_RETRIES";
pub const TIMEOUT_SECS_ENV: &str = "WEEKWISE_TIMEOUT_SECS";
pub const OUTPUT_DIR_ENV: &str = "WEEKWISE_OUTPUT_DIR";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub provider: ProviderSection,
    pub retry: RetrySection,
    pub output: OutputSection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Program to run. The prompt is written to its stdin.
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["-p".to_string()],
            timeout_secs: 120,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub retry_provider_errors: bool,
    pub include_previous_output: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_provider_errors: true,
            include_previous_output: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/outputs"),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the weekwise config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/weekwise` or
/// `~/.config/weekwise`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("weekwise");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("weekwise")
}

/// Return the path to the weekwise config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // The provider command line may embed API keys.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Split a command line on whitespace into program and arguments.
///
/// No shell quoting is interpreted; use a wrapper script or the config
/// file's `args` list for arguments containing spaces.
pub fn split_command(line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line, which win over everything else.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct WeekwiseConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub params: GenerationParams,
    pub max_retries: u32,
    pub retry_provider_errors: bool,
    pub include_previous_output: bool,
    pub output_dir: PathBuf,
}

impl WeekwiseConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Provider: `WEEKWISE_PROVIDER_COMMAND` (whitespace-split, replaces
    ///   both command and args) > `[provider]` section > `claude -p`
    /// - Retries: `--max-retries` > `WEEKWISE_MAX_RETRIES` > `[retry].max_retries` > 2
    /// - Timeout: `--timeout` > `WEEKWISE_TIMEOUT_SECS` > `[provider].timeout_secs` > 120
    /// - Output dir: `WEEKWISE_OUTPUT_DIR` > `[output].dir` > `data/outputs`
    ///
    /// A missing config file is not an error; a malformed one is.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = if config_path().exists() {
            load_config()?
        } else {
            ConfigFile::default()
        };

        let (command, args) = match std::env::var(PROVIDER_COMMAND_ENV) {
            Ok(line) => match split_command(&line) {
                Some(parts) => parts,
                None => bail!("{PROVIDER_COMMAND_ENV} is set but empty"),
            },
            Err(_) => (file.provider.command, file.provider.args),
        };
        if command.trim().is_empty() {
            bail!("provider command is empty; set [provider].command in {}", config_path().display());
        }

        let max_retries = match cli.max_retries {
            Some(n) => n,
            None => env_number(MAX_RETRIES_ENV)?.unwrap_or(file.retry.max_retries),
        };
        let timeout_secs = match cli.timeout_secs {
            Some(n) => n,
            None => env_number(TIMEOUT_SECS_ENV)?.unwrap_or(file.provider.timeout_secs),
        };
        if timeout_secs == 0 {
            bail!("provider timeout must be at least one second");
        }

        let output_dir = std::env::var_os(OUTPUT_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or(file.output.dir);

        Ok(Self {
            command,
            args,
            timeout: Duration::from_secs(timeout_secs),
            params: GenerationParams {
                temperature: file.provider.temperature,
                max_tokens: file.provider.max_tokens,
            },
            max_retries,
            retry_provider_errors: file.retry.retry_provider_errors,
            include_previous_output: file.retry.include_previous_output,
            output_dir,
        })
    }

    pub fn provider(&self) -> CommandProvider {
        CommandProvider::new(self.command.clone(), self.args.clone()).with_timeout(self.timeout)
    }

    pub fn builder_config(&self, hours_per_week: Option<f64>) -> BuilderConfig {
        BuilderConfig {
            timeout: self.timeout,
            params: self.params,
            compose: ComposeOptions {
                hours_per_week,
                ..ComposeOptions::default()
            },
            retry: RetryPolicy {
                retry_provider_errors: self.retry_provider_errors,
                feedback: FeedbackPolicy {
                    include_previous_output: self.include_previous_output,
                    ..FeedbackPolicy::default()
                },
            },
        }
    }
}

/// Parse a numeric env var. Unset is `None`; set but unparseable is an error.
fn env_number<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(None),
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
