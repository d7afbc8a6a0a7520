//! Subprocess provider.
//!
//! Runs a configured command (e.g. `claude -p`, `llm -m gemini-1.5-flash`),
//! writes the prompt to its stdin, and returns whatever it prints on stdout.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::debug;

use super::trait_def::{GenerationParams, PlanProvider, ProviderError};

/// Environment variable carrying [`GenerationParams::temperature`].
pub const TEMPERATURE_ENV: &str = "WEEKWISE_TEMPERATURE";
/// Environment variable carrying [`GenerationParams::max_tokens`].
pub const MAX_TOKENS_ENV: &str = "WEEKWISE_MAX_TOKENS";

/// Provider backed by an external command-line model client.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
    /// Display form of the full command line, used as the provider name.
    display: String,
    timeout: Option<Duration>,
}

impl CommandProvider {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let display = if args.is_empty() {
            program.clone()
        } else {
            format!("{program} {}", args.join(" "))
        };
        Self {
            program,
            args,
            display,
            timeout: None,
        }
    }

    /// Kill the command if it runs longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }
}

#[async_trait]
impl PlanProvider for CommandProvider {
    fn name(&self) -> &str {
        &self.display
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, ProviderError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The builder's timeout drops this future; take the child with it.
            .kill_on_drop(true);
        if let Some(t) = params.temperature {
            cmd.env(TEMPERATURE_ENV, t.to_string());
        }
        if let Some(n) = params.max_tokens {
            cmd.env(MAX_TOKENS_ENV, n.to_string());
        }

        debug!(command = %self.display, prompt_len = prompt.len(), "spawning provider command");
        let mut child = cmd.spawn().map_err(|source| ProviderError::Spawn {
            command: self.display.clone(),
            source,
        })?;

        let (status, stdout, stderr) = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, communicate(&mut child, prompt)).await {
                Ok(result) => result?,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(ProviderError::Timeout(limit));
                }
            },
            None => communicate(&mut child, prompt).await?,
        };

        debug!(command = %self.display, code = ?status.code(), stdout_len = stdout.len(), "provider command exited");
        if !status.success() {
            return Err(ProviderError::Exited {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

/// Feed `prompt` to the child's stdin while draining stdout and stderr, then
/// wait for exit. Reading concurrently avoids deadlock on full pipe buffers.
async fn communicate(
    child: &mut Child,
    prompt: &str,
) -> Result<(ExitStatus, String, String), std::io::Error> {
    let stdin_pipe = child.stdin.take();
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let write_stdin = async move {
        if let Some(mut stdin) = stdin_pipe {
            match stdin.write_all(prompt.as_bytes()).await {
                Ok(()) => {}
                // Commands that ignore stdin may exit before reading it.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("provider command closed stdin early");
                }
                Err(e) => return Err(e),
            }
            // Dropping stdin sends EOF.
        }
        Ok(())
    };

    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stdout_pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(String::from_utf8_lossy(&buf).into_owned())
    };

    let read_stderr = async {
        let mut buf = Vec::new();
        if let Some(ref mut pipe) = stderr_pipe {
            pipe.read_to_end(&mut buf).await.ok();
        }
        String::from_utf8_lossy(&buf).into_owned()
    };

    let (written, stdout, stderr, status) =
        tokio::join!(write_stdin, read_stdout, read_stderr, child.wait());
    written?;
    Ok((status?, stdout?, stderr))
}
