use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub model: String,
    pub timeout: Duration,
    /// Executable to run; `claude` on PATH unless overridden.
    pub program: String,
}

impl ClaudeCliConfig {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            timeout,
            ..Self::default()
        }
    }
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            timeout: Duration::from_secs(60),
            program: "claude".to_string(),
        }
    }
}

/// Arguments for one non-interactive, plain-text completion.
fn completion_args<'a>(system_prompt: &'a str, user_prompt: &'a str, model: &'a str) -> [&'a str; 8] {
    [
        "-p",
        user_prompt,
        "--system-prompt",
        system_prompt,
        "--model",
        model,
        "--output-format",
        "text",
    ]
}

/// A reply is usable only if the process succeeded and printed something.
fn reply_from_output(program: &str, output: Output) -> Result<String, AgentError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "{program} exited {}: {stderr}",
            output.status
        )));
    }

    let reply = String::from_utf8_lossy(&output.stdout).into_owned();
    if reply.trim().is_empty() {
        return Err(AgentError::Cli(format!("{program} returned an empty reply")));
    }
    Ok(reply)
}

/// Ask the CLI for one completion and return the raw reply text.
///
/// The child is killed if the timeout fires or the cycle is dropped, so a
/// hung model call never outlives the cycle deadline.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(model = %config.model, program = %config.program, "Invoking claude CLI");

    let mut command = Command::new(&config.program);
    command
        .args(completion_args(system_prompt, user_prompt, &config.model))
        .kill_on_drop(true);

    let output = tokio::time::timeout(config.timeout, command.output())
        .await
        .map_err(|_| AgentError::Timeout(config.timeout.as_secs()))?
        .map_err(|e| AgentError::Cli(format!("Failed to spawn {}: {e}", config.program)))?;

    reply_from_output(&config.program, output)
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
