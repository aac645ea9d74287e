use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;

/// Which seat a reasoning call fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Advisor,
    Reviewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advisor => f.write_str("advisor"),
            Self::Reviewer => f.write_str("reviewer"),
        }
    }
}

/// A role-tagged prompt: system instructions, user text, optional chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub role: Role,
    pub system: String,
    pub user: String,
    pub chart_reference: Option<String>,
}

impl Prompt {
    pub fn new(role: Role, system: String, user: String) -> Self {
        Self {
            role,
            system,
            user,
            chart_reference: None,
        }
    }

    pub fn with_chart(mut self, chart_reference: Option<String>) -> Self {
        self.chart_reference = chart_reference;
        self
    }
}

/// A reasoning collaborator: prompt in, free text out. Mockable for testing.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt) -> Result<String, AgentError>;
}

/// Reasoning collaborator backed by the Claude CLI.
pub struct ClaudeReasoner {
    pub name: String,
    pub cli_config: ClaudeCliConfig,
}

impl ClaudeReasoner {
    pub fn new(name: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            cli_config: ClaudeCliConfig::new(model, timeout),
        }
    }
}

/// The CLI takes text only, so the chart travels as a path the model can open.
fn render_user_prompt(prompt: &Prompt) -> String {
    match &prompt.chart_reference {
        Some(chart) if !prompt.user.contains(chart.as_str()) => {
            format!("{}\n\nChart image (read this file): {chart}", prompt.user)
        }
        _ => prompt.user.clone(),
    }
}

#[async_trait]
impl ReasoningAgent for ClaudeReasoner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, AgentError> {
        let user_prompt = render_user_prompt(prompt);
        let start = Instant::now();
        let result = invoke_claude(&prompt.system, &user_prompt, &self.cli_config).await;
        debug!(
            agent = %self.name,
            role = %prompt.role,
            model = %self.cli_config.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Reasoning call finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_path_is_appended_once() {
        let prompt = Prompt::new(Role::Advisor, "sys".to_string(), "Price: 1".to_string())
            .with_chart(Some("/tmp/chart.png".to_string()));
        let rendered = render_user_prompt(&prompt);
        assert!(rendered.ends_with("Chart image (read this file): /tmp/chart.png"));

        let already = Prompt::new(
            Role::Advisor,
            "sys".to_string(),
            "Chart image: /tmp/chart.png".to_string(),
        )
        .with_chart(Some("/tmp/chart.png".to_string()));
        assert_eq!(render_user_prompt(&already), "Chart image: /tmp/chart.png");
    }

    #[test]
    fn prompt_without_chart_is_unchanged() {
        let prompt = Prompt::new(Role::Reviewer, "sys".to_string(), "Action: BUY".to_string());
        assert_eq!(render_user_prompt(&prompt), "Action: BUY");
        assert_eq!(prompt.role.to_string(), "reviewer");
    }

    #[test]
    fn claude_reasoner_uses_given_model() {
        let reasoner = ClaudeReasoner::new("advisor", "claude-3-5-haiku-latest", Duration::from_secs(10));
        assert_eq!(reasoner.name(), "advisor");
        assert_eq!(reasoner.cli_config.model, "claude-3-5-haiku-latest");
        assert_eq!(reasoner.cli_config.timeout, Duration::from_secs(10));
    }
}
