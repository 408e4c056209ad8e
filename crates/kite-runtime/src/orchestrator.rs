//! Sequential multi-session chaining.
//!
//! Each stage gets its own client and session. A stage runs to the end of its
//! turn, its session is destroyed and its client stopped, and only then does
//! the next stage start. The only thing passed between stages is the text of
//! the previous stage's final assistant message.

use std::fmt;
use std::sync::Arc;

use kite_core::ids::SessionId;
use kite_core::messages::MessageEntry;
use tracing::{debug, instrument, warn};

use crate::client::Client;
use crate::connection::Connection;
use crate::errors::RuntimeError;
use crate::types::{ClientOptions, SessionConfig};

type PromptTemplate = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// One step of a chain.
#[derive(Clone)]
pub struct ChainStage {
    name: String,
    config: SessionConfig,
    template: Option<PromptTemplate>,
}

impl ChainStage {
    /// Stage that forwards its input verbatim as the prompt.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: SessionConfig::default(),
            template: None,
        }
    }

    /// Session configuration for this stage.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the prompt from the stage input.
    #[must_use]
    pub fn with_prompt<F>(mut self, template: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.template = Some(Arc::new(template));
        self
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The prompt this stage sends for `input`.
    pub fn render(&self, input: &str) -> String {
        match &self.template {
            Some(template) => template(input),
            None => input.to_owned(),
        }
    }
}

impl fmt::Debug for ChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainStage")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("templated", &self.template.is_some())
            .finish()
    }
}

/// What one stage did.
#[derive(Clone, Debug)]
pub struct StageReport {
    /// Stage name.
    pub name: String,
    /// Session the stage ran in.
    pub session_id: SessionId,
    /// Prompt sent.
    pub prompt: String,
    /// Final assistant message.
    pub output: String,
    /// The session's message log at the end of the turn.
    pub messages: Vec<MessageEntry>,
}

/// Run `stages` in order, feeding each stage's output to the next.
///
/// `connect` supplies a fresh connection per stage; connections are never
/// shared between stages. Stops at the first failing stage with
/// `StageFailed`.
#[instrument(skip_all, fields(stages = stages.len()))]
pub async fn run_chain<F>(
    stages: &[ChainStage],
    initial_prompt: &str,
    options: &ClientOptions,
    connect: F,
) -> Result<Vec<StageReport>, RuntimeError>
where
    F: Fn(&ChainStage) -> Arc<dyn Connection>,
{
    let mut reports: Vec<StageReport> = Vec::with_capacity(stages.len());
    for stage in stages {
        let input = reports
            .last()
            .map_or(initial_prompt, |prev| prev.output.as_str());
        let prompt = stage.render(input);
        let client = Client::new(connect(stage), options.clone());

        let outcome = run_stage(&client, stage, prompt).await;
        client.stop().await;

        match outcome {
            Ok(report) => {
                debug!(stage = stage.name(), output_len = report.output.len(), "stage completed");
                reports.push(report);
            }
            Err(source) => {
                warn!(stage = stage.name(), error = %source, "stage failed");
                return Err(RuntimeError::StageFailed {
                    stage: stage.name.clone(),
                    source: Box::new(source),
                });
            }
        }
    }
    Ok(reports)
}

async fn run_stage(
    client: &Client,
    stage: &ChainStage,
    prompt: String,
) -> Result<StageReport, RuntimeError> {
    client.start().await?;
    let session = client.create_session(stage.config.clone()).await?;
    let reply = session.send_and_wait(prompt.clone()).await;
    let messages = session.messages();
    session.destroy().await;

    let output = reply?.ok_or_else(|| RuntimeError::TurnFailed {
        error_type: "empty_reply".into(),
        message: "turn ended without an assistant message".into(),
    })?;
    Ok(StageReport {
        name: stage.name.clone(),
        session_id: session.id().clone(),
        prompt,
        output,
        messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stage_forwards_input() {
        let stage = ChainStage::new("writer");
        assert_eq!(stage.render("Once upon a time..."), "Once upon a time...");
    }

    #[test]
    fn template_wraps_input() {
        let stage = ChainStage::new("critic")
            .with_prompt(|story| format!("Give feedback on this story:\n\n{story}"));
        assert_eq!(
            stage.render("Once"),
            "Give feedback on this story:\n\nOnce"
        );
        assert!(format!("{stage:?}").contains("templated: true"));
    }
}
