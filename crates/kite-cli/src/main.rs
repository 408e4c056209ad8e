//! # kite
//!
//! Command-line client for the Kite session runtime: ask a single question
//! with streamed output, let the model list a local directory through a
//! tool, or chain a writer session into a critic session.

#![deny(unsafe_code)]

mod backend;
mod render;
mod tools;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use kite_runtime::{
    ChainStage, Client, ClientOptions, Connection, SessionConfig, StdioConnection,
};
use kite_settings::KiteSettings;
use tracing::{debug, info};

use crate::backend::EchoBackend;
use crate::render::Renderer;

/// Kite session client.
#[derive(Parser, Debug)]
#[command(name = "kite", version, about = "Talk to an assistant backend from the terminal")]
struct Cli {
    /// Backend command line, e.g. "assistant-server --stdio". Overrides
    /// `client.backendCommand`; without either the built-in echo backend is used.
    #[arg(long, global = true)]
    backend_cmd: Option<String>,

    /// Model for new sessions (overrides `client.defaultModel`).
    #[arg(long, global = true)]
    model: Option<String>,

    /// Wait for whole messages instead of streaming deltas.
    #[arg(long, global = true)]
    no_stream: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one prompt and stream the reply.
    Ask {
        /// Prompt text.
        prompt: String,
    },
    /// Ask about a directory with the `list_local_files` tool registered.
    Files {
        /// Directory the tool lists when the model does not name one.
        #[arg(long, default_value = ".")]
        directory: String,
        /// Prompt text.
        #[arg(long, default_value = "Tell me which files are in this directory")]
        prompt: String,
    },
    /// Have one session write a story and a second session critique it.
    Chain {
        /// What the story should be about.
        topic: String,
    },
}

impl Cli {
    fn backend_argv(&self, settings: &KiteSettings) -> Option<Vec<String>> {
        match &self.backend_cmd {
            Some(cmd) => Some(cmd.split_whitespace().map(str::to_owned).collect()),
            None => settings.client.backend_command.clone(),
        }
    }

    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new();
        if let Some(model) = &self.model {
            config = config.model(model.clone());
        }
        if self.no_stream {
            config = config.streaming(false);
        }
        config
    }
}

/// Where sessions are sent: a child process or the built-in echo backend.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Backend {
    Stdio { program: String, args: Vec<String> },
    Echo,
}

impl Backend {
    /// Every subcommand goes through here, so an empty command line is
    /// rejected the same way everywhere.
    fn select(argv: Option<Vec<String>>) -> Result<Self> {
        let Some(argv) = argv else {
            return Ok(Self::Echo);
        };
        let Some((program, args)) = argv.split_first() else {
            bail!("backend command is empty");
        };
        Ok(Self::Stdio {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// A fresh, unopened connection.
    fn connect(&self) -> Arc<dyn Connection> {
        match self {
            Self::Stdio { program, args } => {
                debug!(%program, "using stdio backend");
                Arc::new(StdioConnection::new(program.clone(), args.iter().cloned()))
            }
            Self::Echo => {
                debug!("using built-in echo backend");
                Arc::new(EchoBackend::connection())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = kite_settings::load_settings().unwrap_or_default();
    if settings.logging.json {
        kite_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        kite_core::logging::init_subscriber(&settings.logging.level);
    }
    info!(version = kite_core::constants::VERSION, "kite starting");

    let options = ClientOptions::from_settings(&settings);
    let backend = Backend::select(cli.backend_argv(&settings))?;

    match &cli.command {
        Command::Ask { prompt } => {
            ask(backend.connect(), options, cli.session_config(), prompt).await
        }
        Command::Files { directory, prompt } => {
            let conn = backend.connect();
            let config = cli
                .session_config()
                .tool(Arc::new(tools::list_local_files(directory.clone())));
            ask(conn, options, config, prompt).await
        }
        Command::Chain { topic } => chain(&backend, options, cli.session_config(), topic).await,
    }
}

/// One client, one session, one turn, rendered as it streams.
async fn ask(
    conn: Arc<dyn Connection>,
    options: ClientOptions,
    config: SessionConfig,
    prompt: &str,
) -> Result<()> {
    let client = Client::new(conn, options);
    client.start().await.context("failed to start client")?;

    let result = async {
        let session = client.create_session(config).await?;
        let renderer = Renderer::stdout(session.streaming());
        let _ = session.subscribe(move |event| renderer.render(event));
        let reply = session.send_and_wait(prompt).await;
        // Destroy waits for the subscriber to print everything queued.
        session.destroy().await;
        reply
    }
    .await;

    client.stop().await;
    let _ = result.context("turn failed")?;
    Ok(())
}

async fn chain(
    backend: &Backend,
    options: ClientOptions,
    config: SessionConfig,
    topic: &str,
) -> Result<()> {
    let stages = [
        ChainStage::new("writer")
            .with_config(config.clone())
            .with_prompt(|topic| format!("Write a short, funny story about {topic}.")),
        ChainStage::new("critic")
            .with_config(config)
            .with_prompt(|story| format!("Give feedback on this story:\n\n{story}")),
    ];

    // Every stage gets its own connection; a spawn failure surfaces on start.
    let connect_stage = |stage: &ChainStage| -> Arc<dyn Connection> {
        debug!(stage = stage.name(), "connecting stage");
        backend.connect()
    };

    let reports = kite_runtime::run_chain(&stages, topic, &options, connect_stage)
        .await
        .context("chain failed")?;

    for report in &reports {
        println!("--- {} ---", report.name);
        println!("{}", report.output);
    }
    Ok(())
}
