//! Child-process connection speaking newline-delimited JSON.
//!
//! Each line written to the child's stdin is one [`OutboundRequest`]; each
//! line read from its stdout is one [`InboundFrame`]. Stderr is inherited.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, warn};

use super::{Connection, ConnectionError, InboundFrame, OutboundRequest};

/// Longest accepted inbound line.
const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// How long `close` waits for the child to exit after stdin is closed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

struct Running {
    child: Child,
    writer: FramedWrite<ChildStdin, LinesCodec>,
    reader: JoinHandle<()>,
}

/// Connection to a backend process.
pub struct StdioConnection {
    program: String,
    args: Vec<String>,
    running: Mutex<Option<Running>>,
}

impl StdioConnection {
    /// Connection that will spawn `program args...` on `open`.
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            running: Mutex::new(None),
        }
    }

    /// Build from an argv vector (`["program", "arg", ...]`).
    ///
    /// Returns `None` for an empty vector.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }
}

async fn read_frames(
    mut lines: FramedRead<tokio::process::ChildStdout, LinesCodec>,
    tx: mpsc::UnboundedSender<InboundFrame>,
) {
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "backend stdout read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundFrame>(&line) {
            Ok(frame) => {
                if tx.send(frame).is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "undecodable frame from backend skipped"),
        }
    }
    debug!("backend stdout closed");
}

#[async_trait]
impl Connection for StdioConnection {
    async fn open(&self) -> Result<mpsc::UnboundedReceiver<InboundFrame>, ConnectionError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "backend process already running",
            )));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child.stdin.take().ok_or(ConnectionError::Closed)?;
        let stdout = child.stdout.take().ok_or(ConnectionError::Closed)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let reader = tokio::spawn(read_frames(lines, tx));

        debug!(program = %self.program, pid = child.id(), "backend process spawned");
        *running = Some(Running {
            child,
            writer: FramedWrite::new(stdin, LinesCodec::new()),
            reader,
        });
        Ok(rx)
    }

    async fn send(&self, request: OutboundRequest) -> Result<(), ConnectionError> {
        let line = serde_json::to_string(&request)?;
        let mut running = self.running.lock().await;
        let running = running.as_mut().ok_or(ConnectionError::NotOpen)?;
        running.writer.send(line).await?;
        Ok(())
    }

    async fn close(&self) {
        let Some(mut running) = self.running.lock().await.take() else {
            return;
        };
        drop(running.writer);
        match tokio::time::timeout(EXIT_GRACE, running.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "backend process exited"),
            Ok(Err(e)) => warn!(error = %e, "waiting for backend process failed"),
            Err(_) => {
                warn!("backend process did not exit, killing");
                let _ = running.child.kill().await;
            }
        }
        running.reader.abort();
    }
}
