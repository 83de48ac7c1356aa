//! Operator Confirmation Gate
//!
//! In supervised mode every plugin build waits for a human to type the
//! acceptance token after reviewing the persisted source. Anything else
//! blocks the build, and the operator's text is passed back to the requester
//! as feedback. The wait is bounded; silence counts as a refusal.
//!
//! This is the only isolation between untrusted plugin source and the host's
//! privileges. It is a checkpoint, not a sandbox.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::PluginError;

/// The exact line an operator must enter to allow a build.
pub const ACCEPTANCE_TOKEN: &str = "confirm";

// ---------------------------------------------------------------------------
// Line source
// ---------------------------------------------------------------------------

/// Outcome of waiting for one line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    Line(String),
    TimedOut,
    Closed,
}

/// Stdin read on a dedicated thread, so waits can time out without leaving a
/// stray reader that would swallow the next console line. The console and the
/// gate share one instance.
pub struct StdinLines {
    rx: Mutex<Receiver<String>>,
}

impl StdinLines {
    pub fn spawn() -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("gptchat-stdin".into())
            .spawn(move || {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .map(|_| ())
            .unwrap_or_else(|e| warn!(error = %e, "failed to spawn stdin reader; input is closed"));
        Arc::new(Self::from_receiver(rx))
    }

    fn from_receiver(rx: Receiver<String>) -> Self {
        Self { rx: Mutex::new(rx) }
    }

    /// Next line without its terminator. `None` waits indefinitely.
    pub fn next_line(&self, timeout: Option<Duration>) -> LineRead {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        let received = match timeout {
            Some(t) => rx.recv_timeout(t),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(line) => LineRead::Line(line.trim_end_matches('\r').to_string()),
            Err(RecvTimeoutError::Timeout) => LineRead::TimedOut,
            Err(RecvTimeoutError::Disconnected) => LineRead::Closed,
        }
    }
}

// ---------------------------------------------------------------------------
// Operator prompt
// ---------------------------------------------------------------------------

/// Presents a notice to the operator and waits for one line.
pub trait OperatorPrompt: Send + Sync {
    fn ask(&self, notice: &str, timeout: Duration) -> LineRead;
}

/// Prompts on stdout and reads from the shared [`StdinLines`].
pub struct TerminalPrompt {
    lines: Arc<StdinLines>,
}

impl TerminalPrompt {
    pub fn new(lines: Arc<StdinLines>) -> Self {
        Self { lines }
    }
}

impl OperatorPrompt for TerminalPrompt {
    fn ask(&self, notice: &str, timeout: Duration) -> LineRead {
        let mut out = io::stdout().lock();
        // The prompt is best effort; an unwritable terminal still gets the bounded wait.
        let _ = write!(out, "{}", notice);
        let _ = out.flush();
        drop(out);
        let answer = self.lines.next_line(Some(timeout));
        println!("\n{}", "=".repeat(60));
        answer
    }
}

// ---------------------------------------------------------------------------
// Confirmation Gate
// ---------------------------------------------------------------------------

pub struct ConfirmationGate {
    supervised: bool,
    timeout: Duration,
    prompt: Box<dyn OperatorPrompt>,
}

impl ConfirmationGate {
    pub fn new(supervised: bool, timeout: Duration, prompt: Box<dyn OperatorPrompt>) -> Self {
        Self {
            supervised,
            timeout,
            prompt,
        }
    }

    pub fn is_supervised(&self) -> bool {
        self.supervised
    }

    /// Pass-through unless supervised. Otherwise blocks (bounded) for the operator.
    pub fn review(&self, id: &str, source_path: &Path) -> Result<(), PluginError> {
        if !self.supervised {
            return Ok(());
        }

        let notice = risk_notice(id, source_path);
        match self.prompt.ask(&notice, self.timeout) {
            LineRead::Line(answer) if answer == ACCEPTANCE_TOKEN => {
                info!(target: "gptchat::plugin", plugin = %id, "operator confirmed plugin build");
                Ok(())
            }
            LineRead::Line(answer) => {
                warn!(target: "gptchat::plugin", plugin = %id, "operator blocked plugin build");
                Err(PluginError::ConfirmationDenied { feedback: answer })
            }
            LineRead::TimedOut => {
                warn!(target: "gptchat::plugin", plugin = %id, timeout_secs = self.timeout.as_secs(), "confirmation timed out");
                Err(PluginError::ConfirmationDenied {
                    feedback: format!("no confirmation within {} seconds", self.timeout.as_secs()),
                })
            }
            LineRead::Closed => Err(PluginError::ConfirmationDenied {
                feedback: "operator input is closed".to_string(),
            }),
        }
    }
}

fn risk_notice(id: &str, source_path: &Path) -> String {
    let rule = "=".repeat(60);
    format!(
        "{rule}\n\n\
         WARNING: plugin '{id}' was written by the assistant and is untrusted code.\n\n\
         Review it before allowing it to be compiled and loaded. Once loaded it runs\n\
         inside this process with the same permissions as your user.\n\n\
         This is potentially dangerous.\n\n\
         Source: {path}\n\n\
         Corrections or hints typed here are passed back to the assistant.\n\
         Enter '{token}' to confirm, anything else will block: ",
        path = source_path.display(),
        token = ACCEPTANCE_TOKEN,
    )
}
