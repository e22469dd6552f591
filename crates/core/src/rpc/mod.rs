//! The debug-session boundary.
//!
//! Every backend interaction is an async request/response over one logical
//! channel per session. Sessions are driven from a single cooperative event
//! loop, so the trait does not require `Send`.

pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mi::MiCommand;

pub use scripted::{Reply, ScriptedSession, Transcript};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("process is running")]
    ProcessRunning,
    /// The backend answered with an error message.
    #[error("{0}")]
    Backend(String),
    /// The transport itself failed.
    #[error("debug channel failed: {0}")]
    Channel(String),
}

impl RpcError {
    /// Errors caused by racing a running debuggee. The dependent UI element
    /// is hidden instead of reporting a failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ProcessRunning => true,
            Self::Backend(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("process is running")
                    || msg.contains("target is running")
                    || msg.contains("selected thread is running")
            }
            Self::Channel(_) => false,
        }
    }

    /// Variable-object name collision on `-var-create`.
    pub fn is_duplicate_name(&self) -> bool {
        matches!(self, Self::Backend(msg) if msg.to_ascii_lowercase().contains("duplicate variable object name"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub id: u64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl StackFrame {
    /// `file:line` using the file name of the source path.
    pub fn location(&self) -> Option<String> {
        let source = self.source.as_deref()?;
        let file = source.rsplit(['/', '\\']).next().unwrap_or(source);
        Some(match self.line {
            Some(line) => format!("{file}:{line}"),
            None => file.to_string(),
        })
    }
}

/// Context an expression is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalContext {
    Watch,
    Repl,
    Hover,
}

#[async_trait(?Send)]
pub trait DebugSession {
    /// Whether the session is attached and able to answer requests.
    fn is_active(&self) -> bool {
        true
    }

    async fn list_threads(&self) -> Result<Vec<ThreadInfo>, RpcError>;

    /// Top stack frame of a thread, `None` when it has no frames.
    async fn top_frame(&self, thread_id: u64) -> Result<Option<StackFrame>, RpcError>;

    async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<u64>,
        context: EvalContext,
        format_hex: bool,
    ) -> Result<String, RpcError>;
}

/// Send a structured command through `evaluate`.
pub async fn run_mi<S: DebugSession + ?Sized>(
    session: &S,
    command: &MiCommand,
    frame_id: Option<u64>,
) -> Result<String, RpcError> {
    let text = command.to_string();
    tracing::debug!(command = %text, "mi request");
    let reply = session
        .evaluate(&text, frame_id, EvalContext::Repl, false)
        .await;
    if let Err(err) = &reply {
        tracing::debug!(command = %text, %err, "mi request failed");
    }
    reply
}
