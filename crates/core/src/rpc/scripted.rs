//! A deterministic in-process [`DebugSession`] driven by a recorded
//! transcript. Used by tests and by `lanescope replay`.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{DebugSession, EvalContext, RpcError, StackFrame, ThreadInfo};

/// One scripted answer to an `evaluate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reply {
    Ok(String),
    Error(String),
}

impl Reply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self::Ok(text.into())
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error(text.into())
    }
}

/// Replies for one expression. Queued replies are consumed in order; the
/// last one repeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedReply {
    /// Frame the expression is evaluated in; `None` matches any frame.
    #[serde(default)]
    pub frame: Option<u64>,
    pub expression: String,
    pub replies: Vec<Reply>,
}

/// Recorded session, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub threads: Vec<ThreadInfo>,
    /// Top frame per thread id.
    #[serde(default)]
    pub frames: HashMap<u64, StackFrame>,
    #[serde(default)]
    pub replies: Vec<ScriptedReply>,
}

type ReplyKey = (Option<u64>, String);

pub struct ScriptedSession {
    active: bool,
    threads: Vec<ThreadInfo>,
    frames: HashMap<u64, StackFrame>,
    failing_threads: HashSet<u64>,
    replies: Mutex<HashMap<ReplyKey, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            active: true,
            threads: Vec::new(),
            frames: HashMap::new(),
            failing_threads: HashSet::new(),
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn from_transcript(transcript: Transcript) -> Self {
        let mut session = Self::new();
        session.threads = transcript.threads;
        session.frames = transcript.frames;
        for scripted in transcript.replies {
            for reply in scripted.replies {
                session = session.reply(scripted.frame, &scripted.expression, reply);
            }
        }
        session
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::from_transcript)
    }

    /// A session that reports itself detached.
    pub fn inactive() -> Self {
        Self {
            active: false,
            ..Self::new()
        }
    }

    /// Add a thread whose top frame has the same id as the thread.
    pub fn with_thread(mut self, id: u64, name: &str) -> Self {
        self.threads.push(ThreadInfo {
            id,
            name: name.to_string(),
        });
        self.frames.insert(
            id,
            StackFrame {
                id,
                source: None,
                line: None,
            },
        );
        self
    }

    pub fn with_frame(mut self, thread_id: u64, frame: StackFrame) -> Self {
        self.frames.insert(thread_id, frame);
        self
    }

    /// Add a thread whose stack request fails on the transport.
    pub fn with_failing_thread(mut self, id: u64, name: &str) -> Self {
        self.threads.push(ThreadInfo {
            id,
            name: name.to_string(),
        });
        self.failing_threads.insert(id);
        self
    }

    pub fn reply(mut self, frame: Option<u64>, expression: &str, reply: Reply) -> Self {
        self.replies
            .get_mut()
            .entry((frame, expression.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    /// Every expression evaluated so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn next_reply(&self, frame: Option<u64>, expression: &str) -> Option<Reply> {
        let mut replies = self.replies.lock();
        let key = (frame, expression.to_string());
        let key = if replies.contains_key(&key) {
            key
        } else {
            (None, expression.to_string())
        };
        let queue = replies.get_mut(&key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl DebugSession for ScriptedSession {
    fn is_active(&self) -> bool {
        self.active
    }

    async fn list_threads(&self) -> Result<Vec<ThreadInfo>, RpcError> {
        Ok(self.threads.clone())
    }

    async fn top_frame(&self, thread_id: u64) -> Result<Option<StackFrame>, RpcError> {
        if self.failing_threads.contains(&thread_id) {
            return Err(RpcError::Channel(format!("stackTrace for thread {thread_id} failed")));
        }
        Ok(self.frames.get(&thread_id).cloned())
    }

    async fn evaluate(
        &self,
        expression: &str,
        frame_id: Option<u64>,
        _context: EvalContext,
        _format_hex: bool,
    ) -> Result<String, RpcError> {
        self.calls.lock().push(expression.to_string());
        match self.next_reply(frame_id, expression) {
            Some(Reply::Ok(text)) => Ok(text),
            Some(Reply::Error(text)) => Err(RpcError::Backend(text)),
            None => Err(RpcError::Backend(format!(
                "No symbol \"{expression}\" in current context."
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_replies_then_repeat_last() {
        let session = ScriptedSession::new()
            .reply(None, "x", Reply::error("first"))
            .reply(None, "x", Reply::ok("second"));
        let ctx = EvalContext::Watch;
        assert!(session.evaluate("x", None, ctx, false).await.is_err());
        assert_eq!(session.evaluate("x", None, ctx, false).await.unwrap(), "second");
        assert_eq!(session.evaluate("x", Some(4), ctx, false).await.unwrap(), "second");
        assert_eq!(session.count_calls("x"), 3);
    }

    #[tokio::test]
    async fn frame_specific_reply_wins() {
        let session = ScriptedSession::new()
            .reply(None, "$emask", Reply::ok("0x0"))
            .reply(Some(2), "$emask", Reply::ok("0xff"));
        let ctx = EvalContext::Watch;
        assert_eq!(session.evaluate("$emask", Some(2), ctx, true).await.unwrap(), "0xff");
        assert_eq!(session.evaluate("$emask", Some(3), ctx, true).await.unwrap(), "0x0");
    }

    #[tokio::test]
    async fn loads_transcript_json() {
        let json = r#"{
            "threads": [{"id": 1, "name": "ZE 0.0.0"}],
            "frames": {"1": {"id": 10, "source": "/k/vadd.cl", "line": 7}},
            "replies": [{"frame": 10, "expression": "$emask", "replies": [{"ok": "0xf"}]}]
        }"#;
        let session = ScriptedSession::from_json(json).unwrap();
        let threads = session.list_threads().await.unwrap();
        assert_eq!(threads.len(), 1);
        let frame = session.top_frame(1).await.unwrap().unwrap();
        assert_eq!(frame.id, 10);
        let mask = session
            .evaluate("$emask", Some(10), EvalContext::Watch, true)
            .await
            .unwrap();
        assert_eq!(mask, "0xf");
    }
}
