//! Debugger stop events.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::snapshot::StopContext;

/// A `stopped` notification from the debug session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopEvent {
    /// `breakpoint`, `step`, `pause`, `function breakpoint`, ...
    pub reason: String,
    #[serde(default)]
    pub thread_id: Option<u64>,
    #[serde(default)]
    pub lane: Option<u32>,
    #[serde(default)]
    pub hit_lanes_mask: Option<String>,
    /// Kind of the breakpoint that was hit, when `reason` is `breakpoint`.
    #[serde(default)]
    pub breakpoint_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint(BreakpointKind),
    Step,
    Pause,
    Entry,
    Exception,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    Source,
    Function,
    Data,
    Instruction,
}

impl BreakpointKind {
    pub fn parse(kind: &str) -> Result<Self, CoreError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "source" | "line" => Ok(Self::Source),
            "function" => Ok(Self::Function),
            "data" | "watchpoint" => Ok(Self::Data),
            "instruction" => Ok(Self::Instruction),
            _ => Err(CoreError::UnknownBreakpointType(kind.to_string())),
        }
    }
}

impl StopEvent {
    /// Classify the stop. An unrecognised breakpoint kind is an error the
    /// views cannot recover from.
    pub fn reason(&self) -> Result<StopReason, CoreError> {
        let reason = self.reason.trim().to_ascii_lowercase();
        Ok(match reason.as_str() {
            "breakpoint" => StopReason::Breakpoint(match &self.breakpoint_type {
                Some(kind) => BreakpointKind::parse(kind)?,
                None => BreakpointKind::Source,
            }),
            "function breakpoint" => StopReason::Breakpoint(BreakpointKind::Function),
            "data breakpoint" => StopReason::Breakpoint(BreakpointKind::Data),
            "instruction breakpoint" => StopReason::Breakpoint(BreakpointKind::Instruction),
            "step" => StopReason::Step,
            "pause" => StopReason::Pause,
            "entry" => StopReason::Entry,
            "exception" => StopReason::Exception,
            _ => StopReason::Other(self.reason.clone()),
        })
    }

    /// Snapshot context for this stop. Hit lanes only exist for breakpoint
    /// stops.
    pub fn context(&self, reason: &StopReason) -> StopContext {
        let hit_lanes_mask = match reason {
            StopReason::Breakpoint(_) => self.hit_lanes_mask.clone(),
            _ => None,
        };
        StopContext {
            thread_id: self.thread_id,
            lane: self.lane,
            hit_lanes_mask,
        }
    }
}
