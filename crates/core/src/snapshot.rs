//! Thread/lane snapshot builder.
//!
//! Lists the live threads, then fans out one fetch per thread (top frame,
//! then the mask / width-hint / hardware-id / work-group evaluations in
//! parallel) and joins them all. Threads without SIMD data or whose fetch
//! failed are left out; the rest keep the backend's thread order.

use futures::future::join_all;
use lanescope_protocol::{LaneRef, SimdSnapshot, ThreadRow, WorkGroup};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::CoreError;
use crate::mask::{self, ExecutionMaskSet, MaskError};
use crate::rpc::{DebugSession, EvalContext, RpcError, ThreadInfo};

/// Backend convenience variables read for every thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SnapshotExpressions {
    pub execution_mask: String,
    /// Inactive-lanes mask whose bit pattern identifies the SIMD width.
    pub width_hint: String,
    pub hardware_thread: String,
    pub work_group: String,
}

impl Default for SnapshotExpressions {
    fn default() -> Self {
        Self {
            execution_mask: "$emask".to_string(),
            width_hint: "$_inactive_lanes_mask".to_string(),
            hardware_thread: "$_thread_hw_id".to_string(),
            work_group: "$_thread_workgroup".to_string(),
        }
    }
}

/// What the debugger reported when it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopContext {
    pub thread_id: Option<u64>,
    pub lane: Option<u32>,
    /// Lanes of the stopped thread that satisfied the breakpoint condition.
    pub hit_lanes_mask: Option<String>,
}

impl StopContext {
    pub fn lane_ref(&self) -> Option<LaneRef> {
        Some(LaneRef::new(self.thread_id?, self.lane?))
    }
}

pub struct SnapshotBuilder<'a, S: ?Sized> {
    session: &'a S,
    expressions: &'a SnapshotExpressions,
}

impl<'a, S: DebugSession + ?Sized> SnapshotBuilder<'a, S> {
    pub fn new(session: &'a S, expressions: &'a SnapshotExpressions) -> Self {
        Self {
            session,
            expressions,
        }
    }

    /// Build the snapshot. `focus` selects the current lane; without it the
    /// stop lane is current.
    #[instrument(skip_all)]
    pub async fn build(
        &self,
        stop: Option<&StopContext>,
        focus: Option<LaneRef>,
    ) -> Result<SimdSnapshot, CoreError> {
        if !self.session.is_active() {
            return Err(CoreError::NoSession);
        }
        let threads = self.session.list_threads().await?;
        let focus = focus.or_else(|| stop.and_then(StopContext::lane_ref));

        let fetches = threads
            .iter()
            .map(|thread| self.fetch_thread(thread, stop, focus));
        let rows: Vec<ThreadRow> = join_all(fetches)
            .await
            .into_iter()
            .zip(&threads)
            .filter_map(|(result, thread)| match result {
                Ok(row) => row,
                Err(err) => {
                    warn!(thread = thread.id, %err, "omitting thread from snapshot");
                    None
                }
            })
            .collect();

        debug!(threads = threads.len(), simd = rows.len(), "snapshot built");
        Ok(SimdSnapshot::new(rows))
    }

    async fn fetch_thread(
        &self,
        thread: &ThreadInfo,
        stop: Option<&StopContext>,
        focus: Option<LaneRef>,
    ) -> Result<Option<ThreadRow>, CoreError> {
        let Some(frame) = self.session.top_frame(thread.id).await? else {
            debug!(thread = thread.id, "no frames, skipping");
            return Ok(None);
        };
        let frame_id = Some(frame.id);
        let exprs = self.expressions;

        let (masks, work_group) = futures::join!(
            futures::future::try_join3(
                self.eval(&exprs.execution_mask, frame_id, true),
                self.eval(&exprs.width_hint, frame_id, true),
                self.eval(&exprs.hardware_thread, frame_id, false),
            ),
            self.eval(&exprs.work_group, frame_id, false),
        );
        let (execution_mask, width_hint, hardware_id) = masks?;
        let work_group = match work_group {
            Ok(text) => WorkGroup::parse(&text),
            Err(err) => {
                debug!(thread = thread.id, %err, "no work-group");
                None
            }
        };

        let hit_lanes_mask = stop
            .filter(|s| s.thread_id == Some(thread.id))
            .and_then(|s| s.hit_lanes_mask.clone());
        let set = ExecutionMaskSet {
            execution_mask,
            hit_lanes_mask,
            length: mask::width_from_hint(&width_hint),
        };
        let current_lane = focus
            .filter(|f| f.thread_id == thread.id)
            .map(|f| f.lane);
        let lanes = match mask::decode(&set, current_lane) {
            Ok(lanes) => lanes,
            Err(MaskError::NotNumeric(value)) => {
                debug!(thread = thread.id, value, "no SIMD data, skipping");
                return Ok(None);
            }
        };

        Ok(Some(ThreadRow {
            thread_id: thread.id,
            target_id: target_id(&hardware_id, thread),
            location: frame.location(),
            work_group,
            simd_width: set.length,
            lanes,
        }))
    }
}

impl<S: DebugSession + ?Sized> SnapshotBuilder<'_, S> {
    async fn eval(
        &self,
        expression: &str,
        frame_id: Option<u64>,
        hex: bool,
    ) -> Result<String, RpcError> {
        self.session
            .evaluate(expression, frame_id, EvalContext::Watch, hex)
            .await
    }
}

fn target_id(hardware_id: &str, thread: &ThreadInfo) -> String {
    let hardware_id = hardware_id.trim();
    if hardware_id.is_empty() || hardware_id == "void" {
        thread.name.clone()
    } else {
        hardware_id.to_string()
    }
}
