use serde::{Deserialize, Serialize};

/// The lane snapshot IR shared by the core and every view.
///
/// ```text
///   debug backend ─▶ masks ─▶ SimdSnapshot ──▶ HTML table / terminal table
///   (RPC)           (hex)       (this)          (views)
/// ```
///
/// A snapshot is rebuilt on every stop or refresh and is never persisted
/// across debugger sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimdSnapshot {
    pub threads: Vec<ThreadRow>,
}

impl SimdSnapshot {
    pub fn new(threads: Vec<ThreadRow>) -> Self {
        Self { threads }
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Widest SIMD width across all threads (the table column count).
    pub fn max_width(&self) -> u32 {
        self.threads.iter().map(|t| t.simd_width).max().unwrap_or(0)
    }

    pub fn thread(&self, thread_id: u64) -> Option<&ThreadRow> {
        self.threads.iter().find(|t| t.thread_id == thread_id)
    }

    /// The lane currently focused by the debugger, if any.
    pub fn current_lane(&self) -> Option<LaneRef> {
        self.threads.iter().find_map(|t| {
            t.lanes
                .iter()
                .find(|l| l.current)
                .map(|l| LaneRef::new(t.thread_id, l.lane_id))
        })
    }

    /// Move the focus to `target`, clearing every other `current` flag.
    ///
    /// Returns the previously focused lane. If `target` does not exist in
    /// the snapshot no lane is current afterwards.
    pub fn select_lane(&mut self, target: LaneRef) -> Option<LaneRef> {
        let previous = self.current_lane();
        for thread in &mut self.threads {
            let same_thread = thread.thread_id == target.thread_id;
            for lane in &mut thread.lanes {
                lane.current = same_thread && lane.lane_id == target.lane;
            }
        }
        previous
    }
}

/// One hardware thread (wavefront) and its lanes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRow {
    pub thread_id: u64,
    /// Backend target id (hardware thread id when known).
    pub target_id: String,
    /// `file:line` of the top frame.
    pub location: Option<String>,
    pub work_group: Option<WorkGroup>,
    /// Lane count; zero means the width could not be determined.
    pub simd_width: u32,
    pub lanes: Vec<Lane>,
}

impl ThreadRow {
    pub fn active_count(&self) -> usize {
        self.lanes.iter().filter(|l| l.state.is_executing()).count()
    }

    pub fn hit_count(&self) -> usize {
        self.lanes
            .iter()
            .filter(|l| l.state == LaneState::Hit)
            .count()
    }
}

/// One SIMD execution slot of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lane {
    pub lane_id: u32,
    pub state: LaneState,
    pub current: bool,
    /// Overrides the configured symbol for this lane.
    pub custom_symbol: Option<char>,
}

impl Lane {
    pub fn new(lane_id: u32, state: LaneState) -> Self {
        Self {
            lane_id,
            state,
            current: false,
            custom_symbol: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LaneState {
    Active,
    Inactive,
    /// Active and satisfied the condition of the breakpoint that stopped it.
    Hit,
}

impl LaneState {
    /// Active and hit lanes are both executing.
    pub fn is_executing(self) -> bool {
        matches!(self, Self::Active | Self::Hit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Hit => "hit",
        }
    }
}

impl std::fmt::Display for LaneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a lane: `thread_id` plus lane index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneRef {
    pub thread_id: u64,
    pub lane: u32,
}

impl LaneRef {
    pub fn new(thread_id: u64, lane: u32) -> Self {
        Self { thread_id, lane }
    }

    /// DOM id of the lane cell, `lane-<thread>-<lane>`.
    pub fn cell_id(&self) -> String {
        format!("lane-{}-{}", self.thread_id, self.lane)
    }

    /// Inverse of [`LaneRef::cell_id`].
    pub fn parse_cell_id(id: &str) -> Option<Self> {
        let rest = id.strip_prefix("lane-")?;
        let (thread, lane) = rest.split_once('-')?;
        Some(Self {
            thread_id: thread.parse().ok()?,
            lane: lane.parse().ok()?,
        })
    }
}

impl std::fmt::Display for LaneRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.thread_id, self.lane)
    }
}

/// Work-group coordinates of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkGroup {
    pub x: u64,
    pub y: u64,
    pub z: u64,
}

impl WorkGroup {
    pub fn new(x: u64, y: u64, z: u64) -> Self {
        Self { x, y, z }
    }

    /// Parse backend output such as `{1, 2, 0}` or `1,2,0`.
    pub fn parse(text: &str) -> Option<Self> {
        let dims: Vec<u64> = text
            .trim()
            .trim_start_matches('{')
            .trim_end_matches('}')
            .split(',')
            .map(|d| d.trim().parse().ok())
            .collect::<Option<_>>()?;
        match dims.as_slice() {
            [x, y, z] => Some(Self::new(*x, *y, *z)),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}
