use serde::{Deserialize, Serialize};

/// Lane-scope sentinel values accepted by the backend as standalone flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaneSentinel {
    /// Only lanes that are already active (backend default).
    #[serde(rename = "--selected-lanes")]
    SelectedLanes,
    #[serde(rename = "--all-lanes")]
    AllLanes,
}

impl LaneSentinel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelectedLanes => "--selected-lanes",
            Self::AllLanes => "--all-lanes",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "--selected-lanes" => Some(Self::SelectedLanes),
            "--all-lanes" => Some(Self::AllLanes),
            _ => None,
        }
    }
}

/// User-entered thread filter, persisted as flat key/value state.
///
/// Every field is optional; blank strings are treated like absent ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadFilter {
    /// Free-form backend expression.
    pub filter: Option<String>,
    pub thread_value: Option<String>,
    pub lane_value: Option<String>,
    pub local_work_item_value: Option<String>,
    pub global_work_item_value: Option<String>,
    pub work_group_value: Option<String>,
}

impl ThreadFilter {
    /// Move a lane sentinel typed into the thread selector over to the lane
    /// scope. Idempotent.
    pub fn migrate_sentinel(&mut self) {
        if let Some(sentinel) = self.thread_value.as_deref().and_then(LaneSentinel::parse) {
            self.lane_value = Some(sentinel.as_str().to_string());
            self.thread_value = None;
        }
    }

    /// Builder-style [`ThreadFilter::migrate_sentinel`].
    pub fn migrated(mut self) -> Self {
        self.migrate_sentinel();
        self
    }

    /// Lane scope after defaulting: an empty lane value means
    /// `--selected-lanes`.
    pub fn lane_sentinel(&self) -> Option<LaneSentinel> {
        match non_blank(self.lane_value.as_deref()) {
            None => Some(LaneSentinel::SelectedLanes),
            Some(value) => LaneSentinel::parse(value),
        }
    }
}

/// `Some(trimmed)` when the value has any non-whitespace content.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
