use serde::{Deserialize, Serialize};

use crate::filter::ThreadFilter;

/// Which rendering surface a message concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewKind {
    SimdTable,
    SimdWatch,
}

impl ViewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SimdTable => "simdTable",
            Self::SimdWatch => "simdWatch",
        }
    }
}

/// A message from the core to the rendering surface.
///
/// Incremental variants carry only the fragment for one anchor; only
/// `Change` and `RefreshWatches` replace a whole view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum CoreMessage {
    /// Replace the SIMD table.
    Change { html: String },

    /// Patch the previous and new lane cells after a selection.
    ChangeLane {
        previous_lane: Option<String>,
        current_lane: String,
        view_type: ViewKind,
    },

    /// Append watch rows at the end of the watch table.
    AddSimdWatch { html: String },

    /// Drop a watch row and its descendants.
    #[serde(rename = "removeSIMDWatch")]
    RemoveSimdWatch { unique_id: String },

    /// Splice child rows directly after the row `anchor`'s subtree.
    ExpandVarObject { anchor: String, html: String },

    /// Show or hide rows without refetching.
    SetRowVisibility { rows: Vec<String>, visible: bool },

    /// Replace the watch table after a stop.
    RefreshWatches { html: String },

    ClearSimdWatches,

    PathExpression { name: String, expression: String },

    Error { message: String },
}

/// A user-interaction event from the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ViewEvent {
    ChangeLane {
        /// Cell id of the newly selected lane.
        id: String,
        previous_lane: Option<String>,
        view_type: ViewKind,
    },

    AddSimdWatch {
        #[serde(default)]
        unique_id: Option<String>,
        expression: String,
    },

    #[serde(rename = "removeSIMDWatch")]
    RemoveSimdWatch { unique_id: String },

    /// Toggle the row `id` (fetching its children on first expansion).
    ExpandVarObject { id: String },

    /// The view's full serialised HTML after applying an update.
    #[serde(rename = "saveHTMLState")]
    SaveHtmlState { view_type: ViewKind, html: String },

    ApplyFilter { filter: ThreadFilter },

    ClearFilter,

    ClearSimdWatches,

    Refresh,

    ResolvePath { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_command_tags() {
        let event: ViewEvent = serde_json::from_str(
            r#"{"command":"removeSIMDWatch","uniqueId":"0190abc"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ViewEvent::RemoveSimdWatch {
                unique_id: "0190abc".into()
            }
        );

        let event: ViewEvent = serde_json::from_str(
            r#"{"command":"changeLane","id":"lane-1-3","previousLane":null,"viewType":"simdTable"}"#,
        )
        .unwrap();
        assert!(matches!(event, ViewEvent::ChangeLane { ref id, .. } if id == "lane-1-3"));

        let event: ViewEvent =
            serde_json::from_str(r#"{"command":"saveHTMLState","viewType":"simdWatch","html":"<tr/>"}"#)
                .unwrap();
        assert!(matches!(event, ViewEvent::SaveHtmlState { view_type: ViewKind::SimdWatch, .. }));
    }

    #[test]
    fn add_watch_without_id() {
        let event: ViewEvent =
            serde_json::from_str(r#"{"command":"addSimdWatch","expression":"a[i]"}"#).unwrap();
        assert_eq!(
            event,
            ViewEvent::AddSimdWatch {
                unique_id: None,
                expression: "a[i]".into()
            }
        );
    }

    #[test]
    fn core_messages_serialize_camel_case() {
        let json = serde_json::to_value(CoreMessage::ChangeLane {
            previous_lane: Some("lane-1-0".into()),
            current_lane: "lane-1-4".into(),
            view_type: ViewKind::SimdTable,
        })
        .unwrap();
        assert_eq!(json["command"], "changeLane");
        assert_eq!(json["previousLane"], "lane-1-0");
        assert_eq!(json["currentLane"], "lane-1-4");
        assert_eq!(json["viewType"], "simdTable");

        let json = serde_json::to_value(CoreMessage::ClearSimdWatches).unwrap();
        assert_eq!(json["command"], "clearSimdWatches");
    }
}
