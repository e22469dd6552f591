//! The watch view's row model.
//!
//! Rows are kept flat in display (pre-order) order: a row's descendants are
//! the contiguous run after it with a greater depth. Every row moves through
//!
//! ```text
//!   Unexpanded ──toggle──▶ PendingFetch ──complete──▶ Expanded ◀──toggle──▶ Collapsed
//!        ▲                      │
//!        └──────abort───────────┘
//! ```
//!
//! Collapsing only flips visibility; children are fetched once.

use lanescope_protocol::{VariableNode, WatchRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::engine::WatchResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("no watch row `{0}`")]
    UnknownRow(String),
    #[error("row `{0}` has no expansion in flight")]
    NotPending(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowState {
    Unexpanded,
    PendingFetch,
    Expanded,
    Collapsed,
}

impl RowState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unexpanded => "unexpanded",
            Self::PendingFetch => "pending",
            Self::Expanded => "expanded",
            Self::Collapsed => "collapsed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRow {
    /// Anchor id; the backend variable-object name.
    pub id: String,
    pub parent: Option<String>,
    /// Owning watch request.
    pub watch_id: String,
    pub depth: u32,
    pub node: VariableNode,
    pub state: RowState,
    pub visible: bool,
    /// Set on a root row whose expression could not be evaluated.
    pub error: Option<String>,
}

impl WatchRow {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// What the caller must do after a toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle {
    /// Fetch the children of backend object `name`, then call
    /// [`WatchTree::complete_expand`] or [`WatchTree::abort_expand`].
    Fetch { name: String },
    /// Hide these rows.
    Collapse { rows: Vec<String> },
    /// Show these rows again.
    Expand { rows: Vec<String> },
    /// An expansion of this row is already in flight.
    Busy,
    /// Nothing to expand.
    Leaf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTree {
    rows: Vec<WatchRow>,
}

impl WatchTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[WatchRow] {
        &self.rows
    }

    pub fn row(&self, id: &str) -> Option<&WatchRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &WatchRow> {
        self.rows.iter().filter(|r| r.visible)
    }

    /// Backend names of every root row.
    pub fn root_names(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.is_root())
            .map(|r| r.id.clone())
            .collect()
    }

    /// Append a resolved watch: its root row and one row per lane.
    /// An existing watch with the same id is replaced.
    pub fn insert_watch(&mut self, result: &WatchResult) -> Vec<WatchRow> {
        let watch_id = result.request.unique_id.clone();
        self.remove_watch(&watch_id);

        let mut root = result.root.clone();
        if root.exp.is_empty() {
            root.exp = result.request.expression.clone();
        }
        let state = if root.has_children() {
            RowState::Expanded
        } else {
            RowState::Unexpanded
        };
        let root_id = root.name.clone();
        let start = self.rows.len();
        self.rows.push(WatchRow {
            id: root_id.clone(),
            parent: None,
            watch_id: watch_id.clone(),
            depth: 0,
            node: root,
            state,
            visible: true,
            error: None,
        });
        self.rows.extend(result.lanes.iter().map(|lane| WatchRow {
            id: lane.name.clone(),
            parent: Some(root_id.clone()),
            watch_id: watch_id.clone(),
            depth: 1,
            node: lane.clone(),
            state: RowState::Unexpanded,
            visible: true,
            error: None,
        }));
        self.rows[start..].to_vec()
    }

    /// Append a root row for a request the backend could not evaluate.
    pub fn insert_failed(&mut self, request: &WatchRequest, message: impl Into<String>) -> WatchRow {
        self.remove_watch(&request.unique_id);
        let row = WatchRow {
            id: request.var_name(),
            parent: None,
            watch_id: request.unique_id.clone(),
            depth: 0,
            node: VariableNode {
                name: request.var_name(),
                exp: request.expression.clone(),
                ..VariableNode::default()
            },
            state: RowState::Unexpanded,
            visible: true,
            error: Some(message.into()),
        };
        self.rows.push(row.clone());
        row
    }

    pub fn toggle(&mut self, id: &str) -> Result<Toggle, TreeError> {
        let index = self.index(id)?;
        let row = &mut self.rows[index];
        match row.state {
            RowState::Unexpanded if row.error.is_some() || !row.node.has_children() => {
                Ok(Toggle::Leaf)
            }
            RowState::Unexpanded => {
                row.state = RowState::PendingFetch;
                Ok(Toggle::Fetch {
                    name: row.node.name.clone(),
                })
            }
            RowState::PendingFetch => Ok(Toggle::Busy),
            RowState::Expanded => {
                row.state = RowState::Collapsed;
                let end = self.subtree_end(index);
                let mut hidden = Vec::new();
                for descendant in &mut self.rows[index + 1..end] {
                    if descendant.visible {
                        descendant.visible = false;
                        hidden.push(descendant.id.clone());
                    }
                }
                Ok(Toggle::Collapse { rows: hidden })
            }
            RowState::Collapsed => {
                row.state = RowState::Expanded;
                let shown_here = !self.collapsed_above(index);
                let end = self.subtree_end(index);
                let mut shown = Vec::new();
                for i in index + 1..end {
                    let visible = shown_here && !self.collapsed_between(index, i);
                    if visible && !self.rows[i].visible {
                        shown.push(self.rows[i].id.clone());
                    }
                    self.rows[i].visible = visible;
                }
                Ok(Toggle::Expand { rows: shown })
            }
        }
    }

    /// Splice fetched children after the anchor's subtree. Returns the new
    /// rows in display order.
    pub fn complete_expand(
        &mut self,
        id: &str,
        children: Vec<VariableNode>,
    ) -> Result<Vec<WatchRow>, TreeError> {
        let index = self.index(id)?;
        if self.rows[index].state != RowState::PendingFetch {
            return Err(TreeError::NotPending(id.to_string()));
        }
        self.rows[index].state = RowState::Expanded;

        let visible = !self.collapsed_above(index) && self.rows[index].visible;
        let anchor = &self.rows[index];
        let (depth, watch_id) = (anchor.depth + 1, anchor.watch_id.clone());
        let new_rows: Vec<WatchRow> = children
            .into_iter()
            .filter(|child| {
                let duplicate = self.row(&child.name).is_some();
                if duplicate {
                    tracing::warn!(name = %child.name, "child already in the tree, skipping");
                }
                !duplicate
            })
            .map(|child| WatchRow {
                id: child.name.clone(),
                parent: Some(id.to_string()),
                watch_id: watch_id.clone(),
                depth,
                node: child,
                state: RowState::Unexpanded,
                visible,
                error: None,
            })
            .collect();

        let end = self.subtree_end(index);
        self.rows.splice(end..end, new_rows.iter().cloned());
        Ok(new_rows)
    }

    /// Return a pending row to `Unexpanded` after a failed fetch.
    pub fn abort_expand(&mut self, id: &str) -> Result<(), TreeError> {
        let index = self.index(id)?;
        let row = &mut self.rows[index];
        if row.state != RowState::PendingFetch {
            return Err(TreeError::NotPending(id.to_string()));
        }
        row.state = RowState::Unexpanded;
        Ok(())
    }

    /// Remove a watch's rows. Returns the removed ids, root first.
    pub fn remove_watch(&mut self, unique_id: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.rows.retain(|row| {
            let keep = row.watch_id != unique_id;
            if !keep {
                removed.push(row.id.clone());
            }
            keep
        });
        removed
    }

    /// Drop every row. Returns the root names.
    pub fn clear(&mut self) -> Vec<String> {
        let roots = self.root_names();
        self.rows.clear();
        roots
    }

    fn index(&self, id: &str) -> Result<usize, TreeError> {
        self.rows
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| TreeError::UnknownRow(id.to_string()))
    }

    fn subtree_end(&self, index: usize) -> usize {
        let depth = self.rows[index].depth;
        self.rows[index + 1..]
            .iter()
            .position(|r| r.depth <= depth)
            .map_or(self.rows.len(), |offset| index + 1 + offset)
    }

    fn parent_index(&self, index: usize) -> Option<usize> {
        let parent = self.rows[index].parent.as_deref()?;
        self.rows[..index].iter().rposition(|r| r.id == parent)
    }

    /// Whether any strict ancestor of `index` is collapsed.
    fn collapsed_above(&self, index: usize) -> bool {
        let mut cursor = self.parent_index(index);
        while let Some(i) = cursor {
            if self.rows[i].state == RowState::Collapsed {
                return true;
            }
            cursor = self.parent_index(i);
        }
        false
    }

    /// Whether a row strictly between `ancestor` and `index` is collapsed.
    fn collapsed_between(&self, ancestor: usize, index: usize) -> bool {
        let mut cursor = self.parent_index(index);
        while let Some(i) = cursor {
            if i == ancestor {
                return false;
            }
            if self.rows[i].state == RowState::Collapsed {
                return true;
            }
            cursor = self.parent_index(i);
        }
        false
    }
}
