use serde::{Deserialize, Serialize};

/// A user-registered watch expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    /// Opaque, time-ordered id.
    pub unique_id: String,
    pub expression: String,
}

impl WatchRequest {
    pub fn new(unique_id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            expression: expression.into(),
        }
    }

    /// Backend variable-object name for this request. Contains no `-`, so
    /// the lane suffix of its children stays unambiguous.
    pub fn var_name(&self) -> String {
        let id: String = self
            .unique_id
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        format!("simd_{id}")
    }
}

/// One node of a watch expression's per-lane value tree, as reported by
/// the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableNode {
    /// Backend variable-object handle.
    pub name: String,
    /// Display expression.
    pub exp: String,
    pub numchild: u32,
    pub value: Option<String>,
    /// Empty for anonymous aggregates (unnamed unions / structs).
    #[serde(rename = "type")]
    pub type_name: String,
    pub thread_id: Option<u64>,
    pub lane: Option<u32>,
    pub has_more: bool,
}

impl VariableNode {
    pub fn is_anonymous(&self) -> bool {
        self.type_name.is_empty()
    }

    pub fn has_children(&self) -> bool {
        self.numchild > 0 || self.has_more
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_name_strips_separators() {
        let request = WatchRequest::new("0190-abcd-ef", "x");
        assert_eq!(request.var_name(), "simd_0190abcdef");
        assert!(!request.var_name().contains('-'));
    }

    #[test]
    fn type_field_uses_backend_key() {
        let node = VariableNode {
            name: "var1-0".into(),
            type_name: "int".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "int");
        assert!(!node.is_anonymous());
        assert!(VariableNode::default().is_anonymous());
    }
}
