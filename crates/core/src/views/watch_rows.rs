//! Watch table rows.

use std::fmt::Write;

use crate::watch::{RowState, WatchRow, WatchTree};

use super::escape_html;

/// The full watch table, used on refresh.
pub fn render_watch_table(tree: &WatchTree) -> String {
    format!(
        r#"<table class="simd-watch"><thead><tr><th></th><th>Expression</th><th>Lane</th><th>Value</th><th>Type</th></tr></thead><tbody id="simd-watch-rows">{}</tbody></table>"#,
        render_rows(tree.rows())
    )
}

/// Row fragments in display order, for appending or splicing after an
/// anchor.
pub fn render_rows<R: std::borrow::Borrow<WatchRow>>(rows: &[R]) -> String {
    let mut html = String::with_capacity(rows.len() * 256);
    for row in rows {
        render_row(&mut html, row.borrow());
    }
    html
}

fn render_row(html: &mut String, row: &WatchRow) {
    let mut class = format!("watch-row {}", row.state.as_str());
    if !row.visible {
        class.push_str(" hidden");
    }
    if row.error.is_some() {
        class.push_str(" failed");
    }
    let _ = write!(
        html,
        r#"<tr id="{id}" class="{class}" data-watch="{watch}" data-depth="{depth}""#,
        id = escape_html(&row.id),
        watch = escape_html(&row.watch_id),
        depth = row.depth,
    );
    if let Some(parent) = &row.parent {
        let _ = write!(html, r#" data-parent="{}""#, escape_html(parent));
    }
    html.push('>');

    let _ = write!(
        html,
        r#"<td class="toggle">{}</td><td class="exp" style="padding-left:{}em">{}</td>"#,
        toggle_glyph(row),
        row.depth,
        escape_html(&row.node.exp),
    );
    let lane = row.node.lane.map_or_else(|| "-".to_string(), |l| l.to_string());
    let _ = write!(html, r#"<td class="lane">{lane}</td>"#);
    match &row.error {
        Some(error) => {
            let _ = write!(
                html,
                r#"<td class="value"><span class="error">{}</span></td>"#,
                escape_html(error)
            );
        }
        None => {
            let value = row.node.value.as_deref().unwrap_or("");
            let _ = write!(html, r#"<td class="value">{}</td>"#, escape_html(value));
        }
    }
    let _ = write!(
        html,
        r#"<td class="type">{}</td></tr>"#,
        escape_html(&row.node.type_name)
    );
}

fn toggle_glyph(row: &WatchRow) -> &'static str {
    match row.state {
        _ if row.error.is_some() => "",
        RowState::Unexpanded if !row.node.has_children() => "",
        RowState::Unexpanded | RowState::Collapsed => "▸",
        RowState::PendingFetch => "…",
        RowState::Expanded => "▾",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::WatchResult;
    use lanescope_protocol::{VariableNode, WatchRequest};

    fn tree() -> WatchTree {
        let mut tree = WatchTree::new();
        tree.insert_watch(&WatchResult {
            request: WatchRequest::new("w1", "v<int>"),
            root: VariableNode {
                name: "simd_w1".into(),
                numchild: 1,
                type_name: "int".into(),
                ..VariableNode::default()
            },
            lanes: vec![VariableNode {
                name: "simd_w1-0".into(),
                exp: "0".into(),
                value: Some("42".into()),
                type_name: "int".into(),
                lane: Some(0),
                ..VariableNode::default()
            }],
        });
        tree
    }

    #[test]
    fn rows_carry_anchor_and_parent() {
        let html = render_watch_table(&tree());
        assert!(html.contains(r#"<tbody id="simd-watch-rows">"#));
        assert!(html.contains(
            r#"<tr id="simd_w1" class="watch-row expanded" data-watch="w1" data-depth="0">"#
        ));
        assert!(html.contains(r#"data-parent="simd_w1">"#));
        assert!(html.contains("v&lt;int&gt;"));
        assert!(html.contains(r#"<td class="lane">0</td><td class="value">42</td>"#));
    }

    #[test]
    fn failed_and_hidden_rows_are_marked() {
        let mut tree = tree();
        tree.toggle("simd_w1").unwrap();
        tree.insert_failed(&WatchRequest::new("w2", "nope"), "No symbol \"nope\"");
        let html = render_rows(tree.rows());
        assert!(html.contains(r#"class="watch-row unexpanded hidden""#));
        assert!(html.contains(r#"class="watch-row unexpanded failed""#));
        assert!(html.contains("No symbol &quot;nope&quot;"));
    }
}
