//! Machine-interface commands sent through `evaluate`, and a parser for the
//! semi-structured `key=value,...` / `[child={...},...]` replies.
//!
//! Replies are parsed by field markers rather than offsets: a field ends
//! where the earliest next known `,key=` marker begins, because the backend
//! omits absent fields instead of sending them empty.

use lanescope_protocol::VariableNode;
use thiserror::Error;

/// Marks an `evaluate` expression as a structured command.
pub const MI_PREFIX: &str = "-exec ";
pub const THREAD_FILTER: &str = "-thread-filter";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiParseError {
    #[error("reply has no `{field}` field: {reply:?}")]
    MissingField { field: &'static str, reply: String },
}

/// A structured backend command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiCommand {
    VarCreate {
        name: String,
        /// Hex lane bitmask; `None` creates an unscoped object.
        lanes_mask: Option<String>,
        expression: String,
    },
    VarDelete {
        name: String,
    },
    VarListChildren {
        name: String,
    },
    VarInfoPathExpression {
        name: String,
    },
    ThreadSimdWidth,
    /// Focus the debugger on one lane of a thread.
    SelectLane {
        thread_id: u64,
        lane: u32,
    },
}

impl std::fmt::Display for MiCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(MI_PREFIX)?;
        match self {
            Self::VarCreate {
                name,
                lanes_mask: Some(mask),
                expression,
            } => write!(f, "-var-create --lanes-mask {mask} {name} * {expression}"),
            Self::VarCreate {
                name,
                lanes_mask: None,
                expression,
            } => write!(f, "-var-create {name} * {expression}"),
            Self::VarDelete { name } => write!(f, "-var-delete {name}"),
            Self::VarListChildren { name } => write!(f, "-var-list-children --all-values {name}"),
            Self::VarInfoPathExpression { name } => write!(f, "-var-info-path-expression {name}"),
            Self::ThreadSimdWidth => f.write_str("-thread-simd-width"),
            Self::SelectLane { thread_id, lane } => write!(f, "thread {thread_id}:{lane}"),
        }
    }
}

/// Fields of a variable-object record, in the order the backend sends them.
const VAR_FIELDS: &[&str] = &[
    "name",
    "exp",
    "numchild",
    "value",
    "type",
    "thread-id",
    "lane",
    "has_more",
    "dynamic",
    "displayhint",
];

/// Extract `key` from a flat record, stopping at the earliest next marker
/// among `known`. Quoted values are unquoted. Markers inside quoted strings
/// are part of the value.
pub fn field(record: &str, key: &str, known: &[&str]) -> Option<String> {
    let start = field_start(record, key)?;
    let rest = &record[start..];
    let end = known
        .iter()
        .filter(|k| **k != key)
        .filter_map(|k| find_unquoted(rest, &format!(",{k}=")))
        .min()
        .unwrap_or(rest.len());
    Some(unquote(rest[..end].trim()))
}

fn field_start(record: &str, key: &str) -> Option<usize> {
    let bare = format!("{key}=");
    if record.starts_with(&bare) {
        return Some(bare.len());
    }
    let marker = format!(",{key}=");
    find_unquoted(record, &marker).map(|pos| pos + marker.len())
}

/// Tracks whether a byte scan is inside a double-quoted string.
#[derive(Default)]
struct Quotes {
    in_string: bool,
    escaped: bool,
}

impl Quotes {
    /// Feed one byte; true when it belongs to a quoted string, quotes
    /// included.
    fn quoted(&mut self, b: u8) -> bool {
        if self.in_string {
            match b {
                _ if self.escaped => self.escaped = false,
                b'\\' => self.escaped = true,
                b'"' => self.in_string = false,
                _ => {}
            }
            return true;
        }
        if b == b'"' {
            self.in_string = true;
            return true;
        }
        false
    }
}

/// Byte offset of the first `marker` outside quoted strings.
fn find_unquoted(text: &str, marker: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut quotes = Quotes::default();
    (0..bytes.len())
        .find(|&i| !quotes.quoted(bytes[i]) && bytes[i..].starts_with(marker.as_bytes()))
}

/// Strip surrounding double quotes and undo `\"` / `\\` escapes.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Drop a leading result class such as `^done,`.
fn strip_result_class(reply: &str) -> &str {
    let reply = reply.trim();
    match reply.strip_prefix('^') {
        Some(rest) => rest.split_once(',').map_or("", |(_, body)| body),
        None => reply,
    }
}

/// Lane encoded as the numeric suffix after the final `-` of a name.
pub fn lane_from_name(name: &str) -> Option<u32> {
    let (_, suffix) = name.rsplit_once('-')?;
    suffix.parse().ok()
}

/// Parse one variable-object record (a `-var-create` reply or the body of a
/// `child={...}`).
pub fn parse_variable(record: &str) -> Result<VariableNode, MiParseError> {
    let record = strip_result_class(record);
    let get = |key| field(record, key, VAR_FIELDS);
    let name = get("name")
        .filter(|n| !n.is_empty())
        .ok_or_else(|| MiParseError::MissingField {
            field: "name",
            reply: record.to_string(),
        })?;
    let lane = get("lane")
        .and_then(|l| l.parse().ok())
        .or_else(|| lane_from_name(&name));
    Ok(VariableNode {
        exp: get("exp").unwrap_or_default(),
        numchild: get("numchild").and_then(|n| n.parse().ok()).unwrap_or(0),
        value: get("value"),
        type_name: get("type").unwrap_or_default(),
        thread_id: get("thread-id").and_then(|t| t.parse().ok()),
        lane,
        has_more: get("has_more").is_some_and(|h| h != "0"),
        name,
    })
}

/// Split a children reply into its `child={...}` record bodies.
///
/// Boundaries are only recognised outside quoted strings; each record ends
/// at its matching close brace.
pub fn child_records(reply: &str) -> Vec<&str> {
    const OPEN: &[u8] = b"child={";
    let bytes = reply.as_bytes();
    let mut records = Vec::new();
    let mut quotes = Quotes::default();
    let mut i = 0;

    while i < bytes.len() {
        if quotes.quoted(bytes[i]) {
            i += 1;
            continue;
        }
        let boundary = bytes[i..].starts_with(OPEN)
            && (i == 0 || !bytes[i - 1].is_ascii_alphanumeric() && bytes[i - 1] != b'_');
        if !boundary {
            i += 1;
            continue;
        }
        let body_start = i + OPEN.len();
        let body_end = matching_brace(reply, body_start).unwrap_or(reply.len());
        records.push(&reply[body_start..body_end]);
        i = (body_end + 1).min(bytes.len());
    }
    records
}

/// Index of the `}` closing a brace opened just before `start`.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut quotes = Quotes::default();
    for (offset, &b) in text.as_bytes()[start..].iter().enumerate() {
        if quotes.quoted(b) {
            continue;
        }
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse every child of a `-var-list-children` reply. Records without a
/// name are skipped.
pub fn parse_children(reply: &str) -> Vec<VariableNode> {
    child_records(reply)
        .into_iter()
        .filter_map(|record| match parse_variable(record) {
            Ok(node) => Some(node),
            Err(err) => {
                tracing::warn!(%err, "skipping malformed child record");
                None
            }
        })
        .collect()
}

/// Path expression from a `-var-info-path-expression` reply.
pub fn parse_path_expression(reply: &str) -> Option<String> {
    field(strip_result_class(reply), "path_expr", &["path_expr"]).filter(|p| !p.is_empty())
}

/// SIMD width from a `-thread-simd-width` reply (`width="16"` or `16`).
pub fn parse_simd_width(reply: &str) -> Option<u32> {
    let body = strip_result_class(reply);
    ["simd-width", "width"]
        .iter()
        .find_map(|key| field(body, key, &["simd-width", "width"]))
        .or_else(|| Some(unquote(body.trim())))
        .and_then(|w| w.trim().parse().ok())
}
