//! Thread filter compiler: structured [`ThreadFilter`] to a single backend
//! `-thread-filter` command.

use lanescope_protocol::filter::non_blank;
use lanescope_protocol::{LaneSentinel, ThreadFilter};
use tracing::warn;

use crate::mi::{MI_PREFIX, THREAD_FILTER};

/// Flag appended after a lane sentinel.
const SENTINEL_FLAG: &str = "--s";

/// Largest number of values a coordinate range may expand to.
pub const MAX_RANGE_VALUES: u64 = 1024;

/// Coordinate fields and the convenience variable each constrains.
const COORDINATE_VARS: [(CoordinateField, &str); 3] = [
    (CoordinateField::LocalWorkItem, "$_workitem_local_id"),
    (CoordinateField::GlobalWorkItem, "$_workitem_global_id"),
    (CoordinateField::WorkGroup, "$_thread_workgroup"),
];

#[derive(Debug, Clone, Copy)]
enum CoordinateField {
    LocalWorkItem,
    GlobalWorkItem,
    WorkGroup,
}

impl CoordinateField {
    fn value(self, filter: &ThreadFilter) -> Option<&str> {
        let raw = match self {
            Self::LocalWorkItem => &filter.local_work_item_value,
            Self::GlobalWorkItem => &filter.global_work_item_value,
            Self::WorkGroup => &filter.work_group_value,
        };
        non_blank(raw.as_deref())
    }
}

/// Compile a filter into a backend command, or `None` when there is
/// nothing to send.
///
/// The filter is expected to have gone through
/// [`ThreadFilter::migrate_sentinel`]; a sentinel left in `thread_value`
/// would be sent as a thread id.
pub fn compile(filter: &ThreadFilter) -> Option<String> {
    let threads = non_blank(filter.thread_value.as_deref()).and_then(thread_part);
    let lanes = lane_part(filter);

    let scope = match (threads, lanes) {
        (Some(t), Some(l)) if is_flag_only(&l) => Some(format!("{t} {l}")),
        (Some(t), Some(l)) => Some(format!("{t}:{l}")),
        (Some(t), None) => Some(t),
        (None, l) => l,
    };
    let coordinates = coordinate_conditions(filter);
    let free = non_blank(filter.filter.as_deref());

    if scope.is_none() && coordinates.is_none() && free.is_none() {
        return None;
    }

    let mut query = String::new();
    if let Some(scope) = &scope {
        query.push_str(scope);
    }
    if let Some(coordinates) = &coordinates {
        if !query.is_empty() {
            query.push(' ');
        }
        query.push_str(coordinates);
    }
    if let Some(free) = free {
        if !query.is_empty() {
            query.push_str(if is_flag_only(&query) { " " } else { " && " });
        }
        query.push('(');
        query.push_str(free);
        query.push(')');
    }

    Some(format!("{MI_PREFIX}{THREAD_FILTER} {query}"))
}

/// Comma-separated thread ids or ranges, space-joined; `*` passes through.
fn thread_part(value: &str) -> Option<String> {
    if value == "*" {
        return Some("*".to_string());
    }
    join_tokens(value)
}

fn lane_part(filter: &ThreadFilter) -> Option<String> {
    match filter.lane_sentinel() {
        // The backend already scopes to selected lanes.
        Some(LaneSentinel::SelectedLanes) => None,
        Some(sentinel) => Some(format!("{} {SENTINEL_FLAG}", sentinel.as_str())),
        None => non_blank(filter.lane_value.as_deref()).and_then(join_tokens),
    }
}

fn join_tokens(value: &str) -> Option<String> {
    let tokens: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    (!tokens.is_empty()).then(|| tokens.join(" "))
}

/// Whether the query is made of standalone flags only (`--x --y`), which
/// cannot be combined with `&&` or joined with `:`.
fn is_flag_only(query: &str) -> bool {
    let mut parts = query.split_whitespace().peekable();
    parts.peek().is_some() && parts.all(|p| p.len() > 2 && p.starts_with("--"))
}

/// All coordinate clauses joined with `&&`, or `None` if there are none.
pub fn coordinate_conditions(filter: &ThreadFilter) -> Option<String> {
    let groups: Vec<String> = COORDINATE_VARS
        .iter()
        .filter_map(|(field, var)| field.value(filter).and_then(|v| dimension_clauses(var, v)))
        .collect();
    (!groups.is_empty()).then(|| groups.join(" && "))
}

/// Clauses for one coordinate variable, e.g. `1,*,3` on
/// `$_workitem_local_id` gives
/// `($_workitem_local_id[0] == 1) && ($_workitem_local_id[2] == 3)`.
fn dimension_clauses(var: &str, value: &str) -> Option<String> {
    let clauses: Vec<String> = value
        .split([',', '.'])
        .map(str::trim)
        .enumerate()
        .filter(|(_, token)| !token.is_empty() && *token != "*")
        .filter_map(|(dim, token)| {
            if token.contains('-') {
                let values = expand_range(token);
                if values.is_empty() {
                    return None;
                }
                let alternatives: Vec<String> = values
                    .iter()
                    .map(|v| format!("{var}[{dim}] == {v}"))
                    .collect();
                Some(format!("({})", alternatives.join(" || ")))
            } else {
                Some(format!("({var}[{dim}] == {token})"))
            }
        })
        .collect();
    (!clauses.is_empty()).then(|| clauses.join(" && "))
}

/// Expand an inclusive `start-end` range. Non-numeric, reversed or
/// oversized ranges (more than [`MAX_RANGE_VALUES`]) expand to nothing.
pub fn expand_range(token: &str) -> Vec<String> {
    let Some((start, end)) = token.split_once('-') else {
        return Vec::new();
    };
    match (start.trim().parse::<u64>(), end.trim().parse::<u64>()) {
        (Ok(start), Ok(end)) if start <= end && end - start >= MAX_RANGE_VALUES => {
            warn!(range = token, max = MAX_RANGE_VALUES, "coordinate range too large, ignoring");
            Vec::new()
        }
        (Ok(start), Ok(end)) if start <= end => (start..=end).map(|v| v.to_string()).collect(),
        _ => Vec::new(),
    }
}
