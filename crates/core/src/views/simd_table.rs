//! SIMD lane table: one row per thread, one cell per lane.

use std::fmt::Write;

use lanescope_protocol::{Lane, LaneRef, LaneSymbols, SimdSnapshot, ThreadRow};

use super::escape_html;

/// Render the whole table. Lane cells carry `id="lane-<thread>-<lane>"` so
/// `changeLane` can patch them in place.
pub fn render_simd_table(snapshot: &SimdSnapshot, symbols: &LaneSymbols) -> String {
    if snapshot.is_empty() {
        return r#"<div class="simd-empty">No SIMD threads</div>"#.to_string();
    }

    let width = snapshot.max_width();
    let mut html = String::with_capacity(snapshot.threads.len() * (width as usize * 64 + 200));
    html.push_str(r#"<table class="simd-table"><thead><tr>"#);
    for header in ["Thread", "Target", "Location", "Work-group"] {
        let _ = write!(html, "<th>{header}</th>");
    }
    let _ = write!(html, r#"<th colspan="{width}">Lanes</th></tr></thead><tbody>"#);

    for thread in &snapshot.threads {
        render_thread(&mut html, thread, symbols, width);
    }
    html.push_str("</tbody></table>");
    html
}

fn render_thread(html: &mut String, thread: &ThreadRow, symbols: &LaneSymbols, width: u32) {
    let location = thread.location.as_deref().unwrap_or("-");
    let work_group = thread
        .work_group
        .map_or_else(|| "-".to_string(), |wg| wg.to_string());
    let _ = write!(
        html,
        r#"<tr id="thread-{id}" class="thread-row"><td>{id}</td><td>{target}</td><td>{location}</td><td>{work_group}</td>"#,
        id = thread.thread_id,
        target = escape_html(&thread.target_id),
        location = escape_html(location),
    );
    for lane in &thread.lanes {
        render_lane(html, thread.thread_id, lane, symbols);
    }
    // pad narrower threads so columns line up
    for _ in thread.simd_width..width {
        html.push_str(r#"<td class="lane absent"></td>"#);
    }
    html.push_str("</tr>");
}

fn render_lane(html: &mut String, thread_id: u64, lane: &Lane, symbols: &LaneSymbols) {
    let cell = LaneRef::new(thread_id, lane.lane_id);
    let symbol = symbols
        .for_lane(lane)
        .map(|c| escape_html(&c.to_string()))
        .unwrap_or_default();
    let _ = write!(
        html,
        r#"<td id="{id}" class="{class}" title="lane {lane_id}: {state}">{symbol}</td>"#,
        id = cell.cell_id(),
        class = lane_class(lane),
        lane_id = lane.lane_id,
        state = lane.state,
    );
}

/// CSS classes of a lane cell: `lane`, the state, and `current` when
/// focused.
pub fn lane_class(lane: &Lane) -> String {
    if lane.current {
        format!("lane {} current", lane.state)
    } else {
        format!("lane {}", lane.state)
    }
}

/// Shown when no debug session is attached.
pub fn render_idle() -> String {
    r#"<div class="simd-idle">No active debug session</div>"#.to_string()
}

/// Shown for unrecoverable failures; the raw text is kept verbatim.
pub fn render_error(message: &str) -> String {
    format!(
        r#"<div class="simd-error"><pre>{}</pre></div>"#,
        escape_html(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanescope_protocol::{LaneState, WorkGroup};

    fn thread(id: u64, states: &[LaneState]) -> ThreadRow {
        ThreadRow {
            thread_id: id,
            target_id: format!("1.{id}"),
            location: Some("vadd.cl:7".into()),
            work_group: Some(WorkGroup::new(0, 1, 0)),
            simd_width: states.len() as u32,
            lanes: states
                .iter()
                .enumerate()
                .map(|(i, s)| Lane::new(i as u32, *s))
                .collect(),
        }
    }

    #[test]
    fn cells_carry_ids_classes_and_symbols() {
        let mut snapshot = SimdSnapshot::new(vec![thread(
            3,
            &[LaneState::Active, LaneState::Inactive, LaneState::Hit],
        )]);
        snapshot.select_lane(LaneRef::new(3, 2));
        let html = render_simd_table(&snapshot, &LaneSymbols::default());

        assert!(html.starts_with(r#"<table class="simd-table">"#));
        assert!(html.contains(r#"<td id="lane-3-0" class="lane active" title="lane 0: active">●</td>"#));
        assert!(html.contains(r#"<td id="lane-3-1" class="lane inactive""#));
        assert!(html.contains(r#"<td id="lane-3-2" class="lane hit current" title="lane 2: hit">◆</td>"#));
        assert!(html.contains("<td>vadd.cl:7</td><td>0,1,0</td>"));
    }

    #[test]
    fn narrow_threads_are_padded() {
        let snapshot = SimdSnapshot::new(vec![
            thread(1, &[LaneState::Active; 4]),
            thread(2, &[LaneState::Active; 2]),
        ]);
        let html = render_simd_table(&snapshot, &LaneSymbols::default());
        assert!(html.contains(r#"colspan="4""#));
        assert_eq!(html.matches(r#"class="lane absent""#).count(), 2);
    }

    #[test]
    fn blank_symbols_render_empty_cells() {
        let snapshot = SimdSnapshot::new(vec![thread(1, &[LaneState::Inactive])]);
        let symbols = LaneSymbols {
            inactive: None,
            ..LaneSymbols::default()
        };
        let html = render_simd_table(&snapshot, &symbols);
        assert!(html.contains(r#"title="lane 0: inactive"></td>"#));
    }

    #[test]
    fn idle_empty_and_error_views_differ() {
        let empty = render_simd_table(&SimdSnapshot::default(), &LaneSymbols::default());
        let idle = render_idle();
        let error = render_error("Unknown breakpoint type <x>");
        assert!(empty.contains("simd-empty"));
        assert!(idle.contains("simd-idle"));
        assert!(error.contains("simd-error"));
        assert!(error.contains("Unknown breakpoint type &lt;x&gt;"));
    }
}
