use std::io::stdout;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use lanescope_core::watch::WatchTree;
use lanescope_protocol::{Lane, LaneState, LaneSymbols, SimdSnapshot};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Row, Table},
};

fn state_color(state: LaneState) -> Color {
    match state {
        LaneState::Active => Color::Green,
        LaneState::Inactive => Color::DarkGray,
        LaneState::Hit => Color::Red,
    }
}

fn lane_span(lane: &Lane, symbols: &LaneSymbols) -> Span<'static> {
    let symbol = symbols.for_lane(lane).unwrap_or(' ');
    let mut style = Style::default().fg(state_color(lane.state));
    if lane.current {
        style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
    }
    Span::styled(format!("{symbol} "), style)
}

fn thread_rows<'a>(snapshot: &'a SimdSnapshot, symbols: &LaneSymbols) -> Vec<Row<'a>> {
    snapshot
        .threads
        .iter()
        .map(|thread| {
            let lanes: Vec<Span> = thread.lanes.iter().map(|l| lane_span(l, symbols)).collect();
            Row::new(vec![
                Cell::from(thread.thread_id.to_string()),
                Cell::from(thread.target_id.as_str()),
                Cell::from(thread.location.as_deref().unwrap_or("-")),
                Cell::from(
                    thread
                        .work_group
                        .map_or_else(|| "-".to_string(), |wg| wg.to_string()),
                ),
                Cell::from(Line::from(lanes)),
            ])
        })
        .collect()
}

fn watch_rows(tree: &WatchTree) -> Vec<Row<'_>> {
    tree.visible_rows()
        .map(|row| {
            let indent = "  ".repeat(row.depth as usize);
            let value = match &row.error {
                Some(error) => Cell::from(error.as_str()).style(Style::default().fg(Color::Red)),
                None => Cell::from(row.node.value.as_deref().unwrap_or("")),
            };
            Row::new(vec![
                Cell::from(format!("{indent}{}", row.node.exp)),
                Cell::from(row.node.lane.map_or_else(|| "-".to_string(), |l| l.to_string())),
                value,
                Cell::from(row.node.type_name.as_str()),
            ])
        })
        .collect()
}

pub fn render_tui(snapshot: &SimdSnapshot, tree: &WatchTree, symbols: &LaneSymbols) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut scroll: usize = 0;
    let lane_width = u16::try_from(snapshot.max_width().saturating_mul(2)).unwrap_or(u16::MAX);
    let current = snapshot
        .current_lane()
        .map_or_else(|| "none".to_string(), |lane| lane.to_string());

    loop {
        terminal.draw(|frame| {
            let [header_area, table_area, watch_area] = Layout::vertical([
                Constraint::Length(1),
                Constraint::Percentage(60),
                Constraint::Min(3),
            ])
            .areas(frame.area());

            let header = Block::default()
                .title(format!(
                    " lanescope | {} threads | current {current} | ↑↓ scroll | q quit ",
                    snapshot.threads.len()
                ))
                .style(Style::default().fg(Color::White).bg(Color::DarkGray));
            frame.render_widget(header, header_area);

            let rows: Vec<Row> = thread_rows(snapshot, symbols)
                .into_iter()
                .skip(scroll)
                .collect();
            let table = Table::new(
                rows,
                [
                    Constraint::Length(8),
                    Constraint::Length(12),
                    Constraint::Length(18),
                    Constraint::Length(10),
                    Constraint::Min(lane_width),
                ],
            )
            .header(
                Row::new(vec!["Thread", "Target", "Location", "Work-group", "Lanes"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .block(Block::default().borders(Borders::ALL).title(" SIMD lanes "));
            frame.render_widget(table, table_area);

            let watches = Table::new(
                watch_rows(tree),
                [
                    Constraint::Percentage(40),
                    Constraint::Length(6),
                    Constraint::Percentage(35),
                    Constraint::Min(8),
                ],
            )
            .header(
                Row::new(vec!["Expression", "Lane", "Value", "Type"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .block(Block::default().borders(Borders::ALL).title(" SIMD watch "));
            frame.render_widget(watches, watch_area);
        })?;

        if event::poll(std::time::Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Up => scroll = scroll.saturating_sub(1),
                KeyCode::Down => {
                    scroll = (scroll + 1).min(snapshot.threads.len().saturating_sub(1));
                }
                _ => {}
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}
