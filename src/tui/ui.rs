//! Rendering for the routine picker.

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::RoutinePicker;

/// Draw the picker: search box, routine list and key hints.
pub fn draw(frame: &mut Frame, picker: &RoutinePicker) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Search
            Constraint::Min(3),    // Routines
            Constraint::Length(1), // Hints
        ])
        .split(frame.area());

    let search = Paragraph::new(Line::from(vec![
        Span::styled("> ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(picker.query()),
    ]))
    .block(Block::default().borders(Borders::ALL).title(" Routine "));
    frame.render_widget(search, chunks[0]);

    let items: Vec<ListItem> = picker
        .visible()
        .map(|(name, command)| {
            ListItem::new(Line::from(vec![
                Span::styled(name.to_string(), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw("  "),
                Span::styled(command.to_string(), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();
    let shown = items.len();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Routines ({shown}/{}) ", picker.total())),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ");

    let mut state = ListState::default().with_selected((shown > 0).then_some(picker.selected_index()));
    frame.render_stateful_widget(list, chunks[1], &mut state);

    let hints = Paragraph::new(Line::from(Span::styled(
        " enter run · ↑/↓ move · esc cancel",
        Style::default().fg(Color::DarkGray),
    )));
    frame.render_widget(hints, chunks[2]);
}
