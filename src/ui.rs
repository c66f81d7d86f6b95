//! Terminal rendering. Owns sort column, scroll offset, and selection as
//! a plain value threaded through the render path instead of process-wide
//! state — the redesign the original ncurses display's static globals
//! called for.

use ratatui::{
    layout::{Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table},
    Frame,
};

use crate::config::SortColumn;
use crate::keybindings::get_status_bar_keybindings;
use crate::netstat::{ProcessSnapshot, Snapshot};

pub struct AppState {
    pub snapshot: Snapshot,
    pub sort_column: SortColumn,
    pub list_state: ListState,
    pub show_help: bool,
}

impl AppState {
    pub fn new(sort_column: SortColumn) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        Self {
            snapshot: Snapshot::default(),
            sort_column,
            list_state,
            show_help: false,
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshot = snapshot;
        self.sort_processes();
        let len = self.snapshot.processes.len();
        if len == 0 {
            self.list_state.select(None);
        } else {
            let current = self.list_state.selected().unwrap_or(0).min(len - 1);
            self.list_state.select(Some(current));
        }
    }

    pub fn select_next(&mut self) {
        let len = self.snapshot.processes.len();
        if len == 0 {
            return;
        }
        let next = self.list_state.selected().map_or(0, |i| (i + 1) % len);
        self.list_state.select(Some(next));
    }

    pub fn select_previous(&mut self) {
        let len = self.snapshot.processes.len();
        if len == 0 {
            return;
        }
        let prev = self
            .list_state
            .selected()
            .map_or(0, |i| if i == 0 { len - 1 } else { i - 1 });
        self.list_state.select(Some(prev));
    }

    pub fn cycle_sort(&mut self) {
        self.sort_column = match self.sort_column {
            SortColumn::Pid => SortColumn::Command,
            SortColumn::Command => SortColumn::BytesRx,
            SortColumn::BytesRx => SortColumn::BytesTx,
            SortColumn::BytesTx => SortColumn::Pid,
        };
        self.sort_processes();
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    fn sort_processes(&mut self) {
        match self.sort_column {
            SortColumn::Pid => self.snapshot.processes.sort_by_key(|p| p.pid),
            SortColumn::Command => self
                .snapshot
                .processes
                .sort_by(|a, b| a.command.cmp(&b.command)),
            SortColumn::BytesRx => self
                .snapshot
                .processes
                .sort_by(|a, b| b.stat.bps_rx.partial_cmp(&a.stat.bps_rx).unwrap()),
            SortColumn::BytesTx => self
                .snapshot
                .processes
                .sort_by(|a, b| b.stat.bps_tx.partial_cmp(&a.stat.bps_tx).unwrap()),
        }
    }
}

pub fn render(frame: &mut Frame, state: &mut AppState) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);

    render_process_table(frame, chunks[0], state);
    render_status_bar(frame, chunks[1]);

    if state.show_help {
        render_help_overlay(frame, area);
    }
}

fn render_process_table(frame: &mut Frame, area: Rect, state: &AppState) {
    let header = Row::new(vec![
        Cell::from("PID"),
        Cell::from("COMMAND"),
        Cell::from("RX/s"),
        Cell::from("TX/s"),
        Cell::from("CONNS"),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = state
        .snapshot
        .processes
        .iter()
        .map(process_row)
        .collect();

    let widths = [
        Constraint::Length(8),
        Constraint::Min(20),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(7),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("netproc"))
        .row_highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan));

    let mut list_state = state.list_state.clone();
    frame.render_stateful_widget(table, area, &mut list_state);
}

fn process_row(process: &ProcessSnapshot) -> Row<'static> {
    Row::new(vec![
        Cell::from(process.pid.to_string()),
        Cell::from(process.command.clone()),
        Cell::from(format_rate(process.stat.bps_rx)),
        Cell::from(format_rate(process.stat.bps_tx)),
        Cell::from(process.connections.len().to_string()),
    ])
}

fn format_rate(bytes_per_sec: f64) -> String {
    if bytes_per_sec < 1024.0 {
        format!("{:.0} B/s", bytes_per_sec)
    } else if bytes_per_sec < 1024.0 * 1024.0 {
        format!("{:.1} KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{:.1} MB/s", bytes_per_sec / (1024.0 * 1024.0))
    }
}

fn render_status_bar(frame: &mut Frame, area: Rect) {
    let spans: Vec<Span> = get_status_bar_keybindings()
        .into_iter()
        .flat_map(|kb| {
            vec![
                Span::styled(kb.key, Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(format!(":{}  ", kb.description)),
            ]
        })
        .collect();
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup = centered_rect(50, 40, area);
    let items: Vec<ListItem> = crate::keybindings::get_all_keybindings()
        .into_iter()
        .map(|kb| ListItem::new(format!("{:<10} {}", kb.key, kb.description)))
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(Clear, popup);
    frame.render_widget(list, popup);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netstat::NetStat;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            processes: vec![
                ProcessSnapshot {
                    pid: 2,
                    command: "bar".to_string(),
                    stat: NetStat {
                        bps_rx: 10.0,
                        ..Default::default()
                    },
                    connections: vec![],
                },
                ProcessSnapshot {
                    pid: 1,
                    command: "foo".to_string(),
                    stat: NetStat {
                        bps_rx: 20.0,
                        ..Default::default()
                    },
                    connections: vec![],
                },
            ],
        }
    }

    #[test]
    fn sorts_by_bytes_rx_descending_by_default() {
        let mut state = AppState::new(SortColumn::BytesRx);
        state.apply_snapshot(sample_snapshot());
        assert_eq!(state.snapshot.processes[0].pid, 1);
    }

    #[test]
    fn sort_by_pid_is_ascending() {
        let mut state = AppState::new(SortColumn::Pid);
        state.apply_snapshot(sample_snapshot());
        assert_eq!(state.snapshot.processes[0].pid, 1);
        assert_eq!(state.snapshot.processes[1].pid, 2);
    }

    #[test]
    fn selection_wraps_around() {
        let mut state = AppState::new(SortColumn::Pid);
        state.apply_snapshot(sample_snapshot());
        state.list_state.select(Some(1));
        state.select_next();
        assert_eq!(state.list_state.selected(), Some(0));
    }

    #[test]
    fn empty_snapshot_clears_selection() {
        let mut state = AppState::new(SortColumn::Pid);
        state.apply_snapshot(Snapshot::default());
        assert_eq!(state.list_state.selected(), None);
    }
}
