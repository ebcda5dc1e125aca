use std::{io, thread, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use railsim_core::{
    sim::snapshot::{EventKind, TrainBundle},
    Disruption, Simulation, Snapshot, TrainStatus,
};
use tokio::{sync::mpsc, time};
use tracing::{error, info};

const TICK_RATE: Duration = Duration::from_millis(250);
const OCCUPANCY_BAR_WIDTH: usize = 6;

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

impl Theme {
    fn status_color(&self, status: TrainStatus) -> Color {
        match status {
            TrainStatus::OnTime => self.success,
            TrainStatus::Delayed | TrainStatus::WaitingTraffic => self.warning,
            TrainStatus::WaitingDisrupted | TrainStatus::WaitingNoRoute => self.danger,
            TrainStatus::Arrived => self.accent,
            TrainStatus::Cancelled => self.muted,
        }
    }
}

enum AppEvent {
    Input(Event),
    Tick,
}

/// Terminal dashboard that pulls snapshots from the simulation.
pub struct RailsimApp {
    sim: Simulation,
    refresh: Duration,
    state: UiState,
    snapshot: Option<Snapshot>,
    theme: Theme,
}

impl RailsimApp {
    pub fn new(sim: Simulation, refresh: Duration) -> Self {
        Self {
            sim,
            refresh,
            state: UiState::default(),
            snapshot: None,
            theme: Theme::default(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.refresh_snapshot();

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx);

        let mut refresh = time::interval(self.refresh);
        refresh.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }

            tokio::select! {
                maybe_event = event_rx.recv() => {
                    if !self.process_app_event(maybe_event) {
                        break;
                    }
                }
                _ = refresh.tick() => {
                    if !self.state.paused {
                        self.refresh_snapshot();
                    }
                }
            }

            if self.state.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        Ok(())
    }

    fn refresh_snapshot(&mut self) {
        match self.sim.advance_and_snapshot() {
            Ok(snapshot) => {
                self.state.set_train_count(snapshot.payload.len());
                self.snapshot = Some(snapshot);
            }
            Err(err) => {
                error!(?err, "Snapshot failed");
                self.state.set_status(format!("Snapshot failed: {err}"));
            }
        }
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(Event::Key(key))) => {
                self.handle_key(key);
                true
            }
            Some(AppEvent::Input(_)) | Some(AppEvent::Tick) => true,
            None => false,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.should_quit = true
            }
            KeyCode::Char('q') | KeyCode::Esc => self.state.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.state.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.state.move_cursor(-1),
            KeyCode::Home => self.state.move_to(0),
            KeyCode::End => self.state.move_to(usize::MAX),
            KeyCode::Char('p') => {
                self.state.paused = !self.state.paused;
                let message = if self.state.paused {
                    "Paused; elapsed time will be applied on resume"
                } else {
                    self.refresh_snapshot();
                    "Resumed"
                };
                info!(paused = self.state.paused, "Dashboard pause toggled");
                self.state.set_status(message.to_string());
            }
            KeyCode::Char('r') => {
                self.sim.reset();
                self.state.move_to(0);
                self.refresh_snapshot();
                self.state.set_status("Simulation reset".to_string());
            }
            _ => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(10),
                Constraint::Length(4),
            ])
            .split(frame.size());

        self.render_header(frame, rows[0]);

        let middle = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(rows[1]);
        self.render_train_list(frame, middle[0]);
        self.render_train_detail(frame, middle[1]);

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[2]);
        self.render_occupancy(frame, bottom[0]);
        self.render_disruptions(frame, bottom[1]);

        self.render_status(frame, rows[3]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::styled(
            "Railway Traffic Simulator",
            Style::default()
                .fg(self.theme.accent)
                .add_modifier(Modifier::BOLD),
        )];
        if let Some(snapshot) = &self.snapshot {
            spans.push(Span::styled(
                format!(
                    "  ·  {} trains  ·  snapshot {}",
                    snapshot.payload.len(),
                    snapshot.timestamp.with_timezone(&Local).format("%H:%M:%S")
                ),
                Style::default().fg(self.theme.muted),
            ));
        }
        if self.state.paused {
            spans.push(Span::styled(
                "  [PAUSED]",
                Style::default()
                    .fg(self.theme.warning)
                    .add_modifier(Modifier::BOLD),
            ));
        }
        let paragraph =
            Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    fn render_train_list(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Trains");
        let Some(snapshot) = &self.snapshot else {
            frame.render_widget(Paragraph::new("Waiting for first snapshot").block(block), area);
            return;
        };

        let items: Vec<ListItem> = snapshot
            .payload
            .iter()
            .enumerate()
            .map(|(idx, bundle)| {
                let train = &bundle.train;
                let marker = if idx == self.state.cursor {
                    Span::styled(
                        "▶ ",
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    Span::raw("  ")
                };
                ListItem::new(Line::from(vec![
                    marker,
                    Span::styled(
                        format!("{:<6}", train.train_id),
                        Style::default()
                            .fg(self.theme.primary_fg)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!(
                        "{:<11}{:<6}{:>7.2} km  → {:<6} ",
                        train.kind.as_str(),
                        train.section_id(),
                        train.current_location.position_m / 1000.0,
                        train.destination_station,
                    )),
                    Span::styled(
                        train.status.as_str(),
                        Style::default().fg(self.theme.status_color(train.status)),
                    ),
                ]))
            })
            .collect();

        let mut list_state = ListState::default();
        if !items.is_empty() {
            list_state.select(Some(self.state.cursor));
        }
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_train_detail(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Train Details");
        let Some(bundle) = self.selected_bundle() else {
            frame.render_widget(Paragraph::new("No train selected").block(block), area);
            return;
        };
        let paragraph = Paragraph::new(detail_lines(bundle, &self.theme))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_occupancy(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Section Occupancy");
        let occupancy = self
            .snapshot
            .as_ref()
            .map(|snapshot| &snapshot.system_status.section_occupancy);
        let disrupted = self
            .snapshot
            .as_ref()
            .map(|snapshot| snapshot.system_status.disrupted_sections.as_slice())
            .unwrap_or_default();

        let lines: Vec<Line> = self
            .sim
            .network()
            .sections
            .iter()
            .map(|section| {
                let count = occupancy
                    .and_then(|counts| counts.get(&section.id))
                    .copied()
                    .unwrap_or(0);
                let full = count >= section.capacity as usize;
                let color = if disrupted.contains(&section.id) {
                    self.theme.danger
                } else if full {
                    self.theme.warning
                } else {
                    self.theme.success
                };
                Line::from(vec![
                    Span::raw(format!(
                        "{:<6}{:>6} → {:<6}",
                        section.id, section.start, section.end
                    )),
                    Span::styled(
                        occupancy_bar(count, section.capacity as usize),
                        Style::default().fg(color),
                    ),
                    Span::raw(format!(" {count}/{}", section.capacity)),
                ])
            })
            .collect();
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_disruptions(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Disruptions");
        let as_of = self.snapshot.as_ref().map(|snapshot| snapshot.timestamp);
        let lines: Vec<Line> = self.sim.inspect(|state| {
            state
                .disruptions()
                .iter()
                .map(|(section_id, disruption)| {
                    let remaining = as_of
                        .map(|as_of| minutes_left(disruption, as_of).to_string())
                        .unwrap_or_else(|| "?".to_string());
                    Line::from(vec![
                        Span::styled(
                            format!("{section_id:<6}"),
                            Style::default().fg(self.theme.danger),
                        ),
                        Span::raw(format!(
                            "{:<15}{:<7}{remaining:>3} min left",
                            disruption.kind.as_str(),
                            disruption.severity.as_str(),
                        )),
                    ])
                })
                .collect()
        });
        let paragraph = if lines.is_empty() {
            Paragraph::new(Span::styled(
                "No active disruptions",
                Style::default().fg(self.theme.muted),
            ))
        } else {
            Paragraph::new(lines)
        };
        frame.render_widget(paragraph.block(block), area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let help = Line::from(Span::styled(
            "q quit · r reset · p pause · ↑/↓ select",
            Style::default().fg(self.theme.muted),
        ));
        let paragraph = Paragraph::new(vec![Line::from(self.state.status.clone()), help])
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn selected_bundle(&self) -> Option<&TrainBundle> {
        self.snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.payload.get(self.state.cursor))
    }
}

fn detail_lines(bundle: &TrainBundle, theme: &Theme) -> Vec<Line<'static>> {
    let train = &bundle.train;
    let section = &bundle.section;
    let signal = &bundle.signal;
    let event = &bundle.event;

    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                train.train_id.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "  {} · priority {} · journey {}",
                train.kind, train.priority, train.journey_count
            )),
        ]),
        Line::from(Span::styled(
            train.status.as_str(),
            Style::default().fg(theme.status_color(train.status)),
        )),
        Line::from(format!(
            "Heading {} to {} · max {} km/h · {} m long",
            train.direction, train.destination_station, train.max_speed_kmh, train.length_m
        )),
        Line::from(format!(
            "Departed {}",
            train.departure_time.with_timezone(&Local).format("%H:%M")
        )),
    ];
    if let Some(arrival) = train.arrival_time {
        lines.push(Line::from(format!(
            "Arrived {}",
            arrival.with_timezone(&Local).format("%H:%M")
        )));
    }
    if train.restricted_speed {
        lines.push(Line::from(Span::styled(
            "Speed restricted",
            Style::default().fg(theme.warning),
        )));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(format!(
        "Section {} ({} → {}) · {:.2}/{:.1} km",
        section.section_id,
        section.start_station,
        section.end_station,
        train.current_location.position_m / 1000.0,
        section.length_km
    )));
    lines.push(Line::from(format!(
        "{:?} track · line speed {} km/h · {}/{} occupied{}",
        section.track_type,
        section.max_speed_kmh,
        section.occupancy_count,
        section.capacity,
        if section.is_disrupted { " · DISRUPTED" } else { "" }
    )));
    lines.push(Line::from(format!(
        "Signal {} {:?} · {} train(s) · headway {} s{}",
        signal.block_id,
        signal.signal_type,
        signal.occupying_trains,
        signal.headway_time_s,
        if signal.priority_override { " · priority override" } else { "" }
    )));

    let event_text = match event.event_type {
        EventKind::None => "No active event".to_string(),
        EventKind::SectionDisruption => match &event.disruption_details {
            Some(disruption) => format!(
                "Section disruption: {} ({})",
                disruption.kind, disruption.severity
            ),
            None => "Section disruption".to_string(),
        },
        EventKind::Breakdown => "Breakdown".to_string(),
        EventKind::Delay => format!("Delay (~{} min)", event.delay_duration_min),
        EventKind::Restriction => "Speed restriction".to_string(),
    };
    let event_color = if event.event_type == EventKind::None {
        theme.muted
    } else {
        theme.warning
    };
    lines.push(Line::from(Span::styled(
        event_text,
        Style::default().fg(event_color),
    )));
    lines
}

/// Whole minutes until `disruption` ends, as seen at `as_of`.
fn minutes_left(disruption: &Disruption, as_of: DateTime<Utc>) -> i64 {
    (disruption.end_time - as_of).num_minutes().max(0)
}

fn occupancy_bar(count: usize, capacity: usize) -> String {
    let capacity = capacity.max(1);
    let filled = (count.min(capacity) * OCCUPANCY_BAR_WIDTH) / capacity;
    format!(
        " [{}{}]",
        "█".repeat(filled),
        "·".repeat(OCCUPANCY_BAR_WIDTH - filled)
    )
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    cursor: usize,
    train_count: usize,
    status: String,
    paused: bool,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            cursor: 0,
            train_count: 0,
            status: "Ready".to_string(),
            paused: false,
            should_quit: false,
        }
    }
}

impl UiState {
    fn set_train_count(&mut self, count: usize) {
        self.train_count = count;
        self.clamp_cursor();
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.train_count == 0 {
            self.cursor = 0;
            return;
        }
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, self.train_count as isize - 1) as usize;
    }

    fn move_to(&mut self, index: usize) {
        self.cursor = index;
        self.clamp_cursor();
    }

    fn clamp_cursor(&mut self) {
        if self.train_count == 0 {
            self.cursor = 0;
        } else if self.cursor >= self.train_count {
            self.cursor = self.train_count - 1;
        }
    }

    fn set_status(&mut self, message: String) {
        self.status = message;
    }
}
