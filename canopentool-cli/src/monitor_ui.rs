//! Live heartbeat dashboard
//!
//! A single-threaded reactor multiplexing CAN frame arrival, keyboard input,
//! a periodic refresh tick, and signals. Each pass handles at most one frame
//! and one key event, then redraws the whole screen; bursts of frames drain
//! across successive passes.
//!
//! Keys: q/x quit, l toggles the rate/legend panel, c clears the heartbeat
//! table and counters, space switches hex/decimal node labels.

use std::time::{Duration, SystemTime};

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Widget};
use ratatui::{buffer::Buffer, DefaultTerminal, Frame};
use snafu::{ResultExt, Snafu};
use tokio::signal::unix::{signal, SignalKind};

use canopentool_client::common::messages::MAX_NODE_ID;
use canopentool_client::common::{open_socketcan, OpenError, ReceiveError, SocketCanReceiver};
use canopentool_client::monitor::{Monitor, NodeDisplay, REFRESH_TIME_MS};

use crate::presence;

const MIN_COLS: u16 = 80;
const MIN_ROWS: u16 = 20;
/// Panels are only drawn on screens taller than this
const PANEL_ROWS: u16 = 24;
/// Screens at least this tall show the legend and the rates at once
const TALL_ROWS: u16 = 30;

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Error returned by the dashboard
#[derive(Debug, Snafu)]
pub enum MonitorUiError {
    /// The terminal is too small for the fixed layout
    #[snafu(display("screen size must be minimum 80x20"))]
    ScreenTooSmall,
    /// The terminal was resized, which the fixed layout does not support
    #[snafu(display("resize not supported"))]
    ResizeUnsupported,
    /// Opening the CAN interface failed
    #[snafu(transparent)]
    Transport {
        /// The transport error
        source: OpenError,
    },
    /// Reading from the CAN socket failed; there is nothing to retry against
    #[snafu(display("{source}"))]
    Receive {
        /// The transport error
        source: ReceiveError,
    },
    /// Terminal or signal plumbing failed
    #[snafu(display("terminal error: {source}"))]
    Terminal {
        /// The underlying OS error
        source: std::io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PanelMode {
    Rates,
    Legend,
}

struct UiState {
    panel: PanelMode,
    hex: bool,
    spinner: usize,
}

/// Run the dashboard on an interface until quit, signal, or error
///
/// The terminal is always restored before returning, including on error.
pub async fn run(interface: &str) -> Result<(), MonitorUiError> {
    let present = presence::load_presence(interface);
    let (_sender, mut receiver) = open_socketcan(interface, None)?;
    let mut monitor = Monitor::new(present, SystemTime::now());

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &mut monitor, &mut receiver, interface).await;
    ratatui::restore();
    if result.is_ok() {
        println!("thanks for using the heartbeat monitor");
    }
    result
}

async fn event_loop(
    terminal: &mut DefaultTerminal,
    monitor: &mut Monitor,
    receiver: &mut SocketCanReceiver,
    interface: &str,
) -> Result<(), MonitorUiError> {
    let size = terminal.size().context(TerminalSnafu)?;
    if size.width < MIN_COLS || size.height < MIN_ROWS {
        return ScreenTooSmallSnafu.fail();
    }

    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(Duration::from_millis(REFRESH_TIME_MS));
    let mut sigint = signal(SignalKind::interrupt()).context(TerminalSnafu)?;
    let mut sigterm = signal(SignalKind::terminate()).context(TerminalSnafu)?;
    let mut sighup = signal(SignalKind::hangup()).context(TerminalSnafu)?;
    let mut sigwinch = signal(SignalKind::window_change()).context(TerminalSnafu)?;

    let mut ui = UiState {
        panel: PanelMode::Rates,
        hex: true,
        spinner: 0,
    };

    loop {
        tokio::select! {
            received = receiver.recv_timestamped() => {
                let (msg, timestamp) = received.context(ReceiveSnafu)?;
                monitor.handle_frame(&msg, timestamp);
            }
            event = events.next() => {
                match event {
                    Some(Ok(Event::Key(key))) => {
                        if handle_key(key, monitor, &mut ui) {
                            return Ok(());
                        }
                    }
                    Some(Ok(Event::Resize(..))) => return ResizeUnsupportedSnafu.fail(),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context(TerminalSnafu),
                    None => return Ok(()),
                }
            }
            _ = tick.tick() => {}
            _ = sigint.recv() => return Ok(()),
            _ = sigterm.recv() => return Ok(()),
            _ = sighup.recv() => return Ok(()),
            _ = sigwinch.recv() => return ResizeUnsupportedSnafu.fail(),
        }

        let now = SystemTime::now();
        monitor.sample_rates(now);
        ui.spinner = (ui.spinner + 1) % SPINNER.len();
        terminal
            .draw(|frame| draw(frame, monitor, &ui, interface, now))
            .context(TerminalSnafu)?;
    }
}

/// Apply one key event; returns true when the user asked to quit
fn handle_key(key: KeyEvent, monitor: &mut Monitor, ui: &mut UiState) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    // The terminal is in raw mode, so ctrl-c arrives as a key, not a signal
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return matches!(key.code, KeyCode::Char('c'));
    }
    match key.code {
        KeyCode::Char('q' | 'Q' | 'x' | 'X') => return true,
        KeyCode::Char('l') => {
            ui.panel = match ui.panel {
                PanelMode::Rates => PanelMode::Legend,
                PanelMode::Legend => PanelMode::Rates,
            };
        }
        KeyCode::Char('c') => monitor.clear(SystemTime::now()),
        KeyCode::Char(' ') => ui.hex = !ui.hex,
        _ => {}
    }
    false
}

fn draw(frame: &mut Frame, monitor: &Monitor, ui: &UiState, interface: &str, now: SystemTime) {
    let area = frame.area();
    let buf = frame.buffer_mut();

    Block::bordered().render(area, buf);
    buf.set_string(
        3,
        0,
        format!(" CANopen - {interface} "),
        Style::new().add_modifier(Modifier::BOLD),
    );
    buf.set_string(0, 0, SPINNER[ui.spinner], Style::new());

    // Node grid: eight 9-column items per row
    for node in 1..=MAX_NODE_ID {
        let display = monitor.node_display(node, now);
        let y = (node / 8) as u16 + 2;
        let x = (node % 8) as u16 * 9 + 4;
        let label = if ui.hex {
            format!(" {:02X}:{}", node, display.label())
        } else {
            format!("{:3}:{}", node, display.label())
        };
        buf.set_string(x, y, label, display_style(display));
    }

    // Summary counters, bottom right
    let summary = monitor.summary(now);
    let x = area.width - 18;
    let y = area.height - 1;
    buf.set_string(
        x - 1,
        y,
        "    /   /   /    ",
        Style::new().add_modifier(Modifier::BOLD),
    );
    buf.set_string(
        x,
        y,
        format!("{:03}", summary.operational),
        Style::new().fg(Color::Green),
    );
    buf.set_string(
        x + 4,
        y,
        format!("{:03}", summary.pre_operational),
        Style::new().fg(Color::Yellow),
    );
    buf.set_string(
        x + 8,
        y,
        format!("{:03}", summary.stopped),
        Style::new().fg(Color::Magenta),
    );
    buf.set_string(
        x + 12,
        y,
        format!("{:03}", summary.failure),
        Style::new().fg(Color::Red),
    );

    if area.height > PANEL_ROWS {
        let tall = area.height >= TALL_ROWS;
        if ui.panel == PanelMode::Legend || tall {
            draw_legend(buf);
        }
        if ui.panel == PanelMode::Rates || tall {
            let rate_y = if tall { 24 } else { 19 };
            draw_rates(buf, monitor, rate_y);
        }
    }
}

fn display_style(display: NodeDisplay) -> Style {
    match display {
        NodeDisplay::BootBlip => Style::new().fg(Color::Black).bg(Color::White),
        NodeDisplay::Boot => Style::new().fg(Color::White),
        NodeDisplay::Stopped => Style::new().fg(Color::Magenta),
        NodeDisplay::Operational => Style::new().fg(Color::Green),
        NodeDisplay::PreOperational => Style::new().fg(Color::Yellow),
        NodeDisplay::Invalid => Style::new().fg(Color::White).bg(Color::Red),
        NodeDisplay::Down => Style::new().fg(Color::Red),
        NodeDisplay::DownIgnored => Style::new().fg(Color::Blue),
    }
}

fn draw_legend(buf: &mut Buffer) {
    const X1: u16 = 10;
    const X2: u16 = 40;
    const Y: u16 = 19;

    let tag = |buf: &mut Buffer, x, y, label, style: Style, text| {
        buf.set_string(x, y, label, style);
        buf.set_string(x + 4, y, text, Style::new());
    };
    tag(buf, X1, Y, "OPER", display_style(NodeDisplay::Operational), " - operational");
    tag(buf, X1, Y + 1, "PRE ", display_style(NodeDisplay::PreOperational), " - pre-operational");
    tag(buf, X1, Y + 2, "BOOT", display_style(NodeDisplay::Boot), " - bootup node");
    tag(buf, X2, Y, "STOP", display_style(NodeDisplay::Stopped), " - stopped");
    tag(buf, X2, Y + 1, "####", display_style(NodeDisplay::Invalid), " - invalid NMT state");
    tag(buf, X2, Y + 2, "UNKN", display_style(NodeDisplay::Down), " - heartbeat failure");
}

fn draw_rates(buf: &mut Buffer, monitor: &Monitor, y: u16) {
    const X: u16 = 4;
    // The kBit/s weights approximate the frame sizes of each class on the
    // wire and are purely presentational
    let counters = monitor.counters();
    let rates = monitor.rates();
    let line = |label: &str, count: u64, rate: f64, kbit_weight: f64| {
        format!(
            "{label:<8} {count:12} packets, {rate:8.0} packets/s, {kbit:6.1} kBit/s",
            kbit = rate * kbit_weight / 1024.0
        )
    };
    buf.set_string(X, y, line("PDO:", counters.pdo, rates.pdo, 64.0), Style::new());
    buf.set_string(X, y + 1, line("SDO:", counters.sdo, rates.sdo, 111.0), Style::new());
    buf.set_string(X, y + 2, line("NMT:", counters.nmt, rates.nmt, 55.0), Style::new());
    buf.set_string(
        X,
        y + 3,
        line("total:", counters.total, rates.total, 79.0),
        Style::new(),
    );
}
