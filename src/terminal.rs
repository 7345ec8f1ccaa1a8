// SPDX-License-Identifier: GPL-3.0-only

//! Terminal inspection dashboard
//!
//! Shows the four stations, the telemetry of the service session, the bill
//! and a half-block rendering of the selected station's image. The
//! inspector runs on a tokio runtime; this loop only sends messages and
//! renders the published snapshots.

use crate::app::{Inspector, InspectorHandle, Message, Services, Snapshot, StationView, VideoSourceKind};
use crate::backends::camera::Frame;
use crate::config::Config;
use crate::constants::timing;
use crate::station::StationId;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use image::RgbImage;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Paragraph, Widget},
};
use std::io::{self, stdout};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the terminal dashboard until the operator quits
pub fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    let services = Services::from_config(&config);
    let inspector = Inspector::new(config, services);
    let handle = inspector.handle();
    let mut snapshots = inspector.subscribe();
    let shutdown = CancellationToken::new();
    let task = rt.spawn(inspector.run(shutdown.clone()));

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &handle, &mut snapshots);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    shutdown.cancel();
    if let Err(e) = rt.block_on(task) {
        error!(error = %e, "Inspector task failed");
    }

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    handle: &InspectorHandle,
    snapshots: &mut watch::Receiver<Snapshot>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut selected = StationId::Front;
    let mut preview = FramePreview::default();
    let mut show_help = false;

    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        let view = &snapshot.stations[selected];
        let (label, frame) = selected_image(view);
        preview.update(frame);

        terminal.draw(|f| {
            let [top, stations, image, status] = Layout::vertical([
                Constraint::Length(9),
                Constraint::Length(7),
                Constraint::Min(4),
                Constraint::Length(1),
            ])
            .areas(f.area());

            let [sensors, bill] =
                Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(top);
            f.render_widget(sensor_panel(&snapshot), sensors);
            f.render_widget(bill_panel(&snapshot), bill);

            let columns = Layout::horizontal([Constraint::Ratio(1, 4); 4]).split(stations);
            for (station, view) in snapshot.stations.iter() {
                f.render_widget(station_panel(station, view, &snapshot, station == selected), columns[station.index()]);
            }

            let block = Block::bordered().title(format!(" {} - {} ", selected.display_name(), label));
            let inner = block.inner(image);
            f.render_widget(block, image);
            f.render_widget(&preview, inner);

            let message = match &snapshot.notice {
                Some(notice) => notice.clone(),
                None if show_help => help_message(),
                None => status_message(&snapshot),
            };
            f.render_widget(StatusBar { message: &message }, status);
        })?;

        if !event::poll(timing::UI_TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        // Ctrl+C to quit
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            break;
        }

        let message = match key.code {
            KeyCode::Char('q') => break,
            KeyCode::Char('h') => {
                show_help = !show_help;
                None
            }
            KeyCode::Tab => {
                selected = StationId::from_index((selected.index() + 1) % 4).unwrap_or(StationId::Front);
                None
            }
            KeyCode::Char('0') => Some(Message::SetSource(VideoSourceKind::None)),
            KeyCode::Char('1') => Some(Message::SetSource(VideoSourceKind::LocalCamera)),
            KeyCode::Char('2') => Some(Message::SetSource(VideoSourceKind::RemoteFeed)),
            KeyCode::Char('a') if snapshot.auto_capture.is_some() => Some(Message::StopAutoCapture),
            KeyCode::Char('a') => Some(Message::StartAutoCapture),
            KeyCode::Char('n') => Some(Message::NextDevice(selected)),
            KeyCode::Char(' ') => Some(Message::Capture(selected)),
            KeyCode::Char(c) => station_key(c).map(|(station, reset)| {
                selected = station;
                if reset {
                    Message::Reset(station)
                } else {
                    Message::Capture(station)
                }
            }),
            _ => None,
        };

        if let Some(message) = message {
            info!(?message, "Operator request");
            if !handle.send(message) {
                return Err("Inspector stopped".into());
            }
        }
    }

    Ok(())
}

/// Lowercase captures a station, uppercase resets it
fn station_key(c: char) -> Option<(StationId, bool)> {
    let station = match c.to_ascii_lowercase() {
        'f' => StationId::Front,
        'l' => StationId::Left,
        'r' => StationId::Right,
        'b' => StationId::Brake,
        _ => return None,
    };
    Some((station, c.is_ascii_uppercase()))
}

/// Image shown for a station: analysis result, then the submitted still,
/// then the live remote frame
fn selected_image(view: &StationView) -> (&'static str, Option<&Frame>) {
    if let Some(after) = &view.slot.after {
        ("annotated", Some(after))
    } else if let Some(before) = &view.slot.before {
        ("captured", Some(before))
    } else if let Some(live) = &view.live_frame {
        ("live", Some(live))
    } else {
        ("no image", None)
    }
}

fn status_message(snapshot: &Snapshot) -> String {
    let mut msg = format!("Source: {}", snapshot.source);
    if let Some(status) = &snapshot.feed_status {
        msg.push_str(&format!(" ({})", status));
    }
    if let Some(station) = snapshot.auto_capture {
        msg.push_str(&format!(" | Auto: {}", station.display_name()));
    }
    msg.push_str(" | 'h' help | 'q' quit");
    msg
}

fn help_message() -> String {
    String::from(
        "0/1/2: Source none/local/remote | f l r b: Capture | F L R B: Reset | \
         Space: Capture selected | Tab: Select | n: Next camera | a: Auto | q/Ctrl+C: Quit",
    )
}

fn value(v: Option<f64>, unit: &str) -> String {
    v.map(|v| format!("{:.1}{}", v, unit)).unwrap_or_else(|| "--".into())
}

fn sensor_panel(snapshot: &Snapshot) -> Paragraph<'static> {
    let session = &snapshot.session;
    let battery = session.battery_percent.or(session.battery_level);
    let mut lines = vec![
        Line::from(format!("Battery:  {}", value(battery, " %"))),
        Line::from(format!("RPM:      {}", value(session.rpm, ""))),
        Line::from(format!("Voltage:  {}", value(session.voltage, " V"))),
        Line::from(format!("Range:    {}", value(session.drivable_range_km, " km"))),
        Line::from(format!(
            "Vibration: {}",
            session.vibration_level.as_deref().unwrap_or("--")
        )),
        Line::from(format!("Brake wear: {}", value(session.brake_wear_rate, ""))),
    ];
    if let Some(detection) = &snapshot.latest_detection {
        lines.push(Line::from(format!(
            "Last detection: {} scratches, {} dents, {} cracks",
            detection.counts.scratches, detection.counts.dents, detection.counts.cracks
        )));
    }

    let title = match &session.id {
        Some(id) => format!(" Session {} ", id),
        None => " Telemetry ".to_string(),
    };
    Paragraph::new(lines).block(Block::bordered().title(title))
}

fn bill_panel(snapshot: &Snapshot) -> Paragraph<'static> {
    let mut lines: Vec<Line> = snapshot
        .bill
        .lines
        .iter()
        .map(|line| Line::from(format!("{:<28}{:>10.2}", line.label, line.amount)))
        .collect();
    lines.push(Line::styled(
        format!("{:<28}{:>10.2}", "TOTAL", snapshot.bill.total),
        Style::default().fg(Color::Yellow),
    ));
    Paragraph::new(lines).block(Block::bordered().title(" Bill "))
}

fn station_panel(station: StationId, view: &StationView, snapshot: &Snapshot, selected: bool) -> Paragraph<'static> {
    let mut lines = Vec::new();

    match snapshot.source {
        VideoSourceKind::None => lines.push(Line::from("No source")),
        VideoSourceKind::LocalCamera => {
            let device = view.device.as_ref().map(|d| d.name.clone()).unwrap_or_else(|| "No camera".into());
            lines.push(Line::from(device));
            if let Some(err) = &view.device_error {
                lines.push(Line::styled(err.to_string(), Style::default().fg(Color::Red)));
            }
        }
        VideoSourceKind::RemoteFeed => {
            if view.connected {
                lines.push(Line::styled("Live", Style::default().fg(Color::Green)));
            } else {
                lines.push(Line::styled("Offline", Style::default().fg(Color::DarkGray)));
            }
        }
    }

    let slot = &view.slot;
    if slot.busy {
        lines.push(Line::styled("Analyzing...", Style::default().fg(Color::Yellow)));
    } else if let Some(result) = &slot.result {
        lines.push(Line::from(format!(
            "S {}  D {}  C {}",
            result.counts.scratches, result.counts.dents, result.counts.cracks
        )));
        if let Some(status) = result.brake_status {
            lines.push(Line::from(format!("Brakes: {}", status)));
        }
    }
    if let Some(err) = &slot.last_error {
        lines.push(Line::styled(err.to_string(), Style::default().fg(Color::Red)));
    }

    let mut title = format!(" {} ", station.display_name());
    if snapshot.auto_capture == Some(station) {
        title.push_str("[AUTO] ");
    }
    let border = if selected {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Paragraph::new(lines).block(Block::bordered().title(title).border_style(border))
}

/// Decoded image of the selected station
///
/// Decoding only happens when the shown frame changes.
#[derive(Default)]
struct FramePreview {
    source: Option<Frame>,
    image: Option<RgbImage>,
}

impl FramePreview {
    fn update(&mut self, frame: Option<&Frame>) {
        let unchanged = match (&self.source, frame) {
            (Some(current), Some(frame)) => Arc::ptr_eq(&current.data, &frame.data),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        self.source = frame.cloned();
        self.image = frame.and_then(Frame::decode_rgb);
    }
}

impl Widget for &FramePreview {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(image) = &self.image else {
            let msg = if self.source.is_some() {
                "Unreadable image"
            } else {
                "No image"
            };
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };
        if image.width() == 0 || image.height() == 0 || area.width == 0 || area.height == 0 {
            return;
        }

        // Each terminal cell displays 2 vertical pixels using half-block characters
        let frame_aspect = image.width() as f64 / image.height() as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            ((h * frame_aspect) as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            (w as u16, (w / frame_aspect / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;
        let x_scale = image.width() as f64 / display_width as f64;
        let y_scale = image.height() as f64 / (display_height * 2) as f64;

        // Upper half (▀) colored with fg, lower half with bg
        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(image, src_x, src_y_top));
                    cell.set_bg(sample_pixel(image, src_x, src_y_bottom));
                }
            }
        }
    }
}

fn sample_pixel(image: &RgbImage, x: u32, y: u32) -> Color {
    let x = x.min(image.width() - 1);
    let y = y.min(image.height() - 1);
    let [r, g, b] = image.get_pixel(x, y).0;
    Color::Rgb(r, g, b)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_keys() {
        assert_eq!(station_key('f'), Some((StationId::Front, false)));
        assert_eq!(station_key('B'), Some((StationId::Brake, true)));
        assert_eq!(station_key('x'), None);
    }

    #[test]
    fn test_selected_image_prefers_annotated() {
        let before = Frame::from(vec![1u8, 2, 3]);
        let after = Frame::from(vec![4u8, 5, 6]);
        let mut view = StationView::default();
        assert_eq!(selected_image(&view).0, "no image");

        view.slot.before = Some(before);
        assert_eq!(selected_image(&view).0, "captured");

        view.slot.after = Some(after.clone());
        assert_eq!(selected_image(&view), ("annotated", Some(&after)));
    }
}
