use crate::core::histogram::HistogramBin;
use crate::core::recognition::RecognitionDisplay;
use crate::core::roster::{RosterSnapshot, STATUS_SYNCED, STATUS_UPDATING};
use image::RgbaImage;
use std::collections::BTreeSet;
use std::io::{self, Write};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    terminal::{self, ClearType},
    cursor,
};

const ASCII_RAMP: &str = " .·:;+=xX#@";
const SPARK_RAMP: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const DEFAULT_WIDTH: usize = 80;
const DEFAULT_HEIGHT: usize = 30;

pub struct AsciiRenderer {
    width: usize,
    height: usize,
}

impl AsciiRenderer {
    pub fn new(width: Option<usize>, height: Option<usize>) -> Self {
        // Get actual terminal size if not specified
        let (term_width, term_height) = terminal::size()
            .map(|(w, h)| (w as usize, h as usize))
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));

        Self {
            width: width.unwrap_or((term_width / 2).min(DEFAULT_WIDTH / 2)).max(8),
            height: height.unwrap_or((term_height.saturating_sub(6) / 2).min(DEFAULT_HEIGHT / 2)).max(4),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Frame preview with a capture progress bar along the top row.
    pub fn render_frame_with_progress(&self, image: &RgbaImage, captured: usize, total: usize) -> String {
        let mut grid = self.image_to_ascii(image);

        let bar = create_progress_bar(captured, total);
        self.overlay_text(&mut grid, &bar, self.width / 2, 0);
        let msg = if captured < total { "Move head slightly" } else { "Complete!" };
        self.overlay_text(&mut grid, msg, self.width / 2, self.height.saturating_sub(1));

        self.grid_to_string(&grid)
    }

    fn image_to_ascii(&self, image: &RgbaImage) -> Vec<Vec<char>> {
        let mut grid = vec![vec![' '; self.width]; self.height];
        let (img_width, img_height) = image.dimensions();
        if img_width == 0 || img_height == 0 {
            return grid;
        }

        let ramp: Vec<char> = ASCII_RAMP.chars().collect();
        for term_y in 0..self.height {
            for term_x in 0..self.width {
                let img_x = (term_x as f32 / self.width as f32 * img_width as f32) as u32;
                let img_y = (term_y as f32 / self.height as f32 * img_height as f32) as u32;

                if img_x < img_width && img_y < img_height {
                    let p = image.get_pixel(img_x, img_y);
                    let brightness = (p[0] as usize + p[1] as usize + p[2] as usize) / 3;
                    grid[term_y][term_x] = ramp[brightness * (ramp.len() - 1) / 255];
                }
            }
        }

        grid
    }

    fn overlay_text(&self, grid: &mut [Vec<char>], text: &str, center_x: usize, y: usize) {
        if y >= self.height {
            return;
        }

        let text_len = text.chars().count();
        let start_x = center_x.saturating_sub(text_len / 2);

        for (i, ch) in text.chars().enumerate() {
            let x = start_x + i;
            if x < self.width {
                grid[y][x] = ch;
            }
        }
    }

    fn grid_to_string(&self, grid: &[Vec<char>]) -> String {
        grid.iter()
            .map(|row| row.iter().take(self.width).collect::<String>())
            .collect::<Vec<_>>()
            .join("\r\n")
    }
}

fn create_progress_bar(captured: usize, total: usize) -> String {
    let filled = "■".repeat(captured.min(total));
    let empty = "□".repeat(total.saturating_sub(captured));
    format!("[{}{}] {}/{}", filled, empty, captured.min(total), total)
}

/// Heads-up lines for the recognition screen.
pub fn render_hud(display: &RecognitionDisplay) -> Vec<String> {
    let mut lines = vec![format!("MATCH {:>3}%  {}", display.confidence, display.status)];
    if !display.model_ready {
        lines.push("NEURAL CORE UNTRAINED".to_string());
    }
    if display.matched {
        lines.push(format!(">> {} <<", display.label));
    } else {
        lines.push(display.label.clone());
    }
    lines
}

/// One character per bin, scaled to the bin's normalized value.
pub fn histogram_sparkline(bins: &[HistogramBin]) -> String {
    if bins.is_empty() {
        return "[ NO DATA ]".to_string();
    }
    bins.iter()
        .map(|bin| {
            let level = (bin.value.clamp(0.0, 100.0) / 100.0 * (SPARK_RAMP.len() - 1) as f64).round();
            SPARK_RAMP[level as usize]
        })
        .collect()
}

/// Table of roster entries with their sync status and histogram.
pub fn render_roster(snapshot: &RosterSnapshot, highlighted: &BTreeSet<String>) -> String {
    if snapshot.loading {
        return "DOWNLOADING NEURAL MAP...".to_string();
    }

    let mut out = format!("CONNECTED NODES: {}\r\n", snapshot.entries.len());
    for view in &snapshot.entries {
        let status = if highlighted.contains(&view.entry.name) { STATUS_UPDATING } else { STATUS_SYNCED };
        let histogram = view
            .visuals
            .as_ref()
            .map(|v| histogram_sparkline(&v.histogram))
            .unwrap_or_else(|| histogram_sparkline(&[]));
        out.push_str(&format!(
            "#{:<4} {:<20} samples:{:<3} {}  {}\r\n",
            view.entry.id, view.entry.name, view.entry.sample_count, histogram, status
        ));
    }
    out
}

pub fn clear_screen() -> io::Result<()> {
    crossterm::execute!(
        io::stdout(),
        terminal::Clear(ClearType::All),
        cursor::MoveTo(0, 0)
    )?;
    io::stdout().flush()
}

/// Redraw `text` from the top-left corner.
pub fn redraw(text: &str) -> io::Result<()> {
    clear_screen()?;
    print!("{}", text);
    io::stdout().flush()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    None,
    Quit,
    SwitchCamera,
}

/// Esc, or Ctrl-C while the terminal is in raw mode, quits. `f` flips the camera.
pub fn key_action(key: &KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Esc => KeyAction::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char('f') | KeyCode::Char('F') => KeyAction::SwitchCamera,
        _ => KeyAction::None,
    }
}

/// Non-blocking read of the next key, if any.
pub fn poll_key_action() -> io::Result<KeyAction> {
    if event::poll(std::time::Duration::from_millis(0))? {
        if let Event::Key(key) = event::read()? {
            return Ok(key_action(&key));
        }
    }
    Ok(KeyAction::None)
}

pub fn check_for_escape() -> io::Result<bool> {
    Ok(poll_key_action()? == KeyAction::Quit)
}
