//! Text and JSON rendering for command output.
//!
//! Everything renders to a `String`; `run` is the only place that prints.

use std::fmt::Write as _;
use std::io::IsTerminal;

use serde::Serialize;

/// Detect whether stdout is a TTY.
#[must_use]
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

/// Pretty-printed JSON followed by a newline.
pub fn json<T: Serialize + ?Sized>(data: &T) -> serde_json::Result<String> {
    let mut out = serde_json::to_string_pretty(data)?;
    out.push('\n');
    Ok(out)
}

/// Auto-sized plain-text table.
#[derive(Debug, Clone)]
pub struct CliTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CliTable {
    #[must_use]
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| (*h).to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        widths
    }

    /// Header in bold on a TTY, rows below. An empty table renders nothing.
    #[must_use]
    pub fn render_to_string(&self, tty: bool) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        let widths = self.column_widths();
        let mut out = String::new();
        let header = format_row(&self.headers, &widths);
        if tty {
            let _ = writeln!(out, "\x1b[1m{header}\x1b[0m");
        } else {
            let _ = writeln!(out, "{header}");
        }
        for row in &self.rows {
            let _ = writeln!(out, "{}", format_row(row, &widths));
        }
        out
    }
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let last = widths.len().saturating_sub(1);
    let parts: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(i, &width)| {
            let cell = cells.get(i).map_or("", String::as_str);
            if i == last {
                cell.to_string()
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect();
    parts.join("  ").trim_end().to_string()
}
