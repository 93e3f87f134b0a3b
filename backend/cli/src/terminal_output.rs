//! Terminal output helpers: notes, conversation transcripts, simple tables.

use chatrelay_core::{ChatMessage, Role, SummaryRecord};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const MAGENTA: &str = "\x1b[35m";

/// Check if the terminal supports color output.
pub fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
        && (std::env::var("COLORTERM").is_ok()
            || std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false))
}

fn paint(text: &str, style: &str, color: bool) -> String {
    if color {
        format!("{style}{text}{RESET}")
    } else {
        text.to_string()
    }
}

// ---------------------------------------------------------------------------
// Formatted notes
// ---------------------------------------------------------------------------

pub fn note_info(msg: &str) {
    if supports_color() {
        println!("{CYAN}{BOLD}ℹ{RESET} {msg}");
    } else {
        println!("INFO: {msg}");
    }
}

pub fn note_warn(msg: &str) {
    if supports_color() {
        println!("{YELLOW}{BOLD}⚠{RESET} {msg}");
    } else {
        println!("WARN: {msg}");
    }
}

pub fn note_error(msg: &str) {
    if supports_color() {
        eprintln!("{RED}{BOLD}✗{RESET} {msg}");
    } else {
        eprintln!("ERROR: {msg}");
    }
}

pub fn note_success(msg: &str) {
    if supports_color() {
        println!("{GREEN}{BOLD}✓{RESET} {msg}");
    } else {
        println!("OK: {msg}");
    }
}

// ---------------------------------------------------------------------------
// Transcripts
// ---------------------------------------------------------------------------

/// Render a stored conversation, summary first, one message per line.
pub fn render_history(
    messages: &[ChatMessage],
    summary: Option<&SummaryRecord>,
    color: bool,
) -> String {
    let mut out = String::new();

    if let Some(summary) = summary {
        out.push_str(&paint(
            &format!(
                "Summary (through {}):",
                summary.last_updated.format("%Y-%m-%d %H:%M:%S")
            ),
            BOLD,
            color,
        ));
        out.push('\n');
        out.push_str(&format!("  {}\n\n", summary.summary_text));
    }

    if messages.is_empty() {
        out.push_str(&paint("(no messages)", DIM, color));
        out.push('\n');
        return out;
    }

    for message in messages {
        let style = match message.sender {
            Role::User => CYAN,
            Role::Assistant => GREEN,
            Role::System => MAGENTA,
        };
        let stamp = paint(
            &message.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            DIM,
            color,
        );
        let sender = paint(&format!("{:<9}", message.sender.as_str()), style, color);
        out.push_str(&format!("{stamp}  {sender} {}\n", message.text));
    }
    out
}

/// Left-aligned table with a header row and a dashed separator.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        format!("  {}\n", padded.join("  ").trim_end())
    };

    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let mut out = line(&header);
    out.push_str(&line(&separator));
    for row in rows {
        out.push_str(&line(row));
    }
    out
}
