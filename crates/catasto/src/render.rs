//! Plain-text rendering of tables and outcomes.

use catasto_core::{CatastoError, Payload, Table};

/// Cells wider than this are cut and end in `...`.
pub const MAX_CELL_WIDTH: usize = 30;

const ELLIPSIS: &str = "...";

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_WIDTH {
        return text.to_string();
    }
    let kept: String = text.chars().take(MAX_CELL_WIDTH - ELLIPSIS.len()).collect();
    format!("{kept}{ELLIPSIS}")
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{text}{}", " ".repeat(width.saturating_sub(len)))
}

/// Render a table with aligned columns, a separator and a row count.
pub fn render_table(table: &Table) -> String {
    if table.is_empty() {
        return "Nessun risultato.".to_string();
    }

    let header: Vec<String> = table.columns.iter().map(|c| truncate(&c.to_uppercase())).collect();
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(|v| truncate(&v.to_string())).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> =
            cells.iter().zip(&widths).map(|(cell, width)| pad(cell, *width)).collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 3);
    out.push(line(&header));
    out.push("-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    for row in &rows {
        out.push(line(row));
    }
    let noun = if rows.len() == 1 { "riga" } else { "righe" };
    out.push(format!("({} {noun})", rows.len()));
    out.join("\n")
}

/// Render a successful payload.
pub fn render_payload(payload: &Payload) -> String {
    match payload {
        Payload::Table(table) => render_table(table),
        Payload::Document { title, body } => format!("{title}:\n{body}"),
        Payload::Message(text) => text.clone(),
        Payload::Connected(summary) => format!(
            "Connessione al database stabilita con successo! ({}, schema {})",
            summary.display_url(),
            summary.schema
        ),
        Payload::Exit => "Uscita dal programma.".to_string(),
    }
}

/// Render a failure with its hint, if any.
pub fn render_error(error: &CatastoError) -> String {
    let info = error.to_error_info();
    let mut out = format!("Errore: {}", info.message);
    if let Some(detail) = info.technical_detail {
        out.push('\n');
        out.push_str(&detail);
    }
    if let Some(hint) = info.hint {
        out.push_str(&format!("\nSuggerimento: {hint}"));
    }
    out
}
