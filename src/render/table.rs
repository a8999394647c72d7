//! Grid parsing for table blocks.
//!
//! Two dialects reach the structured renderer: the pipe grid the model
//! writes for simple tables, and an HTML `<table>` for anything with merged
//! or multi-line cells. Both end up as a [`TableGrid`] of trimmed cell text.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

/// Rectangular table: every row has [`TableGrid::columns`] cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableGrid {
    pub rows: Vec<Vec<String>>,
}

impl TableGrid {
    /// Pad ragged rows with empty cells up to the widest row.
    fn from_ragged(mut rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { rows }
    }

    pub fn columns(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    /// First row; rendered bold.
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }
}

/// Parse a table block, picking the dialect from the text.
///
/// `None` means the text is not a usable grid and should be emitted as a
/// plain paragraph.
pub fn parse_table(text: &str) -> Option<TableGrid> {
    if text.to_ascii_lowercase().contains("<table") {
        parse_html_table(text)
    } else {
        parse_pipe_grid(text)
    }
}

/// `| a | b |` rows; `|---|:--:|` separator rows are dropped. Needs at
/// least two content rows.
pub fn parse_pipe_grid(text: &str) -> Option<TableGrid> {
    let rows: Vec<Vec<String>> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_separator(line))
        .map(split_cells)
        .collect();

    if rows.len() < 2 {
        debug!("Pipe grid has {} content row(s), not a table", rows.len());
        return None;
    }
    Some(TableGrid::from_ragged(rows))
}

fn is_separator(line: &str) -> bool {
    line.contains('-') && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

fn split_cells(line: &str) -> Vec<String> {
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// Stream `<tr>`/`<td>`/`<th>` events into rows. Text outside a cell is
/// ignored; `<br>` becomes a space.
pub fn parse_html_table(text: &str) -> Option<TableGrid> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(false);
    reader.check_end_names(false);

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref().to_ascii_lowercase().as_slice() {
                b"tr" => {
                    finish_row(&mut rows, &mut row, &mut cell);
                    row = Some(Vec::new());
                }
                b"td" | b"th" => {
                    finish_cell(&mut row, &mut cell);
                    cell = Some(String::new());
                }
                b"br" => push_text(&mut cell, " "),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref().eq_ignore_ascii_case(b"br") {
                    push_text(&mut cell, " ");
                }
            }
            Ok(Event::Text(e)) => {
                let decoded = match e.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                push_text(&mut cell, &decoded);
            }
            Ok(Event::End(e)) => match e.name().as_ref().to_ascii_lowercase().as_slice() {
                b"td" | b"th" => finish_cell(&mut row, &mut cell),
                b"tr" => finish_row(&mut rows, &mut row, &mut cell),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("HTML table parse stopped at byte {}: {}", reader.buffer_position(), e);
                break;
            }
            _ => {}
        }
    }
    finish_row(&mut rows, &mut row, &mut cell);

    if rows.is_empty() {
        return None;
    }
    Some(TableGrid::from_ragged(rows))
}

fn push_text(cell: &mut Option<String>, text: &str) {
    if let Some(cell) = cell {
        cell.push_str(text);
    }
}

fn finish_cell(row: &mut Option<Vec<String>>, cell: &mut Option<String>) {
    if let Some(text) = cell.take() {
        row.get_or_insert_with(Vec::new).push(text.trim().to_string());
    }
}

fn finish_row(rows: &mut Vec<Vec<String>>, row: &mut Option<Vec<String>>, cell: &mut Option<String>) {
    finish_cell(row, cell);
    if let Some(cells) = row.take() {
        if !cells.is_empty() {
            rows.push(cells);
        }
    }
}
