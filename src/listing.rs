use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::domain::{SessionCode, SessionDescriptor};

static ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("Failed to parse row selector"));

/// Session index page -> sessions in page order.
///
/// Table rows whose first cell is a session code are authoritative. Pages
/// without such a table fall back to scanning text lines for a five letter
/// upper-case code followed by the session name.
pub fn parse_session_index(html: &str) -> Vec<SessionDescriptor> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut sessions = Vec::new();

    for row in document.select(&ROWS) {
        let cells = direct_cells(row);
        if cells.len() < 2 {
            continue;
        }
        let Ok(code) = cell_text(cells[0]).parse::<SessionCode>() else {
            continue;
        };
        let name = cell_text(cells[1]);
        if name.is_empty() {
            continue;
        }
        if seen.insert(code.clone()) {
            sessions.push(SessionDescriptor::new(code, name));
        }
    }

    if sessions.is_empty() {
        sessions = scan_text_lines(&document);
    }
    sessions
}

fn scan_text_lines(document: &Html) -> Vec<SessionDescriptor> {
    let lines = document
        .root_element()
        .text()
        .flat_map(|chunk| chunk.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let mut sessions = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let is_code = lines[i].len() == 5 && lines[i].chars().all(|ch| ch.is_ascii_uppercase());
        if is_code && i + 1 < lines.len() {
            if let Ok(code) = lines[i].parse::<SessionCode>() {
                if seen.insert(code.clone()) {
                    sessions.push(SessionDescriptor::new(code, lines[i + 1]));
                }
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    sessions
}

/// `td`/`th` children of a row, ignoring cells of nested tables.
pub(crate) fn direct_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .collect()
}

/// Text of an element with runs of whitespace collapsed.
pub(crate) fn cell_text(element: ElementRef<'_>) -> String {
    collapse(&element.text().collect::<String>())
}

pub(crate) fn collapse(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
