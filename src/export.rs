use std::fmt::Write as _;

use serde::Serialize;

use crate::domain::{FileKind, PaperRecord, SessionDescriptor};
use crate::error::HarvestError;
use crate::fs_util::write_atomic;
use crate::report::RunReport;
use crate::store::{OutputLayout, RecordSet, SessionEntry};

const ABSTRACT_PREVIEW_CHARS: usize = 300;

const CSV_HEADER: [&str; 15] = [
    "session_code",
    "session_name",
    "paper_id",
    "title",
    "authors",
    "institution",
    "abstract",
    "doi",
    "pages",
    "presentation_url",
    "presentation_status",
    "paper_url",
    "paper_status",
    "poster_url",
    "poster_status",
];

#[derive(Serialize)]
struct SessionExport<'a> {
    session: &'a SessionDescriptor,
    url: &'a str,
    paper_count: usize,
    papers: &'a [PaperRecord],
}

/// Rewrites the three files under `Sessions/<folder>/`.
pub fn export_session(layout: &OutputLayout, entry: &SessionEntry) -> Result<(), HarvestError> {
    let export = SessionExport {
        session: &entry.session,
        url: &entry.url,
        paper_count: entry.papers.len(),
        papers: &entry.papers,
    };
    let json = serde_json::to_vec_pretty(&export)
        .map_err(|err| HarvestError::Filesystem(format!("encode session json: {err}")))?;
    write_atomic(&layout.session_json_path(&entry.session), &json)?;

    let csv = papers_csv(&entry.papers)?;
    write_atomic(&layout.session_csv_path(&entry.session), &csv)?;

    let summary = session_summary(entry);
    write_atomic(&layout.session_summary_path(&entry.session), summary.as_bytes())?;

    tracing::info!(
        "saved session {} ({} papers)",
        entry.session.label(),
        entry.papers.len()
    );
    Ok(())
}

/// Rewrites the index, the all-papers table and the final report.
pub fn export_global(
    layout: &OutputLayout,
    records: &RecordSet,
    conference: &str,
    base_url: &str,
    report: &RunReport,
) -> Result<(), HarvestError> {
    layout.write_index(&records.to_index(conference, base_url))?;

    let all = records
        .sessions()
        .iter()
        .flat_map(|entry| entry.papers.iter())
        .cloned()
        .collect::<Vec<_>>();
    write_atomic(&layout.all_papers_csv_path(), &papers_csv(&all)?)?;

    write_atomic(&layout.report_path(), report.render().as_bytes())
}

/// Lets spreadsheet tools detect UTF-8 instead of guessing a legacy codepage.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// BOM, header, then one row per paper. The header is written even when there
/// are no papers.
pub fn papers_csv(papers: &[PaperRecord]) -> Result<Vec<u8>, HarvestError> {
    let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());
    let csv_err = |err: csv::Error| HarvestError::Filesystem(format!("encode csv: {err}"));

    writer.write_record(CSV_HEADER).map_err(csv_err)?;
    for paper in papers {
        let mut row = vec![
            paper.session.code.to_string(),
            paper.session.name.clone(),
            paper.paper_id.to_string(),
            paper.title.clone(),
            paper.authors.join("; "),
            paper.institution.clone(),
            paper.abstract_text.clone(),
            paper.doi.clone().unwrap_or_default(),
            paper.pages.clone().unwrap_or_default(),
        ];
        for kind in FileKind::ALL {
            match paper.first_file(kind) {
                Some(link) => {
                    row.push(link.url.clone());
                    row.push(link.status.to_string());
                }
                None => {
                    row.push(String::new());
                    row.push(String::new());
                }
            }
        }
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer
        .into_inner()
        .map_err(|err| HarvestError::Filesystem(format!("encode csv: {}", err.error())))
}

pub fn session_summary(entry: &SessionEntry) -> String {
    let mut out = String::new();
    let count = entry.papers.len();
    let _ = writeln!(out, "Session: {}", entry.session.name);
    let _ = writeln!(out, "Session ID: {}", entry.session.code);
    let _ = writeln!(out, "URL: {}", entry.url);
    let _ = writeln!(out, "Paper count: {count}");
    for kind in FileKind::ALL {
        let on_disk = entry
            .papers
            .iter()
            .filter(|paper| paper.files.iter().any(|l| l.kind == kind && l.is_on_disk()))
            .count();
        let _ = writeln!(out, "Available {}: {on_disk}/{count}", kind.folder().to_lowercase());
    }
    let _ = writeln!(out, "{}", "=".repeat(80));
    let _ = writeln!(out);

    for (index, paper) in entry.papers.iter().enumerate() {
        let _ = writeln!(out, "{}. Paper ID: {}", index + 1, paper.paper_id);
        let _ = writeln!(out, "   Title: {}", paper.title);
        if !paper.authors.is_empty() {
            let _ = writeln!(out, "   Authors: {}", paper.authors.join(", "));
        }
        if !paper.institution.is_empty() {
            let _ = writeln!(out, "   Institution: {}", paper.institution);
        }
        let _ = writeln!(out, "   Pages: {}", paper.pages.as_deref().unwrap_or("N/A"));
        for kind in FileKind::ALL {
            let label = capitalized(kind);
            match paper.first_file(kind) {
                Some(link) => {
                    let _ = writeln!(out, "   {label}: {} ({})", link.status, link.url);
                }
                None => {
                    let _ = writeln!(out, "   {label}: not listed");
                }
            }
        }
        if let Some(doi) = &paper.doi {
            let _ = writeln!(out, "   DOI: {doi}");
        }
        if !paper.abstract_text.is_empty() {
            let _ = writeln!(out, "   Abstract: {}", preview(&paper.abstract_text));
        }
        let _ = writeln!(out, "{}", "-".repeat(60));
    }
    out
}

fn capitalized(kind: FileKind) -> String {
    let name = kind.to_string();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > ABSTRACT_PREVIEW_CHARS {
        let head: String = text.chars().take(ABSTRACT_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
