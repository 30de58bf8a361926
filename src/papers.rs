use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use crate::classify::classify_link;
use crate::domain::{FileLink, PaperId, PaperRecord, SessionDescriptor};
use crate::listing::{cell_text, collapse, direct_cells};

static ROWS: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static AUTHORS: LazyLock<Selector> = LazyLock::new(|| selector(".author_cl, .author"));
static INSTITUTIONS: LazyLock<Selector> =
    LazyLock::new(|| selector(".institution, .affiliation"));
static ABSTRACT: LazyLock<Selector> = LazyLock::new(|| selector(".abstract"));
static PAGES: LazyLock<Selector> = LazyLock::new(|| selector(".pappage"));

static PAGE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,4}(\s*[-–]\s*\d{1,4})?$").expect("valid page regex"));
static DOI_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"10\.\d{4,9}/\S+").expect("valid doi regex"));

const INSTITUTION_KEYWORDS: &[&str] = &[
    "University",
    "Laboratory",
    "Institute",
    "Center",
    "Corporation",
    "School",
    "Facility",
    "National",
    "Synchrotron",
    "KEK",
    "FRIB",
    "LBNL",
    "DESY",
    "SLAC",
    "CERN",
    "Jefferson Lab",
    "Argonne",
];
const NOT_AUTHOR_WORDS: &[&str] = &["funding", "doi", "received", "accepted"];
const NOT_ABSTRACT_PREFIXES: &[&str] = &["Funding:", "DOI:", "Received:", "Accepted:"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

/// A table row that looked like a paper but could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub row: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub papers: Vec<PaperRecord>,
    pub rejected: Vec<RejectedRow>,
}

/// Rows between one paper-id row and the next.
struct RowGroup<'a> {
    id: PaperId,
    head: Vec<ElementRef<'a>>,
    rows: Vec<ElementRef<'a>>,
}

/// Parses one session page. Never fails: rows that cannot be read end up in
/// [`ParsedPage::rejected`] and missing fields stay empty.
pub fn parse_session_page(html: &str, session: &SessionDescriptor, page_url: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let mut rejected = Vec::new();
    let mut seen = HashSet::new();
    let mut groups: Vec<RowGroup<'_>> = Vec::new();
    // False while inside a rejected group, so its continuation rows drop too.
    let mut accepting = false;

    for row in document.select(&ROWS).filter(|row| !is_nested(*row)) {
        let cells = direct_cells(row);
        let first = cells.first().map(|cell| cell_text(*cell)).unwrap_or_default();
        match PaperId::for_session(&session.code, &first) {
            Ok(id) => {
                if cells.len() < 2 {
                    rejected.push(RejectedRow {
                        row: first,
                        reason: "paper row has no title cell".to_string(),
                    });
                    accepting = false;
                } else if !seen.insert(id.clone()) {
                    rejected.push(RejectedRow {
                        row: first,
                        reason: format!("duplicate paper id {id}"),
                    });
                    accepting = false;
                } else {
                    groups.push(RowGroup {
                        id,
                        head: cells,
                        rows: vec![row],
                    });
                    accepting = true;
                }
            }
            Err(_) => {
                if accepting {
                    if let Some(group) = groups.last_mut() {
                        group.rows.push(row);
                    }
                }
            }
        }
    }

    let papers = groups
        .into_iter()
        .map(|group| build_record(group, session, base.as_ref()))
        .collect();
    ParsedPage { papers, rejected }
}

/// Visible text of a page, one non-empty line per text run. Used for the
/// optional debug dumps.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .flat_map(str::lines)
        .map(collapse)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_nested(row: ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "tr")
}

fn build_record(group: RowGroup<'_>, session: &SessionDescriptor, base: Option<&Url>) -> PaperRecord {
    let title = group.head.get(1).map(|cell| cell_text(*cell)).unwrap_or_default();
    let lines = continuation_lines(&group.rows[1..]);

    let authors = select_texts(&group.rows, &AUTHORS);
    let authors = if authors.is_empty() {
        authors_from_lines(&lines)
    } else {
        authors
    };

    let institution = select_texts(&group.rows, &INSTITUTIONS).join("; ");
    let institution_lines = lines
        .iter()
        .filter(|line| is_institution_line(line))
        .cloned()
        .collect::<Vec<_>>();
    let institution = if institution.is_empty() {
        institution_lines.join("; ")
    } else {
        institution
    };

    let abstract_text = select_texts(&group.rows, &ABSTRACT).join(" ");
    let abstract_text = if abstract_text.is_empty() {
        let claimed = select_texts(&group.rows, &AUTHORS)
            .into_iter()
            .chain(select_texts(&group.rows, &INSTITUTIONS))
            .collect::<Vec<_>>();
        let free = lines
            .iter()
            .filter(|line| !claimed.iter().any(|text| text.contains(line.as_str())))
            .cloned()
            .collect::<Vec<_>>();
        abstract_from_lines(&free)
    } else {
        abstract_text
    };

    PaperRecord {
        paper_id: group.id,
        title,
        authors,
        institution,
        abstract_text,
        doi: find_doi(&group.rows),
        pages: find_pages(&group.rows, &group.head),
        session: session.clone(),
        files: collect_files(&group.rows, base),
    }
}

fn continuation_lines(rows: &[ElementRef<'_>]) -> Vec<String> {
    rows.iter()
        .flat_map(|row| row.text())
        .flat_map(str::lines)
        .map(collapse)
        .filter(|line| !line.is_empty())
        .collect()
}

fn select_texts(rows: &[ElementRef<'_>], selector: &Selector) -> Vec<String> {
    rows.iter()
        .flat_map(|row| row.select(selector))
        .map(cell_text)
        .filter(|text| !text.is_empty())
        .collect()
}

fn is_author_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    line.contains(',') && !NOT_AUTHOR_WORDS.iter().any(|word| lower.contains(word))
}

fn is_institution_line(line: &str) -> bool {
    INSTITUTION_KEYWORDS.iter().any(|keyword| line.contains(keyword))
}

fn authors_from_lines(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .find(|line| is_author_line(line))
        .map(|line| {
            line.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn abstract_from_lines(lines: &[String]) -> String {
    let author_line = lines.iter().position(|line| is_author_line(line));
    lines
        .iter()
        .enumerate()
        .filter(|(index, line)| {
            Some(*index) != author_line
                && line.chars().count() > 20
                && !is_institution_line(line)
                && !NOT_ABSTRACT_PREFIXES
                    .iter()
                    .any(|prefix| line.starts_with(prefix))
        })
        .map(|(_, line)| line.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_pages(rows: &[ElementRef<'_>], head: &[ElementRef<'_>]) -> Option<String> {
    if let Some(pages) = select_texts(rows, &PAGES).into_iter().next() {
        return Some(pages);
    }
    if head.len() < 3 {
        return None;
    }
    head.last()
        .map(|cell| cell_text(*cell))
        .filter(|text| PAGE_RANGE.is_match(text))
}

fn find_doi(rows: &[ElementRef<'_>]) -> Option<String> {
    let from_link = rows
        .iter()
        .flat_map(|row| row.select(&LINKS))
        .filter_map(|link| link.value().attr("href"))
        .find_map(|href| href.split_once("doi.org/").map(|(_, doi)| doi.trim().to_string()))
        .filter(|doi| !doi.is_empty());
    if from_link.is_some() {
        return from_link;
    }

    let text = rows
        .iter()
        .flat_map(|row| row.text())
        .collect::<Vec<_>>()
        .join(" ");
    DOI_TOKEN.find(&text).map(|token| {
        token
            .as_str()
            .trim_end_matches(['.', ',', ';', ')'])
            .to_string()
    })
}

fn collect_files(rows: &[ElementRef<'_>], base: Option<&Url>) -> Vec<FileLink> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for link in rows.iter().flat_map(|row| row.select(&LINKS)) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_href(href.trim(), base) else {
            continue;
        };
        let Some(kind) = classify_link(&url, &cell_text(link)) else {
            continue;
        };
        if seen.insert(url.clone()) {
            files.push(FileLink::new(url, kind));
        }
    }
    files
}

fn resolve_href(href: &str, base: Option<&Url>) -> Option<String> {
    if href.is_empty() {
        return None;
    }
    match base {
        Some(base) => base.join(href).ok().map(String::from),
        None => Url::parse(href).ok().map(String::from),
    }
}
