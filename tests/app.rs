use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use camino::Utf8PathBuf;

use jacow_harvester::app::Harvester;
use jacow_harvester::config::{Config, ConfigLoader, HarvestConfig};
use jacow_harvester::domain::{FileKind, FileStatus};
use jacow_harvester::error::HarvestError;
use jacow_harvester::http::Fetcher;
use jacow_harvester::output::JsonOutput;
use jacow_harvester::store::ConferenceIndex;

const BASE: &str = "https://example.org/srf2019/";
const LISTING: &str = "https://example.org/srf2019/html/sessi0n1.htm";
const SUSPB: &str = "https://example.org/srf2019/html/suspb.htm";
const MOFAA: &str = "https://example.org/srf2019/html/mofaa.htm";
const POSTER: &str = "https://example.org/srf2019/posters/suspb001_poster.pdf";
const TALK: &str = "https://example.org/srf2019/talks/suspb001_talk.pdf";
const PAPER: &str = "https://example.org/srf2019/papers/suspb001.pdf";

#[derive(Default)]
struct MockSite {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    downloads: Mutex<Vec<String>>,
}

impl MockSite {
    fn srf2019() -> Self {
        let mut pages = HashMap::new();
        pages.insert(LISTING.to_string(), include_str!("fixtures/sessions.htm").to_string());
        pages.insert(SUSPB.to_string(), include_str!("fixtures/suspb.htm").to_string());
        pages.insert(MOFAA.to_string(), include_str!("fixtures/mofaa.htm").to_string());
        Self {
            pages,
            ..Self::default()
        }
    }

    fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    fn without(mut self, url: &str) -> Self {
        self.pages.remove(url);
        self
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl Fetcher for MockSite {
    fn fetch_text(&self, url: &str) -> Result<String, HarvestError> {
        if self.failing.contains(url) {
            return Err(HarvestError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        self.pages.get(url).cloned().ok_or(HarvestError::Status {
            url: url.to_string(),
            status: 404,
        })
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, HarvestError> {
        self.downloads.lock().unwrap().push(url.to_string());
        if self.failing.contains(url) {
            return Err(HarvestError::Http {
                url: url.to_string(),
                message: "connection reset".to_string(),
            });
        }
        let body = format!("%PDF-1.4 {url} {}", "x".repeat(200));
        std::fs::write(destination, body.as_bytes()).unwrap();
        Ok(body.len() as u64)
    }
}

fn config(root: &Utf8PathBuf) -> HarvestConfig {
    ConfigLoader::resolve_config(Config {
        base_url: Some(BASE.to_string()),
        output_dir: Some(root.to_string()),
        min_delay_ms: Some(0),
        max_delay_ms: Some(0),
        backoff_base_ms: Some(0),
        ..Config::default()
    })
    .unwrap()
}

fn output_root(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("SRF2019_Data")).unwrap()
}

fn read(root: &Utf8PathBuf, relative: &str) -> Vec<u8> {
    std::fs::read(root.join(relative).as_std_path()).unwrap()
}

fn load_index(root: &Utf8PathBuf) -> ConferenceIndex {
    serde_json::from_slice(&read(root, "SRF2019_Complete_Index.json")).unwrap()
}

const DATA_FILES: [&str; 8] = [
    "SRF2019_Complete_Index.json",
    "SRF2019_All_Papers.csv",
    "Sessions/SUSPB - Student Poster/papers_data.json",
    "Sessions/SUSPB - Student Poster/papers_data.csv",
    "Sessions/SUSPB - Student Poster/summary.txt",
    "Sessions/MOFAA - Opening Session/papers_data.json",
    "Sessions/MOFAA - Opening Session/papers_data.csv",
    "Sessions/MOFAA - Opening Session/summary.txt",
];

#[test]
fn full_run_downloads_everything_and_writes_exports() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);
    let harvester = Harvester::new(config(&root), MockSite::srf2019());

    let report = harvester.run(&JsonOutput).unwrap();

    assert_eq!(report.sessions_listed, 2);
    assert_eq!(report.sessions_processed, 2);
    assert_eq!(report.papers_found, 3);
    assert_eq!(report.papers_indexed, 3);
    assert_eq!(report.rejected_rows, 2);
    assert_eq!(report.outcomes.poster.downloaded, 1);
    assert_eq!(report.outcomes.presentation.downloaded, 2);
    assert_eq!(report.outcomes.paper.downloaded, 1);
    assert!(report.failures.is_empty());
    assert_eq!(harvester.fetcher().download_count(), 4);

    for file in DATA_FILES {
        assert!(root.join(file).as_std_path().is_file(), "missing {file}");
    }
    assert!(
        root.join("Posters/SUSPB - Student Poster/SUSPB001_poster - Superconducting Cavity Study.pdf")
            .as_std_path()
            .is_file()
    );
    let report_text = String::from_utf8(read(&root, "SRF2019_Final_Report.txt")).unwrap();
    assert!(report_text.starts_with("SRF2019 Conference Complete Harvest Report"));

    let leftovers = walk(&root)
        .into_iter()
        .filter(|path| path.ends_with(".part"))
        .collect::<Vec<_>>();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
}

#[test]
fn second_run_skips_everything_and_rewrites_identical_data() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);

    Harvester::new(config(&root), MockSite::srf2019())
        .run(&JsonOutput)
        .unwrap();
    let first = DATA_FILES.map(|file| read(&root, file));

    let harvester = Harvester::new(config(&root), MockSite::srf2019());
    let report = harvester.run(&JsonOutput).unwrap();

    assert_eq!(harvester.fetcher().download_count(), 0);
    for kind in FileKind::ALL {
        let counts = report.outcomes.get(kind);
        assert_eq!(counts.downloaded, 0);
        assert_eq!(counts.skipped, counts.total());
    }
    let second = DATA_FILES.map(|file| read(&root, file));
    for (file, (before, after)) in DATA_FILES.iter().zip(first.iter().zip(second.iter())) {
        assert_eq!(before, after, "{file} changed between runs");
    }
}

#[test]
fn index_keys_are_unique_and_zero_file_papers_are_exported() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);
    Harvester::new(config(&root), MockSite::srf2019())
        .run(&JsonOutput)
        .unwrap();

    let index = load_index(&root);
    let mut keys = HashSet::new();
    for entry in &index.sessions {
        for paper in &entry.papers {
            assert!(keys.insert((entry.session.code.clone(), paper.paper_id.clone())));
        }
    }
    assert_eq!(keys.len(), index.totals.papers);

    let suspb002 = index.sessions[0]
        .papers
        .iter()
        .find(|paper| paper.paper_id.as_str() == "SUSPB002")
        .unwrap();
    assert!(suspb002.files.is_empty());

    let csv = String::from_utf8(read(&root, "Sessions/SUSPB - Student Poster/papers_data.csv")).unwrap();
    assert!(csv.lines().any(|line| line.contains("SUSPB002")));
    let summary = String::from_utf8(read(&root, "Sessions/SUSPB - Student Poster/summary.txt")).unwrap();
    assert!(summary.contains("Paper ID: SUSPB002"));
}

#[test]
fn failed_file_does_not_stop_the_next_one() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);
    let harvester = Harvester::new(config(&root), MockSite::srf2019().failing(POSTER));

    let report = harvester.run(&JsonOutput).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].url, POSTER);
    assert_eq!(report.outcomes.poster.failed, 1);
    let calls = harvester.fetcher().downloads.lock().unwrap().clone();
    let poster_at = calls.iter().position(|url| url == POSTER).unwrap();
    assert_eq!(calls.get(poster_at + 1).map(String::as_str), Some(TALK));

    let index = load_index(&root);
    let paper = &index.sessions[0].papers[0];
    let poster = paper.first_file(FileKind::Poster).unwrap();
    assert_eq!(poster.status, FileStatus::Failed);
    assert!(poster.local_path.is_none());
    assert_eq!(
        paper.first_file(FileKind::Presentation).unwrap().status,
        FileStatus::Downloaded
    );
}

#[test]
fn deleted_file_is_fetched_again() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);
    Harvester::new(config(&root), MockSite::srf2019())
        .run(&JsonOutput)
        .unwrap();

    let paper_path = root.join("Papers/SUSPB - Student Poster/SUSPB001 - Superconducting Cavity Study.pdf");
    std::fs::remove_file(paper_path.as_std_path()).unwrap();

    let harvester = Harvester::new(config(&root), MockSite::srf2019());
    let report = harvester.run(&JsonOutput).unwrap();

    assert_eq!(harvester.fetcher().download_count(), 1);
    assert_eq!(report.outcomes.paper.downloaded, 1);
    assert!(paper_path.as_std_path().is_file());
    let index = load_index(&root);
    assert_eq!(
        index.sessions[0].papers[0]
            .first_file(FileKind::Paper)
            .unwrap()
            .status,
        FileStatus::Downloaded
    );
}

#[test]
fn failed_session_keeps_previous_records() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);
    Harvester::new(config(&root), MockSite::srf2019())
        .run(&JsonOutput)
        .unwrap();

    let harvester = Harvester::new(config(&root), MockSite::srf2019().failing(SUSPB));
    let report = harvester.run(&JsonOutput).unwrap();

    assert_eq!(report.failed_sessions.len(), 1);
    assert_eq!(report.failed_sessions[0].code.as_str(), "SUSPB");
    assert_eq!(report.sessions_processed, 1);
    assert_eq!(report.papers_indexed, 3);
    let index = load_index(&root);
    let codes: Vec<_> = index
        .sessions
        .iter()
        .map(|entry| entry.session.code.as_str())
        .collect();
    assert_eq!(codes, vec!["SUSPB", "MOFAA"]);
}

#[test]
fn unreachable_listing_still_reexports_the_index() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);
    Harvester::new(config(&root), MockSite::srf2019())
        .run(&JsonOutput)
        .unwrap();
    let before = load_index(&root);

    let harvester = Harvester::new(config(&root), MockSite::srf2019().without(LISTING));
    let report = harvester.run(&JsonOutput).unwrap();

    assert_eq!(report.sessions_listed, 0);
    assert_eq!(report.sessions_processed, 0);
    assert_eq!(report.papers_indexed, 3);
    assert_eq!(load_index(&root), before);
}

#[test]
fn papers_dropped_from_a_page_survive_in_the_index() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);
    Harvester::new(config(&root), MockSite::srf2019())
        .run(&JsonOutput)
        .unwrap();

    let mut site = MockSite::srf2019();
    let trimmed = include_str!("fixtures/suspb.htm").replace(
        "<td class=\"papkey\">SUSPB002</td>",
        "<td class=\"papkey\">withdrawn</td>",
    );
    site.pages.insert(SUSPB.to_string(), trimmed);
    let report = Harvester::new(config(&root), site).run(&JsonOutput).unwrap();

    assert_eq!(report.papers_found, 2);
    assert_eq!(report.papers_indexed, 3);
    let index = load_index(&root);
    assert!(
        index.sessions[0]
            .papers
            .iter()
            .any(|paper| paper.paper_id.as_str() == "SUSPB002")
    );
}

#[test]
fn session_selection_limit_and_no_download() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);
    let mut config = config(&root);
    config.sessions = vec!["MOFAA".parse().unwrap(), "SUSPB".parse().unwrap()];
    config.limit = Some(1);
    config.download = false;
    let harvester = Harvester::new(config, MockSite::srf2019());

    let report = harvester.run(&JsonOutput).unwrap();

    assert_eq!(report.sessions_processed, 1);
    assert_eq!(harvester.fetcher().download_count(), 0);
    assert_eq!(report.outcomes.presentation.pending, 1);
    let index = load_index(&root);
    assert_eq!(index.sessions.len(), 1);
    assert_eq!(index.sessions[0].session.code.as_str(), "MOFAA");
    assert_eq!(index.sessions[0].papers[0].pages.as_deref(), Some("5-9"));
    assert!(
        !root
            .join("Sessions/SUSPB - Student Poster")
            .as_std_path()
            .exists()
    );
}

#[test]
fn page_text_dumps_are_opt_in() {
    let temp = tempfile::tempdir().unwrap();
    let root = output_root(&temp);
    let mut config = config(&root);
    config.download = false;
    config.save_page_text = true;
    Harvester::new(config, MockSite::srf2019())
        .run(&JsonOutput)
        .unwrap();

    let dump = String::from_utf8(read(&root, "Debug/SUSPB_page_text.txt")).unwrap();
    assert!(dump.lines().any(|line| line == "Superconducting Cavity Study"));
}

fn walk(root: &Utf8PathBuf) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![root.as_std_path().to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                found.push(path.to_string_lossy().into_owned());
            }
        }
    }
    found
}
