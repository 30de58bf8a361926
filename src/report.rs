use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::domain::{FileKind, FileStatus, PaperId, PaperRecord, SessionCode};
use crate::store::SessionEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: FileStatus) {
        match status {
            FileStatus::Pending => self.pending += 1,
            FileStatus::Downloaded => self.downloaded += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.downloaded + self.skipped + self.failed
    }

    pub fn on_disk(&self) -> usize {
        self.downloaded + self.skipped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTotals {
    pub presentation: StatusCounts,
    pub paper: StatusCounts,
    pub poster: StatusCounts,
}

impl FileTotals {
    pub fn from_papers(papers: &[PaperRecord]) -> Self {
        let mut totals = Self::default();
        for link in papers.iter().flat_map(|paper| paper.files.iter()) {
            totals.record(link.kind, link.status);
        }
        totals
    }

    pub fn get(&self, kind: FileKind) -> &StatusCounts {
        match kind {
            FileKind::Presentation => &self.presentation,
            FileKind::Paper => &self.paper,
            FileKind::Poster => &self.poster,
        }
    }

    pub fn record(&mut self, kind: FileKind, status: FileStatus) {
        let counts = match kind {
            FileKind::Presentation => &mut self.presentation,
            FileKind::Paper => &mut self.paper,
            FileKind::Poster => &mut self.poster,
        };
        counts.record(status);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub session: SessionCode,
    pub paper_id: PaperId,
    pub kind: FileKind,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedSession {
    pub code: SessionCode,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub code: SessionCode,
    pub name: String,
    pub url: String,
    pub papers: usize,
    pub files: FileTotals,
}

impl From<&SessionEntry> for SessionStats {
    fn from(entry: &SessionEntry) -> Self {
        Self {
            code: entry.session.code.clone(),
            name: entry.session.name.clone(),
            url: entry.url.clone(),
            papers: entry.papers.len(),
            files: entry.file_totals(),
        }
    }
}

/// What one run did. `outcomes` counts this run's per-file results, while
/// `sessions` describes the whole merged record set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub conference: String,
    pub completed_at: String,
    pub sessions_listed: usize,
    pub sessions_processed: usize,
    pub failed_sessions: Vec<FailedSession>,
    pub papers_found: usize,
    pub papers_indexed: usize,
    pub rejected_rows: usize,
    pub outcomes: FileTotals,
    pub failures: Vec<FailedFile>,
    pub sessions: Vec<SessionStats>,
}

impl RunReport {
    pub fn new(conference: impl Into<String>) -> Self {
        Self {
            conference: conference.into(),
            ..Self::default()
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let thin = "-".repeat(50);

        let _ = writeln!(out, "{} Conference Complete Harvest Report", self.conference);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Completion time: {}", self.completed_at);
        let _ = writeln!(out, "Sessions listed: {}", self.sessions_listed);
        let _ = writeln!(out, "Sessions processed: {}", self.sessions_processed);
        let _ = writeln!(out, "Sessions failed: {}", self.failed_sessions.len());
        let _ = writeln!(out, "Papers found this run: {}", self.papers_found);
        let _ = writeln!(out, "Papers in index: {}", self.papers_indexed);
        let _ = writeln!(out, "Rejected rows: {}", self.rejected_rows);
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "{:<16}{:>12}{:>10}{:>9}{:>10}",
            "Files this run", "downloaded", "skipped", "failed", "pending"
        );
        for kind in FileKind::ALL {
            let counts = self.outcomes.get(kind);
            let _ = writeln!(
                out,
                "{:<16}{:>12}{:>10}{:>9}{:>10}",
                kind.folder(),
                counts.downloaded,
                counts.skipped,
                counts.failed,
                counts.pending
            );
        }
        let _ = writeln!(out);

        if !self.failed_sessions.is_empty() {
            let _ = writeln!(out, "Failed sessions:");
            for failed in &self.failed_sessions {
                let _ = writeln!(out, "   {} ({}): {}", failed.code, failed.url, failed.reason);
            }
            let _ = writeln!(out);
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "Failed downloads:");
            for failed in &self.failures {
                let _ = writeln!(
                    out,
                    "   {}/{} {}: {} ({})",
                    failed.session, failed.paper_id, failed.kind, failed.url, failed.reason
                );
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "Session detailed statistics:");
        let _ = writeln!(out, "{thin}");
        for session in &self.sessions {
            let _ = writeln!(out, "Session: {} - {}", session.code, session.name);
            let _ = writeln!(out, "   Papers: {}", session.papers);
            for kind in FileKind::ALL {
                let counts = session.files.get(kind);
                let _ = writeln!(
                    out,
                    "   {}: {} on disk / {} listed ({} failed)",
                    kind.folder(),
                    counts.on_disk(),
                    counts.total(),
                    counts.failed
                );
            }
            let _ = writeln!(out, "   URL: {}", session.url);
            let _ = writeln!(out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_failures_per_kind() {
        let mut report = RunReport::new("SRF2019");
        report.outcomes.record(FileKind::Poster, FileStatus::Failed);
        report.outcomes.record(FileKind::Paper, FileStatus::Downloaded);
        report.failures.push(FailedFile {
            session: "SUSPB".parse().unwrap(),
            paper_id: PaperId::for_session(&"SUSPB".parse().unwrap(), "SUSPB001").unwrap(),
            kind: FileKind::Poster,
            url: "https://example.org/posters/suspb001_poster.pdf".to_string(),
            reason: "connection reset".to_string(),
        });

        let text = report.render();
        assert!(text.starts_with("SRF2019 Conference Complete Harvest Report"));
        assert!(text.contains("Failed downloads:"));
        assert!(text.contains("SUSPB/SUSPB001 poster"));
        let posters = text
            .lines()
            .find(|line| line.starts_with("Posters"))
            .unwrap();
        assert_eq!(
            posters.split_whitespace().collect::<Vec<_>>(),
            vec!["Posters", "0", "0", "1", "0"]
        );
    }
}
