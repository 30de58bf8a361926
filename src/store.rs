use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::config::HarvestConfig;
use crate::domain::{FileKind, PaperId, PaperRecord, SessionCode, SessionDescriptor};
use crate::error::HarvestError;
use crate::fs_util::{MAX_FILENAME_CHARS, remove_stale_temp_files, safe_filename, write_atomic};
use crate::report::FileTotals;

/// Where everything lands under the output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: Utf8PathBuf,
    prefix: String,
}

impl OutputLayout {
    pub fn new(root: Utf8PathBuf, prefix: impl Into<String>) -> Self {
        Self {
            root,
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(config.output_dir.clone(), config.conference.clone())
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> Result<(), HarvestError> {
        let mut dirs = vec![self.root.clone(), self.root.join("Sessions")];
        dirs.extend(FileKind::ALL.iter().map(|kind| self.root.join(kind.folder())));
        for dir in &dirs {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| HarvestError::Filesystem(format!("create {dir}: {err}")))?;
        }

        // The root itself may be shared, so only its top level is swept.
        let mut removed = remove_stale_temp_files(&self.root, false)?;
        for dir in dirs.iter().skip(1) {
            removed += remove_stale_temp_files(dir, true)?;
        }
        removed += remove_stale_temp_files(&self.root.join("Debug"), true)?;
        if removed > 0 {
            tracing::info!("removed {removed} partial files left by an earlier run");
        }
        Ok(())
    }

    pub fn session_folder(session: &SessionDescriptor) -> String {
        safe_filename(&session.label(), MAX_FILENAME_CHARS)
    }

    pub fn session_dir(&self, session: &SessionDescriptor) -> Utf8PathBuf {
        self.root.join("Sessions").join(Self::session_folder(session))
    }

    pub fn session_json_path(&self, session: &SessionDescriptor) -> Utf8PathBuf {
        self.session_dir(session).join("papers_data.json")
    }

    pub fn session_csv_path(&self, session: &SessionDescriptor) -> Utf8PathBuf {
        self.session_dir(session).join("papers_data.csv")
    }

    pub fn session_summary_path(&self, session: &SessionDescriptor) -> Utf8PathBuf {
        self.session_dir(session).join("summary.txt")
    }

    pub fn file_name(record: &PaperRecord, kind: FileKind) -> String {
        let stem = format!("{}{}", record.paper_id, kind.file_suffix());
        let name = if record.title.trim().is_empty() {
            stem
        } else {
            format!("{stem} - {}", record.title)
        };
        format!("{}.pdf", safe_filename(&name, MAX_FILENAME_CHARS))
    }

    /// Relative to the output root, always `/`-separated so the index reads
    /// the same on every platform.
    pub fn relative_file_path(record: &PaperRecord, kind: FileKind) -> String {
        format!(
            "{}/{}/{}",
            kind.folder(),
            Self::session_folder(&record.session),
            Self::file_name(record, kind)
        )
    }

    pub fn resolve(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }

    pub fn index_path(&self) -> Utf8PathBuf {
        self.root.join(format!("{}_Complete_Index.json", self.prefix))
    }

    pub fn all_papers_csv_path(&self) -> Utf8PathBuf {
        self.root.join(format!("{}_All_Papers.csv", self.prefix))
    }

    pub fn report_path(&self) -> Utf8PathBuf {
        self.root.join(format!("{}_Final_Report.txt", self.prefix))
    }

    pub fn log_path(&self) -> Utf8PathBuf {
        self.root.join("harvest.log")
    }

    pub fn page_text_path(&self, code: &SessionCode) -> Utf8PathBuf {
        self.root
            .join("Debug")
            .join(format!("{}_page_text.txt", code.as_str()))
    }

    /// The previous run's index, if any. A damaged index only costs the
    /// resume state, so it is reported and ignored.
    pub fn load_index(&self) -> Result<Option<ConferenceIndex>, HarvestError> {
        let path = self.index_path();
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("read {path}: {err}")))?;
        match serde_json::from_str::<ConferenceIndex>(&content) {
            Ok(index) => Ok(Some(index)),
            Err(err) => {
                tracing::warn!("ignoring unreadable index {path}: {err}");
                Ok(None)
            }
        }
    }

    pub fn write_index(&self, index: &ConferenceIndex) -> Result<(), HarvestError> {
        let content = serde_json::to_vec_pretty(index)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        write_atomic(&self.index_path(), &content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub session: SessionDescriptor,
    pub url: String,
    pub paper_count: usize,
    pub papers: Vec<PaperRecord>,
}

impl SessionEntry {
    pub fn new(session: SessionDescriptor, url: impl Into<String>) -> Self {
        Self {
            session,
            url: url.into(),
            paper_count: 0,
            papers: Vec::new(),
        }
    }

    pub fn file_totals(&self) -> FileTotals {
        FileTotals::from_papers(&self.papers)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexTotals {
    pub sessions: usize,
    pub papers: usize,
    pub files: FileTotals,
}

/// Contents of `<PREFIX>_Complete_Index.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceIndex {
    pub conference: String,
    pub base_url: String,
    pub totals: IndexTotals,
    pub sessions: Vec<SessionEntry>,
}

/// Every record known so far, previous runs included, in export order.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    sessions: Vec<SessionEntry>,
}

impl RecordSet {
    pub fn from_index(index: Option<ConferenceIndex>) -> Self {
        Self {
            sessions: index.map(|index| index.sessions).unwrap_or_default(),
        }
    }

    pub fn sessions(&self) -> &[SessionEntry] {
        &self.sessions
    }

    pub fn session(&self, code: &SessionCode) -> Option<&SessionEntry> {
        self.sessions.iter().find(|entry| &entry.session.code == code)
    }

    pub fn session_mut(&mut self, code: &SessionCode) -> Option<&mut SessionEntry> {
        self.sessions
            .iter_mut()
            .find(|entry| &entry.session.code == code)
    }

    /// Merges freshly parsed papers into the session, by paper id. Papers only
    /// the previous run knew about are kept after the fresh ones.
    pub fn merge_session(
        &mut self,
        session: SessionDescriptor,
        url: String,
        fresh: Vec<PaperRecord>,
    ) -> &mut SessionEntry {
        let position = match self
            .sessions
            .iter()
            .position(|entry| entry.session.code == session.code)
        {
            Some(position) => position,
            None => {
                self.sessions.push(SessionEntry::new(session.clone(), url.clone()));
                self.sessions.len() - 1
            }
        };

        let entry = &mut self.sessions[position];
        let previous = std::mem::take(&mut entry.papers);
        let mut previous_by_id: HashMap<PaperId, PaperRecord> = HashMap::new();
        let mut previous_order = Vec::new();
        for paper in previous {
            previous_order.push(paper.paper_id.clone());
            previous_by_id.insert(paper.paper_id.clone(), paper);
        }

        let mut papers = Vec::with_capacity(fresh.len());
        for mut paper in fresh {
            if let Some(old) = previous_by_id.remove(&paper.paper_id) {
                paper.merge_previous(old);
            }
            papers.push(paper);
        }
        for id in previous_order {
            if let Some(old) = previous_by_id.remove(&id) {
                papers.push(old);
            }
        }
        for paper in &mut papers {
            paper.session = session.clone();
        }

        entry.session = session;
        entry.url = url;
        entry.paper_count = papers.len();
        entry.papers = papers;
        entry
    }

    /// Listed sessions first, in listing order; the rest keep their order.
    pub fn reorder(&mut self, listing: &[SessionCode]) {
        let rank = |entry: &SessionEntry| {
            listing
                .iter()
                .position(|code| code == &entry.session.code)
                .unwrap_or(listing.len())
        };
        self.sessions.sort_by_key(rank);
    }

    pub fn total_papers(&self) -> usize {
        self.sessions.iter().map(|entry| entry.papers.len()).sum()
    }

    pub fn to_index(&self, conference: &str, base_url: &str) -> ConferenceIndex {
        let all_papers = self
            .sessions
            .iter()
            .flat_map(|entry| entry.papers.iter())
            .cloned()
            .collect::<Vec<_>>();
        let sessions = self
            .sessions
            .iter()
            .cloned()
            .map(|mut entry| {
                entry.paper_count = entry.papers.len();
                entry
            })
            .collect::<Vec<_>>();
        ConferenceIndex {
            conference: conference.to_string(),
            base_url: base_url.to_string(),
            totals: IndexTotals {
                sessions: sessions.len(),
                papers: all_papers.len(),
                files: FileTotals::from_papers(&all_papers),
            },
            sessions,
        }
    }
}
