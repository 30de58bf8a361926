use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCode(String);

impl SessionCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lenient parse for user input (`--session suspb`).
    pub fn normalize(value: &str) -> Result<Self, HarvestError> {
        value.trim().to_uppercase().parse()
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionCode {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = (2..=8).contains(&trimmed.len())
            && trimmed
                .chars()
                .next()
                .map(|ch| ch.is_ascii_uppercase())
                .unwrap_or(false)
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit());
        if !is_valid {
            return Err(HarvestError::InvalidSessionCode(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaperId(String);

impl PaperId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A paper id is the session code followed by its running number.
    pub fn for_session(session: &SessionCode, value: &str) -> Result<Self, HarvestError> {
        let trimmed = value.trim();
        let number = trimmed
            .strip_prefix(session.as_str())
            .ok_or_else(|| HarvestError::InvalidPaperId(value.to_string()))?;
        if number.is_empty() || !number.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(HarvestError::InvalidPaperId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub code: SessionCode,
    pub name: String,
}

impl SessionDescriptor {
    pub fn new(code: SessionCode, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }

    /// `"<code> - <name>"`, before sanitizing.
    pub fn label(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Presentation,
    Paper,
    Poster,
}

impl FileKind {
    pub const ALL: [FileKind; 3] = [FileKind::Presentation, FileKind::Paper, FileKind::Poster];

    pub fn folder(self) -> &'static str {
        match self {
            FileKind::Presentation => "Presentations",
            FileKind::Paper => "Papers",
            FileKind::Poster => "Posters",
        }
    }

    pub fn file_suffix(self) -> &'static str {
        match self {
            FileKind::Presentation => "_talk",
            FileKind::Paper => "",
            FileKind::Poster => "_poster",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Presentation => write!(f, "presentation"),
            FileKind::Paper => write!(f, "paper"),
            FileKind::Poster => write!(f, "poster"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Pending,
    Downloaded,
    Skipped,
    Failed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Pending => write!(f, "pending"),
            FileStatus::Downloaded => write!(f, "downloaded"),
            FileStatus::Skipped => write!(f, "skipped"),
            FileStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLink {
    pub url: String,
    pub kind: FileKind,
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub status: FileStatus,
}

impl FileLink {
    pub fn new(url: impl Into<String>, kind: FileKind) -> Self {
        Self {
            url: url.into(),
            kind,
            local_path: None,
            status: FileStatus::Pending,
        }
    }

    /// Downloaded or adopted from disk; either way a complete file exists.
    pub fn is_on_disk(&self) -> bool {
        matches!(self.status, FileStatus::Downloaded | FileStatus::Skipped)
            && self.local_path.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub paper_id: PaperId,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub institution: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub pages: Option<String>,
    pub session: SessionDescriptor,
    #[serde(default)]
    pub files: Vec<FileLink>,
}

impl PaperRecord {
    pub fn first_file(&self, kind: FileKind) -> Option<&FileLink> {
        self.files.iter().find(|link| link.kind == kind)
    }

    /// Folds the previous run's record for the same paper into this freshly
    /// parsed one. Fresh metadata wins unless it came back empty; download
    /// state of known links carries over; links the page no longer lists are
    /// kept.
    pub fn merge_previous(&mut self, previous: PaperRecord) {
        if self.title.is_empty() {
            self.title = previous.title;
        }
        if self.authors.is_empty() {
            self.authors = previous.authors;
        }
        if self.institution.is_empty() {
            self.institution = previous.institution;
        }
        if self.abstract_text.is_empty() {
            self.abstract_text = previous.abstract_text;
        }
        if self.doi.is_none() {
            self.doi = previous.doi;
        }
        if self.pages.is_none() {
            self.pages = previous.pages;
        }

        for old in previous.files {
            match self.files.iter_mut().find(|link| link.url == old.url) {
                Some(link) => {
                    link.local_path = old.local_path;
                    link.status = old.status;
                }
                None => self.files.push(old),
            }
        }
    }
}
