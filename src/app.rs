use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};

use crate::config::HarvestConfig;
use crate::domain::{SessionCode, SessionDescriptor};
use crate::download::DownloadManager;
use crate::error::HarvestError;
use crate::export::{export_global, export_session};
use crate::fs_util::write_atomic;
use crate::http::Fetcher;
use crate::listing::parse_session_index;
use crate::papers::{page_text, parse_session_page};
use crate::report::{FailedSession, RunReport, SessionStats};
use crate::store::{OutputLayout, RecordSet};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Listing -> sessions -> papers -> files, with the record set and the output
/// tree owned by this one control flow.
pub struct Harvester<F: Fetcher> {
    config: HarvestConfig,
    layout: OutputLayout,
    fetcher: F,
}

impl<F: Fetcher> Harvester<F> {
    pub fn new(config: HarvestConfig, fetcher: F) -> Self {
        let layout = OutputLayout::from_config(&config);
        Self {
            config,
            layout,
            fetcher,
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<RunReport, HarvestError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Prepare; output {}", self.layout.root()),
            elapsed: None,
        });
        self.layout.ensure_dirs()?;
        let mut records = RecordSet::from_index(self.layout.load_index()?);
        if records.total_papers() > 0 {
            tracing::info!(
                "resuming with {} papers from the previous index",
                records.total_papers()
            );
        }
        let mut report = RunReport::new(self.config.conference.clone());

        let listed = self.fetch_listing(sink)?;
        report.sessions_listed = listed.len();
        let selected = self.select_sessions(&listed, &records);

        for (position, session) in selected.into_iter().enumerate() {
            sink.event(ProgressEvent {
                message: format!("phase=Session; {} ({})", session.label(), position + 1),
                elapsed: Some(started.elapsed()),
            });
            self.harvest_session(session, &mut records, &mut report)?;
        }

        let order = listed
            .iter()
            .map(|session| session.code.clone())
            .collect::<Vec<_>>();
        records.reorder(&order);
        report.papers_indexed = records.total_papers();
        report.sessions = records.sessions().iter().map(SessionStats::from).collect();
        report.completed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        sink.event(ProgressEvent {
            message: "phase=Export; writing index, table and report".to_string(),
            elapsed: Some(started.elapsed()),
        });
        export_global(
            &self.layout,
            &records,
            &self.config.conference,
            self.config.base_url.as_str(),
            &report,
        )?;

        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; {} sessions, {} papers indexed",
                report.sessions_processed, report.papers_indexed
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    /// An unreachable listing is not fatal: the run still re-exports what the
    /// previous index holds.
    fn fetch_listing(&self, sink: &dyn ProgressSink) -> Result<Vec<SessionDescriptor>, HarvestError> {
        let url = self.config.listing_url()?;
        sink.event(ProgressEvent {
            message: format!("phase=Listing; {url}"),
            elapsed: None,
        });
        match self.fetcher.fetch_text(url.as_str()) {
            Ok(html) => {
                let sessions = parse_session_index(&html);
                if sessions.is_empty() {
                    tracing::warn!("no sessions found on {url}");
                } else {
                    tracing::info!("found {} sessions", sessions.len());
                }
                Ok(sessions)
            }
            Err(err) if err.is_item_failure() => {
                tracing::error!("session listing unavailable: {err}");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Applies the configured session filter and limit. Requested sessions
    /// missing from the listing are still harvested when the previous index
    /// knows their name.
    fn select_sessions(
        &self,
        listed: &[SessionDescriptor],
        records: &RecordSet,
    ) -> Vec<SessionDescriptor> {
        let mut selected = if self.config.sessions.is_empty() {
            listed.to_vec()
        } else {
            self.config
                .sessions
                .iter()
                .filter_map(|code| {
                    let known = listed
                        .iter()
                        .find(|session| &session.code == code)
                        .cloned()
                        .or_else(|| records.session(code).map(|entry| entry.session.clone()));
                    if known.is_none() {
                        tracing::warn!("session {code} is not listed and was never indexed");
                    }
                    known
                })
                .collect()
        };
        if let Some(limit) = self.config.limit {
            selected.truncate(limit);
        }
        selected
    }

    fn harvest_session(
        &self,
        session: SessionDescriptor,
        records: &mut RecordSet,
        report: &mut RunReport,
    ) -> Result<(), HarvestError> {
        let url = self.config.session_url(&session.code)?;
        let html = match self.fetcher.fetch_text(url.as_str()) {
            Ok(html) => html,
            Err(err) if err.is_item_failure() => {
                tracing::error!("session {} failed: {err}", session.code);
                report.failed_sessions.push(FailedSession {
                    code: session.code,
                    url: url.to_string(),
                    reason: err.to_string(),
                });
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if self.config.save_page_text {
            self.dump_page_text(&session.code, &html)?;
        }

        let parsed = parse_session_page(&html, &session, url.as_str());
        for rejected in &parsed.rejected {
            tracing::warn!(
                "session {}: skipped row {:?}: {}",
                session.code,
                rejected.row,
                rejected.reason
            );
        }
        tracing::info!(
            "session {}: {} papers parsed",
            session.code,
            parsed.papers.len()
        );
        report.rejected_rows += parsed.rejected.len();
        report.papers_found += parsed.papers.len();

        let downloads = DownloadManager::new(&self.fetcher, &self.layout, self.config.download);
        let entry = records.merge_session(session, url.to_string(), parsed.papers);
        for paper in &mut entry.papers {
            downloads.process(paper, report)?;
        }
        export_session(&self.layout, entry)?;
        report.sessions_processed += 1;

        // Checkpoint so an interrupted run resumes from here.
        self.layout
            .write_index(&records.to_index(&self.config.conference, self.config.base_url.as_str()))
    }

    fn dump_page_text(&self, code: &SessionCode, html: &str) -> Result<(), HarvestError> {
        let path = self.layout.page_text_path(code);
        write_atomic(&path, page_text(html).as_bytes())?;
        tracing::debug!("saved page text to {path}");
        Ok(())
    }
}
