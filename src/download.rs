use crate::domain::{FileLink, FileStatus, PaperRecord};
use crate::error::HarvestError;
use crate::fs_util::{persist_temp, temp_file_in};
use crate::http::Fetcher;
use crate::report::{FailedFile, RunReport};
use crate::store::OutputLayout;

/// Places every file of a record in its kind folder, fetching only what is
/// not already on disk.
pub struct DownloadManager<'a, F: Fetcher + ?Sized> {
    fetcher: &'a F,
    layout: &'a OutputLayout,
    enabled: bool,
}

impl<'a, F: Fetcher + ?Sized> DownloadManager<'a, F> {
    pub fn new(fetcher: &'a F, layout: &'a OutputLayout, enabled: bool) -> Self {
        Self {
            fetcher,
            layout,
            enabled,
        }
    }

    /// Updates each link's status and path and counts the outcome in
    /// `report`. Fetch failures mark the link and move on; filesystem errors
    /// abort.
    pub fn process(
        &self,
        record: &mut PaperRecord,
        report: &mut RunReport,
    ) -> Result<(), HarvestError> {
        let targets = record
            .files
            .iter()
            .map(|link| OutputLayout::relative_file_path(record, link.kind))
            .collect::<Vec<_>>();

        for (link, target) in record.files.iter_mut().zip(targets) {
            let outcome = match self.place(link, target) {
                Ok(outcome) => outcome,
                Err(err) if err.is_item_failure() => {
                    tracing::warn!(
                        "{} {} download failed: {err}",
                        record.paper_id,
                        link.kind
                    );
                    link.status = FileStatus::Failed;
                    link.local_path = None;
                    report.failures.push(FailedFile {
                        session: record.session.code.clone(),
                        paper_id: record.paper_id.clone(),
                        kind: link.kind,
                        url: link.url.clone(),
                        reason: err.to_string(),
                    });
                    FileStatus::Failed
                }
                Err(err) => return Err(err),
            };
            report.outcomes.record(link.kind, outcome);
        }
        Ok(())
    }

    fn place(&self, link: &mut FileLink, target: String) -> Result<FileStatus, HarvestError> {
        if link.is_on_disk() {
            if let Some(existing) = link.local_path.as_deref() {
                if self.layout.resolve(existing).as_std_path().is_file() {
                    return Ok(FileStatus::Skipped);
                }
                tracing::info!("{existing} is gone from disk, fetching again");
            }
        }

        let destination = self.layout.resolve(&target);
        if destination.as_std_path().is_file() {
            tracing::debug!("adopting existing {target}");
            link.status = FileStatus::Skipped;
            link.local_path = Some(target);
            return Ok(FileStatus::Skipped);
        }

        if !self.enabled {
            link.status = FileStatus::Pending;
            link.local_path = None;
            return Ok(FileStatus::Pending);
        }

        let parent = destination
            .parent()
            .ok_or_else(|| HarvestError::Filesystem(format!("invalid destination {destination}")))?;
        let temp = temp_file_in(parent)?;
        let bytes = self.fetcher.download(&link.url, temp.path())?;
        persist_temp(temp, &destination)?;

        tracing::info!("downloaded {target} ({bytes} bytes)");
        link.status = FileStatus::Downloaded;
        link.local_path = Some(target);
        Ok(FileStatus::Downloaded)
    }
}
