//! The incremental fetch run.
//!
//! A run moves through `Init → RangeResolved → MailboxOpened → Iterating →
//! Finalized`:
//!
//! 1. load the watermark and resolve the date range;
//! 2. list the folder (server-side search, or a client-side filter when the
//!    store cannot search);
//! 3. visit the newest `process.mail.limit` messages, oldest first, and
//!    download every matching attachment that is not already on disk;
//! 4. persist the newest received date seen as the new watermark.

pub mod groupby;
pub mod matcher;
pub mod range;
pub mod sanitize;
pub mod walker;
pub mod watermark;

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::Cfg;
use crate::error::{FetchError, Result};
use crate::model::attachment::AttachmentPart;
use crate::model::message::Envelope;
use crate::store::{self, MailStore};

use self::groupby::GroupbyPath;
use self::matcher::{AttachmentMatcher, MatchCriteria, MessageMatcher};
use self::range::{later, DateRange, DateWindow};
use self::sanitize::sanitize_segment;
use self::walker::collect_attachments;
use self::watermark::WatermarkStore;

/// Settings of one run, read from the configuration.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Root of the download tree.
    pub download_dir: PathBuf,
    /// Also download parts declared `inline`.
    pub include_inline: bool,
    pub groupby: GroupbyPath,
    /// Visit at most this many of the newest messages; 0 or less means all.
    pub mail_limit: i64,
    pub window: DateWindow,
    pub criteria: MatchCriteria,
    pub folder: String,
    /// Report what would be downloaded without touching the disk or the watermark.
    pub dry_run: bool,
    /// Pause before returning from [`FetchEngine::run`].
    pub exit_delay: Duration,
}

impl FetchOptions {
    pub fn from_config(cfg: &Cfg) -> Result<Self> {
        let delay = cfg.int_or("process.exit.delay", 0)?;
        Ok(Self {
            download_dir: PathBuf::from(cfg.require("download.directory")?),
            include_inline: cfg.bool_or("download.inline", false),
            groupby: GroupbyPath::from_config(cfg),
            mail_limit: cfg.int_or("process.mail.limit", 0)?,
            window: DateWindow::from_config(cfg)?,
            criteria: MatchCriteria::from_config(cfg),
            folder: store::folder_name(cfg).to_string(),
            dry_run: false,
            exit_delay: Duration::from_secs(delay.max(0).unsigned_abs()),
        })
    }
}

/// Lifecycle of a run, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    RangeResolved,
    MailboxOpened,
    Iterating,
    Finalized,
}

/// What to do with one attachment candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadDecision {
    /// The file exists and is at least as new as the message.
    Skip,
    /// Dry run: report only.
    ReportOnly,
    Write,
}

impl DownloadDecision {
    /// Decide for `dest` given the message's received time.
    pub fn for_path(dest: &Path, received: DateTime<Utc>, dry_run: bool) -> Self {
        let up_to_date = std::fs::metadata(dest)
            .and_then(|m| m.modified())
            .map(|modified| DateTime::<Utc>::from(modified) >= received)
            .unwrap_or(false);
        if up_to_date {
            Self::Skip
        } else if dry_run {
            Self::ReportOnly
        } else {
            Self::Write
        }
    }
}

/// Progress notifications emitted during a run.
#[derive(Debug)]
pub enum FetchEvent<'a> {
    RangeResolved(&'a DateRange),
    FolderOpened {
        folder: &'a str,
        listed: usize,
        visiting: usize,
    },
    Message {
        position: usize,
        visiting: usize,
        envelope: &'a Envelope,
        matched: bool,
    },
    Downloaded {
        path: &'a Path,
        size: u64,
    },
    WouldDownload {
        path: &'a Path,
        size: u64,
    },
    Skipped {
        path: &'a Path,
    },
    MessageFailed {
        envelope: &'a Envelope,
        error: &'a FetchError,
    },
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchSummary {
    pub folder: String,
    pub range: DateRange,
    pub dry_run: bool,
    pub listed: usize,
    pub visited: usize,
    pub matched: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub failed_messages: usize,
    pub failed_attachments: usize,
    pub previous_watermark: Option<DateTime<Utc>>,
    /// Watermark after the run (unchanged on dry runs).
    pub watermark: Option<DateTime<Utc>>,
}

impl FetchSummary {
    fn new(folder: &str, range: DateRange, dry_run: bool, previous: Option<DateTime<Utc>>) -> Self {
        Self {
            folder: folder.to_string(),
            range,
            dry_run,
            listed: 0,
            visited: 0,
            matched: 0,
            downloaded: 0,
            skipped: 0,
            filtered: 0,
            failed_messages: 0,
            failed_attachments: 0,
            previous_watermark: previous,
            watermark: previous,
        }
    }
}

/// Runs the fetch against a [`MailStore`].
pub struct FetchEngine {
    options: FetchOptions,
    messages: MessageMatcher,
    attachments: AttachmentMatcher,
    known_dirs: HashSet<PathBuf>,
    phase: Phase,
}

impl FetchEngine {
    pub fn new(options: FetchOptions) -> Self {
        let messages = options.criteria.message_matcher();
        let attachments = options.criteria.attachment_matcher();
        Self {
            options,
            messages,
            attachments,
            known_dirs: HashSet::new(),
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "Fetch phase");
        self.phase = phase;
    }

    /// Execute one run at time `now`.
    ///
    /// Errors returned here (watermark unreadable, folder cannot be opened or
    /// listed) abort the run before the watermark moves. Problems with single
    /// messages or files are logged and counted in the summary.
    pub fn run(
        &mut self,
        store: &mut dyn MailStore,
        watermark: &mut dyn WatermarkStore,
        now: DateTime<Utc>,
        sink: &mut dyn FnMut(FetchEvent<'_>),
    ) -> Result<FetchSummary> {
        self.enter(Phase::Init);
        let previous = watermark.load()?;
        let range = self.options.window.resolve(previous, now);
        let mut summary = FetchSummary::new(&self.options.folder, range, self.options.dry_run, previous);

        self.enter(Phase::RangeResolved);
        info!(range = %range, watermark = ?previous, "Resolved date range");
        sink(FetchEvent::RangeResolved(&range));

        store.open_folder(&self.options.folder, true)?;
        let listed = list_messages(store, &range)?;
        self.enter(Phase::MailboxOpened);

        let oldest = window_start(listed.len(), self.options.mail_limit);
        let visiting = &listed[oldest..];
        summary.listed = listed.len();
        info!(
            folder = %self.options.folder,
            listed = listed.len(),
            visiting = visiting.len(),
            "Listed messages"
        );
        sink(FetchEvent::FolderOpened {
            folder: &self.options.folder,
            listed: listed.len(),
            visiting: visiting.len(),
        });

        self.enter(Phase::Iterating);
        let mut latest: Option<DateTime<Utc>> = None;
        for (position, envelope) in visiting.iter().enumerate() {
            summary.visited += 1;
            latest = later(latest, Some(envelope.received));

            let matched = self.messages.matches(envelope);
            sink(FetchEvent::Message {
                position: position + 1,
                visiting: visiting.len(),
                envelope,
                matched,
            });
            if !matched {
                continue;
            }
            summary.matched += 1;

            if let Err(e) = self.process_message(store, envelope, &mut summary, sink) {
                warn!(id = envelope.id, subject = %envelope.subject, error = %e, "Message failed");
                summary.failed_messages += 1;
                sink(FetchEvent::MessageFailed {
                    envelope,
                    error: &e,
                });
            }
        }

        self.enter(Phase::Finalized);
        if let Err(e) = store.close() {
            debug!(error = %e, "Closing the mailbox failed");
        }

        if !self.options.dry_run && summary.visited > 0 {
            if let Some(newest) = later(previous, latest) {
                match watermark.save(newest) {
                    Ok(()) => summary.watermark = Some(newest),
                    Err(e) => error!(error = %e, "Could not save watermark"),
                }
            }
        }

        info!(
            visited = summary.visited,
            matched = summary.matched,
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed_messages + summary.failed_attachments,
            "Fetch finished"
        );

        if !self.options.exit_delay.is_zero() {
            debug!(delay = ?self.options.exit_delay, "Waiting before exit");
            std::thread::sleep(self.options.exit_delay);
        }
        Ok(summary)
    }

    /// Download the matching attachments of one message.
    fn process_message(
        &mut self,
        store: &mut dyn MailStore,
        envelope: &Envelope,
        summary: &mut FetchSummary,
        sink: &mut dyn FnMut(FetchEvent<'_>),
    ) -> Result<()> {
        let body = store.fetch_body(envelope)?;
        let candidates = collect_attachments(&body, self.options.include_inline);
        if candidates.is_empty() {
            return Ok(());
        }

        let dir = self.options.groupby.resolve(&self.options.download_dir, envelope);
        if !self.options.dry_run {
            self.ensure_dir(&dir)?;
        }

        for part in &candidates {
            if !self.attachments.matches(part) {
                summary.filtered += 1;
                continue;
            }

            let filename = sanitize_segment(part.filename);
            if filename.is_empty() {
                warn!(id = envelope.id, name = part.filename, "Attachment name is unusable, skipping");
                summary.failed_attachments += 1;
                continue;
            }
            let dest = dir.join(filename);

            match DownloadDecision::for_path(&dest, envelope.received, self.options.dry_run) {
                DownloadDecision::Skip => {
                    debug!(path = %dest.display(), "Already downloaded");
                    summary.skipped += 1;
                    sink(FetchEvent::Skipped { path: &dest });
                }
                DownloadDecision::ReportOnly => {
                    summary.downloaded += 1;
                    sink(FetchEvent::WouldDownload {
                        path: &dest,
                        size: part.size,
                    });
                }
                DownloadDecision::Write => match write_attachment(&dest, part, envelope.received) {
                    Ok(size) => {
                        info!(path = %dest.display(), size, "Saved attachment");
                        summary.downloaded += 1;
                        sink(FetchEvent::Downloaded { path: &dest, size });
                    }
                    Err(e) => {
                        warn!(path = %dest.display(), error = %e, "Failed to save attachment");
                        summary.failed_attachments += 1;
                    }
                },
            }
        }
        Ok(())
    }

    fn ensure_dir(&mut self, dir: &Path) -> Result<()> {
        if self.known_dirs.contains(dir) {
            return Ok(());
        }
        if !dir.is_dir() {
            std::fs::create_dir_all(dir).map_err(|e| FetchError::io(dir, e))?;
            debug!(path = %dir.display(), "Created directory");
        }
        self.known_dirs.insert(dir.to_path_buf());
        Ok(())
    }
}

/// Messages in `range`, ascending by arrival.
fn list_messages(store: &mut dyn MailStore, range: &DateRange) -> Result<Vec<Envelope>> {
    if range.is_all() {
        return store.messages();
    }
    match store.search(range)? {
        Some(found) => Ok(found),
        None => {
            debug!("Store cannot search, filtering by received date");
            Ok(store
                .messages()?
                .into_iter()
                .filter(|e| range.contains(e.received))
                .collect())
        }
    }
}

/// Index of the oldest message to visit out of `listed`, given the cap.
pub fn window_start(listed: usize, limit: i64) -> usize {
    match usize::try_from(limit) {
        Ok(cap) if cap > 0 && listed > cap => listed - cap,
        _ => 0,
    }
}

/// Copy the attachment to `dest` and stamp it with the message time.
fn write_attachment(dest: &Path, part: &AttachmentPart<'_>, received: DateTime<Utc>) -> Result<u64> {
    let mut file = File::create(dest).map_err(|e| FetchError::io(dest, e))?;
    let written = std::io::copy(&mut part.reader(), &mut file).map_err(|e| FetchError::io(dest, e))?;
    file.set_modified(SystemTime::from(received))
        .map_err(|e| FetchError::io(dest, e))?;
    Ok(written)
}
