//! Drop-directory intake for uploaded results files.
//!
//! Files appearing in the inbox are moved into the staging directory and
//! submitted through the gateway. Dotfiles are ignored so uploaders can write
//! `.name.tmp` and rename when complete.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use courtside_core::CancellationToken;
use courtside_queue::{AdmissionOutcome, StagedFile, SubmissionGateway};

use crate::error::ServiceError;

/// Watches an inbox directory and feeds new files to the gateway.
pub struct Inbox {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Inbox {
    /// Start watching `dir`. Files already present are submitted first.
    pub fn watch(
        dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        gateway: SubmissionGateway<StagedFile>,
        cancel: CancellationToken,
    ) -> Result<Self, ServiceError> {
        let dir = dir.into();
        let staging_dir = staging_dir.into();
        std::fs::create_dir_all(&dir)?;

        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();

        for path in existing_files(&dir)? {
            let _ = tx.send(path);
        }

        let event_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                for path in incoming_files(&event) {
                    let _ = event_tx.send(path);
                }
            }
            Err(e) => warn!(error = %e, "inbox watcher error"),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        drop(tx);

        info!(path = %dir.display(), staging = %staging_dir.display(), "watching inbox for results files");
        let task = tokio::spawn(intake_loop(rx, staging_dir, gateway, cancel));

        Ok(Self {
            dir,
            _watcher: watcher,
            task,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stop watching and wait for the intake task to finish.
    pub async fn stop(self) {
        drop(self._watcher);
        if let Err(e) = self.task.await {
            warn!(error = %e, "inbox intake task failed");
        }
    }
}

async fn intake_loop(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    staging_dir: PathBuf,
    gateway: SubmissionGateway<StagedFile>,
    cancel: CancellationToken,
) {
    loop {
        let path = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(path) => path,
                None => break,
            },
        };

        // Duplicate events for a file we already moved find nothing here.
        if !path.is_file() {
            debug!(path = %path.display(), "inbox entry gone before staging");
            continue;
        }

        let staged = match StagedFile::stage(&path, &staging_dir).await {
            Ok(staged) => staged,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to stage inbox file");
                continue;
            }
        };

        match gateway.submit(staged, &cancel).await {
            AdmissionOutcome::Admitted => {}
            outcome if outcome.is_retryable() => {
                warn!(path = %path.display(), outcome = %outcome, "results file dropped, upload it again later");
            }
            outcome => {
                warn!(path = %path.display(), outcome = %outcome, "results file refused, service unavailable");
            }
        }
    }
    debug!("inbox intake stopped");
}

/// Regular, non-hidden files directly inside `dir`, oldest name first.
fn existing_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && !is_hidden(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Paths from a watcher event that should be picked up.
fn incoming_files(event: &Event) -> Vec<PathBuf> {
    let arrived = matches!(
        event.kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Create(CreateKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Both))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Any))
    );
    if !arrived {
        return Vec::new();
    }

    let paths: &[PathBuf] = match event.kind {
        // Both ends of a rename; the target is last.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => &event.paths[event.paths.len().saturating_sub(1)..],
        _ => &event.paths,
    };
    paths.iter().filter(|p| !is_hidden(p)).cloned().collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true)
}
