use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::buffer::RingBuffer;
use crate::events::{EventBus, MonitorEvent};
use crate::models::Session;

use super::report::ContextReporter;

/// Watches a repository's `.git/logs/HEAD` and exports a commit-context
/// artifact for every new commit. The buffer is only read, never mutated.
pub(crate) struct GitTrigger {
    handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl GitTrigger {
    /// Start watching. Returns `None` (idle, no watcher task) when the
    /// session has no repository or the repository has no commit log yet.
    pub fn spawn(
        session: Arc<Session>,
        buffer: Arc<RingBuffer>,
        reporter: ContextReporter,
        events: EventBus,
    ) -> Option<Self> {
        let repo_path = session.repo_path.clone()?;
        let head_log = repo_path.join(".git").join("logs").join("HEAD");
        if !head_log.exists() {
            warn!(
                "no commit log at {}, git trigger staying idle",
                head_log.display()
            );
            return None;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(watch_commits(
            session, buffer, reporter, events, head_log, token,
        ));

        Some(Self {
            handle: Some(handle),
            cancel,
        })
    }

    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn watch_commits(
    session: Arc<Session>,
    buffer: Arc<RingBuffer>,
    reporter: ContextReporter,
    events: EventBus,
    head_log: PathBuf,
    cancel: CancellationToken,
) {
    let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(64);

    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.blocking_send(res);
        },
        notify::Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!("failed to create commit watcher: {err}");
            return;
        }
    };

    let logs_dir = head_log.parent().unwrap_or(Path::new("."));
    if let Err(err) = watcher.watch(logs_dir, RecursiveMode::NonRecursive) {
        warn!("failed to watch {}: {err}", logs_dir.display());
        return;
    }
    info!("git trigger watching {}", head_log.display());

    // Duplicate filesystem events for the same append (editors, amends
    // within the window, double flushes) collapse onto one export.
    let mut last_exported: Option<String> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("git trigger for session {} shutting down", session.id);
                break;
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let Ok(event) = event else { continue };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }
                if !event
                    .paths
                    .iter()
                    .any(|path| path.file_name().is_some_and(|name| name == "HEAD"))
                {
                    continue;
                }

                let Some(commit_hash) = read_latest_hash(&head_log).await else {
                    continue;
                };
                if last_exported.as_deref() == Some(commit_hash.as_str()) {
                    continue;
                }

                let entries = buffer.recent(reporter.window());
                match reporter.export(&session, &entries, &commit_hash) {
                    Ok(Some(path)) => {
                        last_exported = Some(commit_hash.clone());
                        events.emit(MonitorEvent::ContextExported {
                            session_id: session.id.clone(),
                            commit: commit_hash,
                            path,
                        });
                    }
                    Ok(None) => {
                        // Nothing new to write; still remember the hash so
                        // replays of the same event stay quiet.
                        last_exported = Some(commit_hash);
                    }
                    Err(err) => warn!("context export failed: {err:#}"),
                }
            }
        }
    }
}

/// Newest commit hash from the reflog: last line, second column.
async fn read_latest_hash(head_log: &Path) -> Option<String> {
    let contents = match tokio::fs::read_to_string(head_log).await {
        Ok(contents) => contents,
        Err(err) => {
            warn!("failed to read {}: {err}", head_log.display());
            return None;
        }
    };
    let last_line = contents.trim_end().lines().last()?;
    let mut parts = last_line.split_whitespace();
    let _old = parts.next()?;
    let new = parts.next()?;
    if new.is_empty() {
        None
    } else {
        Some(new.to_string())
    }
}
