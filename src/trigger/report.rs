use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;

use crate::models::{ActivityRecord, Session};

/// Renders the recent activity buffer into a Markdown commit-context
/// artifact under `<repo>/.devscope/`.
pub struct ContextReporter {
    repo_path: PathBuf,
    output_dir: PathBuf,
    window: std::time::Duration,
}

impl ContextReporter {
    pub fn new(repo_path: PathBuf, window: std::time::Duration) -> Self {
        let output_dir = repo_path.join(".devscope");
        Self {
            repo_path,
            output_dir,
            window,
        }
    }

    pub fn window(&self) -> std::time::Duration {
        self.window
    }

    /// Write the artifact for one commit. Returns the path only when a new
    /// artifact was written: an existing artifact for the same commit is
    /// never touched, and an empty buffer produces nothing.
    pub fn export(
        &self,
        session: &Session,
        entries: &[Arc<ActivityRecord>],
        commit_hash: &str,
    ) -> Result<Option<PathBuf>> {
        if entries.is_empty() {
            info!("no recent buffer entries, skipping context report");
            return Ok(None);
        }

        let short_hash: String = commit_hash.chars().take(12).collect();
        let path = self
            .output_dir
            .join(format!("commit_context_{short_hash}.md"));
        if path.exists() {
            info!("context report for {short_hash} already exists, leaving it");
            return Ok(None);
        }

        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "failed to create export directory {}",
                self.output_dir.display()
            )
        })?;

        let document = self.render(session, entries, commit_hash);
        std::fs::write(&path, document)
            .with_context(|| format!("failed to write context report {}", path.display()))?;
        info!("context report written to {}", path.display());
        Ok(Some(path))
    }

    fn render(
        &self,
        session: &Session,
        entries: &[Arc<ActivityRecord>],
        commit_hash: &str,
    ) -> String {
        let repo_name = self
            .repo_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.repo_path.display().to_string());

        let mut lines = vec![
            "# DevScope Commit Context".to_string(),
            format!("- Session: `{}`", session.goal),
            format!("- Commit: `{commit_hash}`"),
            format!("- Repo: `{repo_name}`"),
            format!("- Generated: {}", Utc::now().to_rfc3339()),
            format!(
                "- Lookback Window: last {} minutes ({} frames)",
                self.window.as_secs() / 60,
                entries.len()
            ),
            String::new(),
            "## Visual Timeline".to_string(),
        ];
        lines.extend(entries.iter().map(|entry| format!("- {}", timeline_line(entry))));

        lines.push(String::new());
        lines.push("## Structured Event Table".to_string());
        lines.push(String::new());
        lines.extend(entries.iter().map(|entry| structured_row(entry)));

        lines.push(String::new());
        lines.push("## Raw Activity Records".to_string());
        for entry in entries {
            lines.push("```json".to_string());
            lines.push(
                serde_json::to_string_pretty(entry.as_ref())
                    .unwrap_or_else(|err| format!("{{\"error\": \"{err}\"}}")),
            );
            lines.push("```".to_string());
        }

        let mut document = lines.join("\n");
        document.push('\n');
        document
    }
}

fn timeline_line(entry: &ActivityRecord) -> String {
    let mut line = format!(
        "{} | type={} | task={} | context={} | error={} | function={} | doc={} | app={} | focus_app={} | window=\"{}\" | state={}",
        entry.timestamp.to_rfc3339(),
        entry.activity_type,
        entry.task,
        entry.technical_context,
        entry.error_code.as_deref().unwrap_or("n/a"),
        entry.function_target.as_deref().unwrap_or("n/a"),
        entry.documentation_title.as_deref().unwrap_or("n/a"),
        entry.app_name,
        entry.active_app,
        entry.window_title,
        entry.state.as_str(),
    );
    if let Some(url) = &entry.doc_url {
        line.push_str(&format!(" | doc_url={url}"));
    }
    line
}

fn structured_row(entry: &ActivityRecord) -> String {
    format!(
        "- **{}** - {} :: {}\n  - Context: {}\n  - Error: {} | Function: {}\n  - Docs: {} ({})\n  - Apps: model={}, focus={}\n  - Score: {}",
        entry.timestamp.to_rfc3339(),
        entry.activity_type,
        entry.task,
        entry.technical_context,
        entry.error_code.as_deref().unwrap_or("n/a"),
        entry.function_target.as_deref().unwrap_or("n/a"),
        entry.documentation_title.as_deref().unwrap_or("n/a"),
        entry.doc_url.as_deref().unwrap_or("n/a"),
        entry.app_name,
        entry.active_app,
        entry
            .alignment_score
            .map(|score| score.to_string())
            .unwrap_or_else(|| "n/a".to_string()),
    )
}
