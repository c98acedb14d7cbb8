use std::path::PathBuf;

use serde::Serialize;

/// Caller-supplied description of a monitoring run.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub project_name: String,
    /// What the user intends to work on; steers classification.
    pub goal: String,
    /// Free-text description of activity that counts as on-task.
    pub allowed_description: String,
    /// Free-text description of activity that counts as off-task.
    pub blocked_description: String,
    /// Repository to watch for commits. `None` disables the git trigger.
    pub repo_path: Option<PathBuf>,
}

/// Immutable metadata for one monitoring run. The buffer, scheduler, and
/// intervention machine attached to it live in the monitor's registry.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub project_name: String,
    pub project_slug: String,
    pub goal: String,
    pub allowed_description: String,
    pub blocked_description: String,
    pub repo_path: Option<PathBuf>,
    /// Directory owning this session's frame files; removed on teardown.
    pub temp_dir: PathBuf,
}

impl Session {
    pub fn new(id: String, spec: SessionSpec, temp_root: &std::path::Path) -> Self {
        let project_slug = crate::utils::slugify(&spec.project_name);
        let temp_dir = temp_root.join(&project_slug);
        Self {
            id,
            project_name: spec.project_name,
            project_slug,
            goal: spec.goal,
            allowed_description: spec.allowed_description,
            blocked_description: spec.blocked_description,
            repo_path: spec.repo_path,
            temp_dir,
        }
    }
}
