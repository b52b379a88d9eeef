//! Structured results returned by install, uninstall and update.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::target::Scope;

/// A skipped or failed step, attributed to a plugin or a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Plugin name or document path
    pub subject: String,
    pub message: String,
}

impl Issue {
    pub fn plugin(name: &str, message: impl Into<String>) -> Self {
        Self {
            subject: name.to_string(),
            message: message.into(),
        }
    }

    pub fn document(path: &Path, message: impl Into<String>) -> Self {
        Self {
            subject: path.display().to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}

#[derive(Debug)]
pub struct InstallReport {
    pub scope: Scope,
    pub root: PathBuf,
    pub dry_run: bool,
    /// Plugins whose references were materialized
    pub plugins: Vec<String>,
    /// References created or re-pointed
    pub materialized: usize,
    /// References already pointing at the right source
    pub unchanged: usize,
    /// Owned references removed: retired versions, dropped components, shadowed slots
    pub pruned: usize,
    /// Destination slots occupied by entries dot-kit does not own
    pub conflicts: usize,
    /// Project components skipped because the global scope already provides them
    pub skipped_components: usize,
    pub hooks_merged: usize,
    pub services_merged: usize,
    /// Project services skipped because the global registry already defines them
    pub skipped_services: usize,
    pub issues: Vec<Issue>,
}

impl InstallReport {
    pub fn new(scope: Scope, root: PathBuf, dry_run: bool) -> Self {
        Self {
            scope,
            root,
            dry_run,
            plugins: Vec::new(),
            materialized: 0,
            unchanged: 0,
            pruned: 0,
            conflicts: 0,
            skipped_components: 0,
            hooks_merged: 0,
            services_merged: 0,
            skipped_services: 0,
            issues: Vec::new(),
        }
    }

    pub fn skipped_duplicates(&self) -> usize {
        self.skipped_components + self.skipped_services
    }

    pub fn merged(&self) -> usize {
        self.hooks_merged + self.services_merged
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}
