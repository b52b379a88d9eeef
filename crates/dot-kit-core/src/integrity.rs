//! Read-only health check of materialized references.

use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::reference::collect_references;
use crate::source::SourceTree;
use crate::target::{InstallTarget, Scope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Check this project instead of the global scope
    pub project: Option<PathBuf>,
}

/// A reference whose target no longer exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenReference {
    pub path: PathBuf,
    pub target: PathBuf,
}

#[derive(Debug)]
pub struct IntegrityReport {
    pub scope: Scope,
    pub root: PathBuf,
    /// Owned references inspected
    pub checked: usize,
    pub broken: Vec<BrokenReference>,
    /// Links resolving outside the source tree
    pub foreign: Vec<PathBuf>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.broken.is_empty()
    }
}

/// Walk the target's references without modifying anything
pub fn check(target: &InstallTarget, source: &SourceTree) -> Result<IntegrityReport> {
    let mut report = IntegrityReport {
        scope: target.scope(),
        root: target.root().to_path_buf(),
        checked: 0,
        broken: Vec::new(),
        foreign: Vec::new(),
    };

    for dir in target.reference_dirs() {
        for reference in collect_references(&dir)? {
            if !reference.is_owned_by(source) {
                report.foreign.push(reference.path);
                continue;
            }
            report.checked += 1;
            if reference.is_broken() {
                debug!(path = %reference.path.display(), "broken reference");
                report.broken.push(BrokenReference {
                    path: reference.path,
                    target: reference.target,
                });
            }
        }
    }

    Ok(report)
}
