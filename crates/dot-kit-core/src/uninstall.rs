//! Reversal of everything dot-kit installed into a target.
//!
//! Uninstall is planned first, confirmed through a [`Confirm`] implementation
//! and only then executed. Ownership is decided by inspection: references must
//! resolve into the source tree and document entries must carry the
//! provenance tag.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::HostPaths;
use crate::document::SharedDocument;
use crate::enabled::{namespace_keys, prune_namespace};
use crate::error::Result;
use crate::hooks::{count_tagged_hooks, strip_tagged_hooks};
use crate::reference::{collect_references, prune_empty_dirs, Reference};
use crate::report::Issue;
use crate::services::{count_tagged_services, remove_services, tagged_service_keys, ServiceManifest};
use crate::source::SourceTree;
use crate::target::{InstallTarget, Scope, ScopeRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallRequest {
    pub scope: ScopeRequest,
}

/// Asked once, after planning and before anything is removed
pub trait Confirm {
    fn confirm(&mut self, plan: &RemovalPlan) -> bool;
}

/// Always proceeds
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _plan: &RemovalPlan) -> bool {
        true
    }
}

/// Always declines
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeNo;

impl Confirm for AssumeNo {
    fn confirm(&mut self, _plan: &RemovalPlan) -> bool {
        false
    }
}

/// Everything an uninstall would remove from one target
#[derive(Debug, Clone)]
pub struct RemovalPlan {
    pub scope: Scope,
    pub root: PathBuf,
    /// Owned references
    pub references: Vec<Reference>,
    /// Links that resolve outside the source tree; kept
    pub foreign: Vec<PathBuf>,
    pub hook_entries: usize,
    /// Global service keys from the manifest that are still tagged
    pub service_keys: Vec<String>,
    /// Enabled-registry keys under the namespace
    pub enabled_keys: Vec<String>,
    /// Provenance manifest to delete, if present
    pub manifest: Option<PathBuf>,
    /// Tagged project service entries that will be left alone
    pub untouched_services: usize,
}

impl RemovalPlan {
    fn new(target: &InstallTarget) -> Self {
        Self {
            scope: target.scope(),
            root: target.root().to_path_buf(),
            references: Vec::new(),
            foreign: Vec::new(),
            hook_entries: 0,
            service_keys: Vec::new(),
            enabled_keys: Vec::new(),
            manifest: None,
            untouched_services: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
            && self.hook_entries == 0
            && self.service_keys.is_empty()
            && self.enabled_keys.is_empty()
            && self.manifest.is_none()
    }
}

#[derive(Debug)]
pub struct UninstallReport {
    pub scope: Scope,
    pub root: PathBuf,
    pub references_removed: usize,
    pub foreign_kept: Vec<PathBuf>,
    pub hooks_removed: usize,
    pub services_removed: Vec<String>,
    pub enabled_removed: Vec<String>,
    /// Things the user may want to clean up by hand
    pub notices: Vec<String>,
    pub issues: Vec<Issue>,
}

impl UninstallReport {
    fn new(plan: &RemovalPlan) -> Self {
        Self {
            scope: plan.scope,
            root: plan.root.clone(),
            references_removed: 0,
            foreign_kept: plan.foreign.clone(),
            hooks_removed: 0,
            services_removed: Vec::new(),
            enabled_removed: Vec::new(),
            notices: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

#[derive(Debug)]
pub enum UninstallOutcome {
    NothingToDo,
    Declined,
    Removed(UninstallReport),
}

pub struct Uninstaller<'a> {
    source: &'a SourceTree,
    host: &'a HostPaths,
}

impl<'a> Uninstaller<'a> {
    pub fn new(source: &'a SourceTree, host: &'a HostPaths) -> Self {
        Self { source, host }
    }

    pub fn plan(&self, target: &InstallTarget) -> Result<RemovalPlan> {
        let mut plan = RemovalPlan::new(target);

        for dir in target.reference_dirs() {
            for reference in collect_references(&dir)? {
                if reference.is_owned_by(self.source) {
                    plan.references.push(reference);
                } else {
                    plan.foreign.push(reference.path);
                }
            }
        }

        let settings = SharedDocument::new(target.hook_registry()).read()?;
        plan.hook_entries = count_tagged_hooks(&settings);

        match target.scope() {
            Scope::Project => {
                let services = SharedDocument::new(target.service_registry()).read()?;
                plan.untouched_services = count_tagged_services(&services);
            }
            Scope::Global => {
                let manifest = ServiceManifest::new(self.host.service_manifest());
                let keys = manifest.load()?;
                let services = SharedDocument::new(target.service_registry()).read()?;
                plan.service_keys = tagged_service_keys(&services, &keys);
                plan.enabled_keys = namespace_keys(&settings, &self.host.namespace);
                if manifest.path().exists() {
                    plan.manifest = Some(manifest.path().to_path_buf());
                }
            }
        }

        Ok(plan)
    }

    /// Carry out a confirmed plan; failures are collected as issues
    pub fn execute(&self, target: &InstallTarget, plan: &RemovalPlan) -> UninstallReport {
        let mut report = UninstallReport::new(plan);

        if plan.scope == Scope::Global && !plan.service_keys.is_empty() {
            self.remove_services(target, plan, &mut report);
        }

        let settings = SharedDocument::new(target.hook_registry());
        let namespace = (plan.scope == Scope::Global).then_some(self.host.namespace.as_str());
        let stripped = settings.update(false, |doc| {
            let hooks = strip_tagged_hooks(doc, settings.path())?;
            let enabled = namespace.map(|ns| prune_namespace(doc, ns)).unwrap_or_default();
            Ok((hooks, enabled))
        });
        match stripped {
            Ok((hooks, enabled)) => {
                report.hooks_removed = hooks;
                report.enabled_removed = enabled;
            }
            Err(e) => record(&mut report, Issue::document(settings.path(), e.to_string())),
        }

        for reference in &plan.references {
            match reference.remove() {
                Ok(()) => report.references_removed += 1,
                Err(e) => record(&mut report, Issue::document(&reference.path, e.to_string())),
            }
        }

        if plan.scope == Scope::Global && report.issues.is_empty() {
            if let Some(path) = &plan.manifest {
                if let Err(e) = ServiceManifest::new(path).remove() {
                    record(&mut report, Issue::document(path, e.to_string()));
                }
            }
        }

        for dir in target.reference_dirs() {
            if let Err(e) = prune_empty_dirs(&dir) {
                record(&mut report, Issue::document(&dir, e.to_string()));
            }
        }

        if plan.untouched_services > 0 {
            report.notices.push(format!(
                "{} service entr{} in {} left in place; remove manually if no longer needed",
                plan.untouched_services,
                if plan.untouched_services == 1 { "y" } else { "ies" },
                target.service_registry().display()
            ));
        }

        info!(
            scope = %plan.scope,
            references = report.references_removed,
            hooks = report.hooks_removed,
            services = report.services_removed.len(),
            "uninstalled"
        );
        report
    }

    fn remove_services(&self, target: &InstallTarget, plan: &RemovalPlan, report: &mut UninstallReport) {
        let keys: BTreeSet<String> = plan.service_keys.iter().cloned().collect();
        let doc = SharedDocument::new(target.service_registry());
        match doc.update(false, |value| Ok(remove_services(value, &keys))) {
            Ok(removed) => report.services_removed = removed,
            Err(e) => record(report, Issue::document(doc.path(), e.to_string())),
        }
    }
}

fn record(report: &mut UninstallReport, issue: Issue) {
    warn!(subject = %issue.subject, "{}", issue.message);
    report.issues.push(issue);
}
