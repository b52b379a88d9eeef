//! Install, uninstall and update entry points.

use tracing::{info, warn};

use crate::config::HostPaths;
use crate::error::Result;
use crate::integrity::{self, IntegrityReport, UpdateRequest};
use crate::lock::with_target_lock;
use crate::materializer::{GlobalComponentIndex, Materializer};
use crate::merger::Merger;
use crate::report::{InstallReport, Issue};
use crate::source::SourceTree;
use crate::target::{InstallRequest, InstallTarget, ResolvedTarget, Scope, TargetResolver};
use crate::uninstall::{Confirm, UninstallOutcome, UninstallRequest, Uninstaller};

#[derive(Debug, Clone)]
pub struct Engine {
    source: SourceTree,
    host: HostPaths,
}

impl Engine {
    pub fn new(source: SourceTree, host: HostPaths) -> Self {
        Self { source, host }
    }

    pub fn source(&self) -> &SourceTree {
        &self.source
    }

    pub fn host(&self) -> &HostPaths {
        &self.host
    }

    /// Materialize and merge the selected plugins into the requested scope.
    ///
    /// Selection errors abort before anything is written. Failures of a single
    /// plugin are reported in [`InstallReport::issues`] and do not stop the rest.
    pub fn install(&self, request: &InstallRequest) -> Result<InstallReport> {
        let resolved = TargetResolver::new(&self.source, &self.host).resolve(request)?;
        let target = &resolved.target;
        let mut report = InstallReport::new(
            target.scope(),
            target.root().to_path_buf(),
            request.dry_run,
        );

        if request.dry_run {
            self.install_plugins(&resolved, &mut report);
        } else {
            with_target_lock(&target.lock_path(), || {
                self.install_plugins(&resolved, &mut report);
                Ok(())
            })?;
        }

        info!(
            scope = %report.scope,
            plugins = report.plugins.len(),
            materialized = report.materialized,
            issues = report.issues.len(),
            dry_run = report.dry_run,
            "install finished"
        );
        Ok(report)
    }

    fn install_plugins(&self, resolved: &ResolvedTarget, report: &mut InstallReport) {
        let target = &resolved.target;
        let index = self.component_index(target, report);
        let materializer = Materializer::new(&self.source, target, &index, report.dry_run);
        let merger = Merger::new(target, &self.host, report.dry_run);

        for name in &resolved.plugins {
            let plugin = match self.source.load_plugin(name) {
                Ok(plugin) => plugin,
                Err(e) => {
                    record(report, Issue::plugin(name, e.to_string()));
                    continue;
                }
            };

            match materializer.materialize(&plugin) {
                Ok(out) => {
                    report.materialized += out.materialized;
                    report.unchanged += out.unchanged;
                    report.pruned += out.pruned;
                    report.skipped_components += out.skipped;
                    report.conflicts += out.conflicts.len() + out.claimed.len();
                    for path in out.conflicts {
                        record(
                            report,
                            Issue::plugin(
                                name,
                                format!("{} exists and is not managed by dot-kit", path.display()),
                            ),
                        );
                    }
                    for (path, owner) in out.claimed {
                        record(
                            report,
                            Issue::plugin(
                                name,
                                format!(
                                    "{} is already provided by plugin '{}'",
                                    path.display(),
                                    owner
                                ),
                            ),
                        );
                    }
                    for path in out.kept {
                        record(
                            report,
                            Issue::plugin(name, format!("kept foreign entry {}", path.display())),
                        );
                    }
                }
                Err(e) => {
                    record(report, Issue::plugin(name, e.to_string()));
                    continue;
                }
            }

            match merger.merge_hooks(&plugin) {
                Ok(added) => report.hooks_merged += added,
                Err(e) => record(report, Issue::plugin(name, format!("hooks: {}", e))),
            }

            match merger.merge_services(&plugin) {
                Ok(merge) => {
                    report.services_merged += merge.added.len();
                    report.skipped_services += merge.skipped_global.len();
                }
                Err(e) => record(report, Issue::plugin(name, format!("services: {}", e))),
            }

            if let Err(e) = merger.enable(&plugin) {
                record(report, Issue::plugin(name, format!("enable: {}", e)));
            }

            info!(plugin = %name, version = %plugin.version, scope = %target.scope(), "plugin installed");
            report.plugins.push(name.clone());
        }
    }

    fn component_index(&self, target: &InstallTarget, report: &mut InstallReport) -> GlobalComponentIndex {
        if target.scope() != Scope::Project {
            return GlobalComponentIndex::default();
        }
        match GlobalComponentIndex::build(&self.host) {
            Ok(index) => index,
            Err(e) => {
                record(report, Issue::document(&self.host.settings(), e.to_string()));
                GlobalComponentIndex::default()
            }
        }
    }

    /// Remove everything dot-kit installed into the requested scope
    pub fn uninstall(
        &self,
        request: &UninstallRequest,
        confirm: &mut dyn Confirm,
    ) -> Result<UninstallOutcome> {
        let target = TargetResolver::new(&self.source, &self.host).resolve_scope(&request.scope)?;
        let uninstaller = Uninstaller::new(&self.source, &self.host);

        let plan = uninstaller.plan(&target)?;
        if plan.is_empty() {
            info!(scope = %target.scope(), "nothing to uninstall");
            return Ok(UninstallOutcome::NothingToDo);
        }
        if !confirm.confirm(&plan) {
            return Ok(UninstallOutcome::Declined);
        }

        let report = with_target_lock(&target.lock_path(), || {
            Ok(uninstaller.execute(&target, &plan))
        })?;
        Ok(UninstallOutcome::Removed(report))
    }

    /// Report broken references without changing anything
    pub fn update(&self, request: &UpdateRequest) -> Result<IntegrityReport> {
        let target = match &request.project {
            Some(path) => InstallTarget::project(path)?,
            None => InstallTarget::global(&self.host),
        };
        let report = integrity::check(&target, &self.source)?;
        if !report.is_healthy() {
            warn!(broken = report.broken.len(), root = %report.root.display(), "broken references found");
        }
        Ok(report)
    }
}

fn record(report: &mut InstallReport, issue: Issue) {
    warn!(subject = %issue.subject, "{}", issue.message);
    report.issues.push(issue);
}
