//! Installation targets and selection resolution.
//!
//! Everything here is computed before any mutation: an unknown profile, a
//! missing plugin or a missing project directory aborts the run with no
//! partial state.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::HostPaths;
use crate::error::{DotKitError, Result};
use crate::reference::Layout;
use crate::source::{ComponentKind, SourceTree};

const CLAUDE_DIR: &str = ".claude";
const SETTINGS_FILE: &str = "settings.json";
const PROJECT_SERVICES_FILE: &str = ".mcp.json";
const LOCK_FILE: &str = ".dot-kit.lock";

/// Installation scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Shared by every project
    Global,
    /// A single project directory
    Project,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Project => write!(f, "project"),
        }
    }
}

/// A concrete destination with all of its document locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    scope: Scope,
    root: PathBuf,
    reference_root: PathBuf,
    service_registry: PathBuf,
}

impl InstallTarget {
    pub fn global(host: &HostPaths) -> Self {
        Self {
            scope: Scope::Global,
            root: host.host_dir.clone(),
            reference_root: host.namespace_dir(),
            service_registry: host.service_registry.clone(),
        }
    }

    /// Project target rooted at `<project>/.claude`; the project itself must exist
    pub fn project(project_dir: &Path) -> Result<Self> {
        if !project_dir.is_dir() {
            return Err(DotKitError::TargetNotFound {
                path: project_dir.to_path_buf(),
            });
        }
        let root = project_dir.join(CLAUDE_DIR);
        Ok(Self {
            scope: Scope::Project,
            reference_root: root.clone(),
            root,
            service_registry: project_dir.join(PROJECT_SERVICES_FILE),
        })
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Destination root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory under which references are materialized
    pub fn reference_root(&self) -> &Path {
        &self.reference_root
    }

    /// Directories that may hold references owned by this target.
    ///
    /// A project root is shared with the user, so only its group directories
    /// are searched.
    pub fn reference_dirs(&self) -> Vec<PathBuf> {
        match self.scope {
            Scope::Global => vec![self.reference_root.clone()],
            Scope::Project => ComponentKind::ALL
                .iter()
                .map(|kind| self.reference_root.join(kind.dir_name()))
                .collect(),
        }
    }

    pub fn hook_registry(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn service_registry(&self) -> &Path {
        &self.service_registry
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn layout(&self) -> Layout {
        match self.scope {
            Scope::Global => Layout::Versioned,
            Scope::Project => Layout::Flat,
        }
    }
}

/// Requested scope, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRequest {
    Global,
    Project(PathBuf),
}

/// Which plugins to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Plugins(Vec<String>),
    Profile(String),
    All,
}

impl Selection {
    /// Explicit list wins over a profile, a profile wins over "all"
    pub fn from_parts(plugins: Vec<String>, profile: Option<String>) -> Self {
        if !plugins.is_empty() {
            Self::Plugins(plugins)
        } else if let Some(profile) = profile {
            Self::Profile(profile)
        } else {
            Self::All
        }
    }
}

/// Everything the engine needs to run an install, with no interactive input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub scope: ScopeRequest,
    pub selection: Selection,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub target: InstallTarget,
    /// Ordered, de-duplicated plugin names
    pub plugins: Vec<String>,
}

pub struct TargetResolver<'a> {
    source: &'a SourceTree,
    host: &'a HostPaths,
}

impl<'a> TargetResolver<'a> {
    pub fn new(source: &'a SourceTree, host: &'a HostPaths) -> Self {
        Self { source, host }
    }

    pub fn resolve_scope(&self, scope: &ScopeRequest) -> Result<InstallTarget> {
        match scope {
            ScopeRequest::Global => Ok(InstallTarget::global(self.host)),
            ScopeRequest::Project(path) => InstallTarget::project(path),
        }
    }

    pub fn resolve(&self, request: &InstallRequest) -> Result<ResolvedTarget> {
        let target = self.resolve_scope(&request.scope)?;

        let available = self.source.plugin_names()?;
        if available.is_empty() {
            return Err(DotKitError::EmptySourceTree {
                path: self.source.root().to_path_buf(),
            });
        }

        let requested = match &request.selection {
            Selection::Plugins(names) => {
                for name in names {
                    if !self.source.has_plugin(name) {
                        return Err(DotKitError::PluginNotFound { name: name.clone() });
                    }
                }
                names.clone()
            }
            Selection::Profile(profile) => {
                let mut profiles = self.source.profiles()?;
                let def = profiles.profiles.remove(profile).ok_or_else(|| {
                    DotKitError::ProfileNotFound {
                        name: profile.clone(),
                    }
                })?;
                for name in &def.plugins {
                    if !self.source.has_plugin(name) {
                        return Err(DotKitError::ProfileReferencesMissingPlugin {
                            profile: profile.clone(),
                            plugin: name.clone(),
                        });
                    }
                }
                def.plugins
            }
            Selection::All => available,
        };

        let mut plugins: Vec<String> = Vec::with_capacity(requested.len());
        for name in requested {
            if !plugins.contains(&name) {
                plugins.push(name);
            }
        }

        Ok(ResolvedTarget { target, plugins })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, SourceTree, HostPaths) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        for name in ["core", "ui", "ops"] {
            fs::create_dir_all(src.join("plugins").join(name)).unwrap();
        }
        fs::write(
            src.join("profiles.toml"),
            "[profiles.web]\nplugins = [\"ui\", \"core\", \"ui\"]\n\n[profiles.bad]\nplugins = [\"ghost\"]\n",
        )
        .unwrap();
        let tree = SourceTree::open(&src).unwrap();
        let host = HostPaths::new(tmp.path().join("host"), tmp.path().join("host.json"), "kit");
        (tmp, tree, host)
    }

    fn request(scope: ScopeRequest, selection: Selection) -> InstallRequest {
        InstallRequest {
            scope,
            selection,
            dry_run: false,
        }
    }

    #[test]
    fn selection_precedence() {
        assert_eq!(
            Selection::from_parts(vec!["a".into()], Some("p".into())),
            Selection::Plugins(vec!["a".into()])
        );
        assert_eq!(
            Selection::from_parts(vec![], Some("p".into())),
            Selection::Profile("p".into())
        );
        assert_eq!(Selection::from_parts(vec![], None), Selection::All);
    }

    #[test]
    fn all_falls_back_to_source_tree() {
        let (_tmp, tree, host) = fixture();
        let resolved = TargetResolver::new(&tree, &host)
            .resolve(&request(ScopeRequest::Global, Selection::All))
            .unwrap();
        assert_eq!(resolved.plugins, vec!["core", "ops", "ui"]);
        assert_eq!(resolved.target.scope(), Scope::Global);
        assert_eq!(resolved.target.reference_root(), host.namespace_dir());
    }

    #[test]
    fn profile_is_ordered_and_deduplicated() {
        let (_tmp, tree, host) = fixture();
        let resolved = TargetResolver::new(&tree, &host)
            .resolve(&request(ScopeRequest::Global, Selection::Profile("web".into())))
            .unwrap();
        assert_eq!(resolved.plugins, vec!["ui", "core"]);
    }

    #[test]
    fn unknown_profile_is_fatal() {
        let (_tmp, tree, host) = fixture();
        let err = TargetResolver::new(&tree, &host)
            .resolve(&request(ScopeRequest::Global, Selection::Profile("nope".into())))
            .unwrap_err();
        assert!(matches!(err, DotKitError::ProfileNotFound { .. }));
    }

    #[test]
    fn profile_with_missing_plugin_is_fatal() {
        let (_tmp, tree, host) = fixture();
        let err = TargetResolver::new(&tree, &host)
            .resolve(&request(ScopeRequest::Global, Selection::Profile("bad".into())))
            .unwrap_err();
        assert!(matches!(
            err,
            DotKitError::ProfileReferencesMissingPlugin { .. }
        ));
    }

    #[test]
    fn missing_project_is_fatal() {
        let (tmp, tree, host) = fixture();
        let err = TargetResolver::new(&tree, &host)
            .resolve(&request(
                ScopeRequest::Project(tmp.path().join("missing")),
                Selection::All,
            ))
            .unwrap_err();
        assert!(matches!(err, DotKitError::TargetNotFound { .. }));
    }

    #[test]
    fn project_target_paths() {
        let tmp = TempDir::new().unwrap();
        let target = InstallTarget::project(tmp.path()).unwrap();
        assert_eq!(target.root(), tmp.path().join(".claude"));
        assert_eq!(target.hook_registry(), tmp.path().join(".claude/settings.json"));
        assert_eq!(target.service_registry(), tmp.path().join(".mcp.json"));
        assert_eq!(target.layout(), Layout::Flat);
        assert_eq!(target.reference_dirs().len(), ComponentKind::ALL.len());
        assert!(!target.reference_dirs().contains(&tmp.path().join(".claude")));
    }

    #[test]
    fn empty_source_tree_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let tree = SourceTree::open(tmp.path()).unwrap();
        let host = HostPaths::new(tmp.path().join("h"), tmp.path().join("h.json"), "kit");
        let err = TargetResolver::new(&tree, &host)
            .resolve(&request(ScopeRequest::Global, Selection::All))
            .unwrap_err();
        assert!(matches!(err, DotKitError::EmptySourceTree { .. }));
    }
}
