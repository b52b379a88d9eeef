//! Reference materialization for one plugin at a time.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::config::HostPaths;
use crate::document::SharedDocument;
use crate::enabled::enabled_plugins;
use crate::error::Result;
use crate::reference::{
    collect_references, inspect_slot, prune_empty_dirs, sweep_owned, Layout, Reference, SlotState,
    Sweep,
};
use crate::source::{ComponentKind, Plugin, SourceTree};
use crate::target::{InstallTarget, Scope};

/// `(group, name)` pairs provided by globally enabled plugins
#[derive(Debug, Default, Clone)]
pub struct GlobalComponentIndex {
    entries: HashSet<(ComponentKind, String)>,
}

impl GlobalComponentIndex {
    /// Index every `<cache>/<ns>/<plugin>/<version>/<group>/<name>` of an enabled plugin
    pub fn build(host: &HostPaths) -> Result<Self> {
        let settings = SharedDocument::new(host.settings()).read()?;
        let mut index = Self::default();

        for enabled in enabled_plugins(&settings) {
            let plugin_dir = host.cache_root().join(&enabled.namespace).join(&enabled.name);
            let Ok(versions) = fs::read_dir(&plugin_dir) else {
                continue;
            };
            for version in versions.flatten() {
                if !version.path().is_dir() {
                    continue;
                }
                for kind in ComponentKind::ALL {
                    let Ok(entries) = fs::read_dir(version.path().join(kind.dir_name())) else {
                        continue;
                    };
                    for entry in entries.flatten() {
                        let name = entry.file_name().to_string_lossy().to_string();
                        if !name.starts_with('.') {
                            index.entries.insert((kind, name));
                        }
                    }
                }
            }
        }

        debug!(entries = index.entries.len(), "global component index built");
        Ok(index)
    }

    pub fn contains(&self, kind: ComponentKind, name: &str) -> bool {
        self.entries.contains(&(kind, name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What materializing one plugin did (or would do in a dry run)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PluginMaterialization {
    pub materialized: usize,
    pub unchanged: usize,
    /// Components skipped because the global scope provides them
    pub skipped: usize,
    pub pruned: usize,
    /// Slots occupied by something dot-kit does not own
    pub conflicts: Vec<PathBuf>,
    /// Slots already linked to the same-named component of another plugin
    pub claimed: Vec<(PathBuf, String)>,
    /// Foreign entries left behind in retired version directories
    pub kept: Vec<PathBuf>,
}

pub struct Materializer<'a> {
    source: &'a SourceTree,
    target: &'a InstallTarget,
    index: &'a GlobalComponentIndex,
    dry_run: bool,
}

impl<'a> Materializer<'a> {
    pub fn new(
        source: &'a SourceTree,
        target: &'a InstallTarget,
        index: &'a GlobalComponentIndex,
        dry_run: bool,
    ) -> Self {
        Self {
            source,
            target,
            index,
            dry_run,
        }
    }

    pub fn materialize(&self, plugin: &Plugin) -> Result<PluginMaterialization> {
        let layout = self.target.layout();
        let root = self.target.reference_root();
        let mut out = PluginMaterialization::default();

        let retired = self.retire_other_versions(layout, plugin)?;
        out.pruned += retired.removed.len();
        out.kept = retired.kept;

        let mut wanted: HashSet<PathBuf> = HashSet::new();
        for component in plugin.components()? {
            let slot = layout.slot(root, plugin, &component);

            if self.target.scope() == Scope::Project
                && self.index.contains(component.kind, &component.dest_name)
            {
                out.skipped += 1;
                if let Some(reference) = Reference::read(&slot)? {
                    if reference.is_owned_by(self.source) {
                        self.remove(&reference)?;
                        out.pruned += 1;
                    }
                }
                continue;
            }

            match inspect_slot(&slot, &component.source, &plugin.path, self.source)? {
                SlotState::Vacant => {
                    if !self.dry_run {
                        Reference::new(slot.clone(), component.source.clone()).create()?;
                    }
                    debug!(path = %slot.display(), "reference created");
                    out.materialized += 1;
                }
                SlotState::Current => out.unchanged += 1,
                SlotState::Stale(reference) => {
                    if !self.dry_run {
                        reference.remove()?;
                        Reference::new(slot.clone(), component.source.clone()).create()?;
                    }
                    debug!(path = %slot.display(), "reference re-pointed");
                    out.materialized += 1;
                }
                SlotState::Claimed { plugin: owner } => {
                    debug!(path = %slot.display(), owner = %owner, "slot held by another plugin");
                    out.claimed.push((slot, owner));
                    continue;
                }
                SlotState::Foreign => out.conflicts.push(slot.clone()),
            }
            wanted.insert(slot);
        }

        out.pruned += self.prune_dropped(layout, plugin, &wanted)?;
        Ok(out)
    }

    /// Reverse every version directory of `plugin` other than the current one
    fn retire_other_versions(&self, layout: Layout, plugin: &Plugin) -> Result<Sweep> {
        let mut sweep = Sweep::default();
        let Some(plugin_dir) = layout.plugin_dir(self.target.reference_root(), &plugin.name)
        else {
            return Ok(sweep);
        };
        if !plugin_dir.is_dir() {
            return Ok(sweep);
        }

        for entry in fs::read_dir(&plugin_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy() == plugin.version.as_str() {
                continue;
            }
            if entry.file_type()?.is_dir() {
                debug!(plugin = %plugin.name, version = %entry.file_name().to_string_lossy(), "retiring version");
                sweep.extend(sweep_owned(&entry.path(), self.source, self.dry_run)?);
            }
        }
        Ok(sweep)
    }

    /// Remove owned references into `plugin` whose component no longer exists or is skipped
    fn prune_dropped(&self, layout: Layout, plugin: &Plugin, wanted: &HashSet<PathBuf>) -> Result<usize> {
        let dirs = match layout {
            Layout::Versioned => vec![self
                .target
                .reference_root()
                .join(&plugin.name)
                .join(&plugin.version)],
            Layout::Flat => self.target.reference_dirs(),
        };

        let mut pruned = 0;
        for dir in dirs {
            for reference in collect_references(&dir)? {
                if wanted.contains(&reference.path) || !reference.resolved().starts_with(&plugin.path) {
                    continue;
                }
                self.remove(&reference)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn remove(&self, reference: &Reference) -> Result<()> {
        debug!(path = %reference.path.display(), "removing reference");
        if self.dry_run {
            return Ok(());
        }
        reference.remove()?;
        if let Some(parent) = reference.path.parent() {
            if parent != self.target.reference_root() {
                prune_empty_dirs(parent)?;
            }
        }
        Ok(())
    }
}
