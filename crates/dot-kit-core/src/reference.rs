//! Live references (symlinks) from destination slots to source components.
//!
//! A reference is owned by dot-kit only if it resolves inside the source tree.
//! Anything else found in a destination tree is left alone.

use std::fs;
use std::io;
use std::path::{Component as PathComponent, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::source::{Component, Plugin, SourceTree};

/// Destination layout strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `<root>/<plugin>/<version>/<group>/<name>`
    Versioned,
    /// `<root>/<group>/<name>`
    Flat,
}

impl Layout {
    /// Destination slot for a component
    pub fn slot(self, reference_root: &Path, plugin: &Plugin, component: &Component) -> PathBuf {
        match self {
            Self::Versioned => reference_root
                .join(&plugin.name)
                .join(&plugin.version)
                .join(component.kind.dir_name())
                .join(&component.dest_name),
            Self::Flat => reference_root
                .join(component.kind.dir_name())
                .join(&component.dest_name),
        }
    }

    /// Directory holding every version of a plugin; flat layouts have none
    pub fn plugin_dir(self, reference_root: &Path, plugin_name: &str) -> Option<PathBuf> {
        match self {
            Self::Versioned => Some(reference_root.join(plugin_name)),
            Self::Flat => None,
        }
    }
}

/// A symlink at `path` pointing to `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub path: PathBuf,
    pub target: PathBuf,
}

impl Reference {
    pub fn new(path: PathBuf, target: PathBuf) -> Self {
        Self { path, target }
    }

    /// Read the symlink at `path`; `None` when nothing or a non-link is there
    pub fn read(path: &Path) -> Result<Option<Self>> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = fs::read_link(path)?;
                Ok(Some(Self::new(path.to_path_buf(), target)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolved target; broken links resolve through their deepest existing ancestor
    pub fn resolved(&self) -> PathBuf {
        let absolute = if self.target.is_absolute() {
            self.target.clone()
        } else {
            self.path
                .parent()
                .map(|parent| parent.join(&self.target))
                .unwrap_or_else(|| self.target.clone())
        };
        resolve_path(&absolute)
    }

    pub fn is_owned_by(&self, source: &SourceTree) -> bool {
        source.contains(&self.resolved())
    }

    pub fn is_broken(&self) -> bool {
        !self.path.exists()
    }

    pub fn points_to(&self, source: &Path) -> bool {
        self.target == source || self.resolved() == resolve_path(source)
    }

    /// Create the link, including parent directories
    pub fn create(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        std::os::unix::fs::symlink(&self.target, &self.path)?;

        #[cfg(windows)]
        if self.target.is_dir() {
            std::os::windows::fs::symlink_dir(&self.target, &self.path)?;
        } else {
            std::os::windows::fs::symlink_file(&self.target, &self.path)?;
        }

        Ok(())
    }

    /// Remove the link itself, never what it points to
    pub fn remove(&self) -> Result<()> {
        #[cfg(windows)]
        if fs::metadata(&self.path).map(|m| m.is_dir()).unwrap_or(false) {
            fs::remove_dir(&self.path)?;
            return Ok(());
        }

        fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// What currently occupies a destination slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Vacant,
    /// Owned reference already pointing at the wanted source
    Current,
    /// Owned reference into the same plugin, or a dangling one, pointing elsewhere
    Stale(Reference),
    /// Live owned reference into another plugin's directory
    Claimed { plugin: String },
    /// A user file or a link dot-kit does not own
    Foreign,
}

/// Classify `slot` for a component of the plugin living in `plugin_dir`
pub fn inspect_slot(
    slot: &Path,
    wanted: &Path,
    plugin_dir: &Path,
    source: &SourceTree,
) -> Result<SlotState> {
    match Reference::read(slot)? {
        Some(reference) if reference.points_to(wanted) => Ok(SlotState::Current),
        Some(reference) if reference.is_owned_by(source) => {
            let resolved = reference.resolved();
            if resolved.starts_with(plugin_dir) || reference.is_broken() {
                return Ok(SlotState::Stale(reference));
            }
            match source.plugin_of(&resolved) {
                Some(plugin) => Ok(SlotState::Claimed { plugin }),
                None => Ok(SlotState::Stale(reference)),
            }
        }
        Some(_) => Ok(SlotState::Foreign),
        None if fs::symlink_metadata(slot).is_ok() => Ok(SlotState::Foreign),
        None => Ok(SlotState::Vacant),
    }
}

/// All symlinks below `dir`, without following them
pub fn collect_references(dir: &Path) -> Result<Vec<Reference>> {
    let mut references = Vec::new();
    if !dir.exists() {
        return Ok(references);
    }

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.path_is_symlink() {
            if let Some(reference) = Reference::read(entry.path())? {
                references.push(reference);
            }
        }
    }
    Ok(references)
}

/// Outcome of removing owned references from a tree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sweep {
    /// Owned references removed (or that would be removed in a dry run)
    pub removed: Vec<PathBuf>,
    /// Links resolving outside the source tree, left in place
    pub kept: Vec<PathBuf>,
}

impl Sweep {
    pub fn extend(&mut self, other: Sweep) {
        self.removed.extend(other.removed);
        self.kept.extend(other.kept);
    }
}

/// Remove every owned reference below `dir`, then prune directories left empty
pub fn sweep_owned(dir: &Path, source: &SourceTree, dry_run: bool) -> Result<Sweep> {
    let mut sweep = Sweep::default();

    for reference in collect_references(dir)? {
        if reference.is_owned_by(source) {
            if !dry_run {
                reference.remove()?;
            }
            sweep.removed.push(reference.path);
        } else {
            sweep.kept.push(reference.path);
        }
    }

    if !dry_run {
        prune_empty_dirs(dir)?;
    }
    Ok(sweep)
}

/// Remove empty directories bottom-up, including `dir` itself
pub fn prune_empty_dirs(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    let dirs: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();

    for path in dirs {
        if fs::read_dir(&path)?.next().is_none() {
            fs::remove_dir(&path)?;
        }
    }
    Ok(())
}

/// Canonicalize as much of `path` as exists, then append the rest lexically
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let normalized = normalize_lexically(path);
    let mut existing = normalized.as_path();
    let mut rest = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(name) = existing.file_name() {
            rest.push(name.to_os_string());
        }
        existing = parent;
        if let Ok(mut canonical) = existing.canonicalize() {
            for name in rest.iter().rev() {
                canonical.push(name);
            }
            return canonical;
        }
    }
    normalized
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            PathComponent::ParentDir => {
                out.pop();
            }
            PathComponent::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> (TempDir, SourceTree, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("plugins/core/agents")).unwrap();
        fs::write(src.join("plugins/core/agents/a.md"), "a").unwrap();
        let tree = SourceTree::open(&src).unwrap();
        let dest = tmp.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        (tmp, tree, dest)
    }

    #[test]
    fn owned_reference_is_detected() {
        let (_tmp, tree, dest) = tree();
        let source = tree.root().join("plugins/core/agents/a.md");
        let reference = Reference::new(dest.join("agents/a.md"), source.clone());
        reference.create().unwrap();

        let read = Reference::read(&dest.join("agents/a.md")).unwrap().unwrap();
        assert!(read.is_owned_by(&tree));
        assert!(read.points_to(&source));
        assert!(!read.is_broken());
    }

    #[test]
    fn broken_reference_inside_source_is_still_owned() {
        let (_tmp, tree, dest) = tree();
        let source = tree.root().join("plugins/core/agents/gone.md");
        let reference = Reference::new(dest.join("gone.md"), source);
        reference.create().unwrap();

        assert!(reference.is_broken());
        assert!(reference.is_owned_by(&tree));
    }

    #[test]
    fn relative_escape_is_not_owned() {
        let (tmp, tree, dest) = tree();
        fs::write(tmp.path().join("outside.md"), "x").unwrap();
        let reference = Reference::new(dest.join("x.md"), PathBuf::from("../outside.md"));
        reference.create().unwrap();

        assert!(!reference.is_owned_by(&tree));
    }

    #[test]
    fn sweep_keeps_foreign_links_and_files() {
        let (tmp, tree, dest) = tree();
        let source = tree.root().join("plugins/core/agents/a.md");
        Reference::new(dest.join("agents/a.md"), source).create().unwrap();
        fs::write(tmp.path().join("mine.md"), "user").unwrap();
        Reference::new(dest.join("agents/mine.md"), tmp.path().join("mine.md"))
            .create()
            .unwrap();
        fs::create_dir_all(dest.join("commands")).unwrap();
        Reference::new(
            dest.join("commands/a.md"),
            tree.root().join("plugins/core/agents/a.md"),
        )
        .create()
        .unwrap();

        let sweep = sweep_owned(&dest, &tree, false).unwrap();
        assert_eq!(sweep.removed.len(), 2);
        assert_eq!(sweep.kept, vec![dest.join("agents/mine.md")]);
        assert!(dest.join("agents/mine.md").exists());
        assert!(!dest.join("commands").exists());
        assert!(tmp.path().join("mine.md").exists());
    }

    #[test]
    fn dry_run_sweep_changes_nothing() {
        let (_tmp, tree, dest) = tree();
        let source = tree.root().join("plugins/core/agents/a.md");
        Reference::new(dest.join("agents/a.md"), source).create().unwrap();

        let sweep = sweep_owned(&dest, &tree, true).unwrap();
        assert_eq!(sweep.removed.len(), 1);
        assert!(Reference::read(&dest.join("agents/a.md")).unwrap().is_some());
    }

    #[test]
    fn slot_states() {
        let (_tmp, tree, dest) = tree();
        let core = tree.root().join("plugins/core");
        let wanted = core.join("agents/a.md");
        let slot = dest.join("a.md");
        assert_eq!(
            inspect_slot(&slot, &wanted, &core, &tree).unwrap(),
            SlotState::Vacant
        );

        Reference::new(slot.clone(), wanted.clone()).create().unwrap();
        assert_eq!(
            inspect_slot(&slot, &wanted, &core, &tree).unwrap(),
            SlotState::Current
        );

        let other = core.join("agents");
        assert!(matches!(
            inspect_slot(&slot, &other, &core, &tree).unwrap(),
            SlotState::Stale(_)
        ));

        let user_file = dest.join("user.md");
        fs::write(&user_file, "mine").unwrap();
        assert_eq!(
            inspect_slot(&user_file, &wanted, &core, &tree).unwrap(),
            SlotState::Foreign
        );
    }

    #[test]
    fn slot_held_by_another_plugin_is_claimed() {
        let (_tmp, tree, dest) = tree();
        let web = tree.root().join("plugins/web");
        fs::create_dir_all(web.join("agents")).unwrap();
        fs::write(web.join("agents/a.md"), "web").unwrap();

        let slot = dest.join("a.md");
        Reference::new(slot.clone(), tree.root().join("plugins/core/agents/a.md"))
            .create()
            .unwrap();

        match inspect_slot(&slot, &web.join("agents/a.md"), &web, &tree).unwrap() {
            SlotState::Claimed { plugin, .. } => assert_eq!(plugin, "core"),
            other => panic!("unexpected {:?}", other),
        }

        fs::remove_file(tree.root().join("plugins/core/agents/a.md")).unwrap();
        assert!(matches!(
            inspect_slot(&slot, &web.join("agents/a.md"), &web, &tree).unwrap(),
            SlotState::Stale(_)
        ));
    }
}
