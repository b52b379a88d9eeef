//! Read-only index over the plugin source tree.
//!
//! ```text
//! <source root>/
//! ├── profiles.toml
//! └── plugins/
//!     └── <plugin>/
//!         ├── .claude-plugin/plugin.json
//!         ├── agents/  commands/  skills/  hooks/  templates/
//!         ├── hooks/hooks.json      # hook registry fragment
//!         └── .mcp.json             # service registry fragment
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::info;

use crate::error::{DotKitError, Result};
use crate::manifest::{FilterConfig, PluginManifest};
use crate::report::Issue;

const PLUGINS_DIR: &str = "plugins";
const PROFILES_FILE: &str = "profiles.toml";
const HOOKS_FRAGMENT: &str = "hooks.json";
const SERVICES_FRAGMENT: &str = ".mcp.json";
const IGNORED_FILES: &[&str] = &[".DS_Store", ".gitkeep", ".gitignore"];

/// Typed component group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Agent,
    Command,
    Skill,
    HookScript,
    Template,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::Agent,
        ComponentKind::Command,
        ComponentKind::Skill,
        ComponentKind::HookScript,
        ComponentKind::Template,
    ];

    /// Directory name used both in the plugin and in destination trees
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Agent => "agents",
            Self::Command => "commands",
            Self::Skill => "skills",
            Self::HookScript => "hooks",
            Self::Template => "templates",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.dir_name() == name)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// A single materializable unit of a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub kind: ComponentKind,
    pub plugin: String,
    /// Absolute path inside the plugin directory
    pub source: PathBuf,
    /// Base name used in the destination and for deduplication
    pub dest_name: String,
}

impl Component {
    /// Path relative to the plugin root, e.g. `agents/reviewer.md`
    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.kind.dir_name()).join(&self.dest_name)
    }
}

/// A plugin loaded from the source tree
#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    /// Canonical plugin directory
    pub path: PathBuf,
    /// Component groups present in the plugin
    pub groups: Vec<ComponentKind>,
    filter: Option<FilterConfig>,
}

impl Plugin {
    /// Enumerate components, ordered by group then name
    pub fn components(&self) -> Result<Vec<Component>> {
        let mut components = Vec::new();

        for kind in &self.groups {
            let group_dir = self.path.join(kind.dir_name());
            let mut entries = fs::read_dir(&group_dir)?.collect::<std::io::Result<Vec<_>>>()?;
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                let name = entry.file_name().to_string_lossy().to_string();
                if is_ignored(&name) {
                    continue;
                }
                if *kind == ComponentKind::HookScript && name == HOOKS_FRAGMENT {
                    continue;
                }
                let is_dir = entry.file_type()?.is_dir();
                if *kind == ComponentKind::Skill && !is_dir {
                    continue;
                }

                let component = Component {
                    kind: *kind,
                    plugin: self.name.clone(),
                    source: entry.path(),
                    dest_name: name,
                };
                if let Some(filter) = &self.filter {
                    if !filter.admits(&component.relative_path()) {
                        continue;
                    }
                }
                components.push(component);
            }
        }

        Ok(components)
    }

    /// `hooks/hooks.json`, when the plugin ships one
    pub fn hook_fragment(&self) -> Option<PathBuf> {
        let path = self
            .path
            .join(ComponentKind::HookScript.dir_name())
            .join(HOOKS_FRAGMENT);
        path.is_file().then_some(path)
    }

    /// `.mcp.json`, when the plugin ships one
    pub fn service_fragment(&self) -> Option<PathBuf> {
        let path = self.path.join(SERVICES_FRAGMENT);
        path.is_file().then_some(path)
    }
}

/// Named plugin selection from profiles.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileDef {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileDef>,
}

/// Result of loading every plugin in the tree
#[derive(Debug, Default)]
pub struct PluginScan {
    pub plugins: Vec<Plugin>,
    pub issues: Vec<Issue>,
}

/// Read-only view over the source tree
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
}

impl SourceTree {
    /// Open a source tree; the root is canonicalized so ownership checks compare real paths
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(DotKitError::SourceNotFound {
                path: root.to_path_buf(),
            });
        }
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join(PLUGINS_DIR)
    }

    /// Check whether a resolved path lies inside the source tree
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Name of the plugin directory a resolved path lies in
    pub fn plugin_of(&self, path: &Path) -> Option<String> {
        path.strip_prefix(self.plugins_dir())
            .ok()?
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
    }

    /// Plugin directory names, sorted; manifests are not read
    pub fn plugin_names(&self) -> Result<Vec<String>> {
        let dir = self.plugins_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if is_ignored(&name) || !entry.path().is_dir() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        !name.is_empty() && !name.contains(['/', '\\']) && self.plugins_dir().join(name).is_dir()
    }

    /// Load a single plugin by directory name
    pub fn load_plugin(&self, name: &str) -> Result<Plugin> {
        if !self.has_plugin(name) {
            return Err(DotKitError::PluginNotFound {
                name: name.to_string(),
            });
        }

        let path = self.plugins_dir().join(name).canonicalize()?;
        let manifest = PluginManifest::load(&path)?;
        if manifest.name != name {
            return Err(DotKitError::ManifestInvalid {
                path: PluginManifest::path(&path),
                message: format!(
                    "manifest name '{}' does not match directory '{}'",
                    manifest.name, name
                ),
            });
        }

        let groups = ComponentKind::ALL
            .into_iter()
            .filter(|kind| path.join(kind.dir_name()).is_dir())
            .collect();

        Ok(Plugin {
            name: manifest.name.clone(),
            version: manifest.version_or_default().to_string(),
            description: manifest.description.clone(),
            groups,
            filter: FilterConfig::load(&path)?,
            path,
        })
    }

    /// Load every plugin; unloadable ones become issues
    pub fn scan(&self) -> Result<PluginScan> {
        let mut scan = PluginScan::default();
        for name in self.plugin_names()? {
            match self.load_plugin(&name) {
                Ok(plugin) => scan.plugins.push(plugin),
                Err(e) => scan.issues.push(Issue::plugin(&name, e.to_string())),
            }
        }
        Ok(scan)
    }

    /// Fast-forward the source tree from its upstream
    pub fn pull(&self) -> Result<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["pull", "--ff-only"])
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DotKitError::Git(format!("git pull failed: {}", stderr.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(root = %self.root.display(), "source tree pulled");
        Ok(stdout)
    }

    /// Named profiles; a missing profiles.toml means no profiles
    pub fn profiles(&self) -> Result<ProfilesFile> {
        let path = self.root.join(PROFILES_FILE);
        if !path.exists() {
            return Ok(ProfilesFile::default());
        }
        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| DotKitError::ConfigParse {
            path,
            message: e.to_string(),
        })
    }
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || IGNORED_FILES.contains(&name)
}
