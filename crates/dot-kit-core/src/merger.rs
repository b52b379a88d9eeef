//! Per-plugin merging into the hook, service and enabled-plugin registries.

use tracing::{debug, warn};

use crate::config::HostPaths;
use crate::document::SharedDocument;
use crate::enabled::enable_plugin;
use crate::error::Result;
use crate::hooks::{merge_hooks, HookFragment};
use crate::services::{
    merge_services, service_keys, ServiceFragment, ServiceManifest, ServiceMerge, ServicePolicy,
};
use crate::source::Plugin;
use crate::target::{InstallTarget, Scope};

pub struct Merger<'a> {
    target: &'a InstallTarget,
    host: &'a HostPaths,
    dry_run: bool,
}

impl<'a> Merger<'a> {
    pub fn new(target: &'a InstallTarget, host: &'a HostPaths, dry_run: bool) -> Self {
        Self {
            target,
            host,
            dry_run,
        }
    }

    /// Replace the plugin's hook entries, returning how many were written.
    ///
    /// A plugin without a fragment still has its old entries removed.
    pub fn merge_hooks(&self, plugin: &Plugin) -> Result<usize> {
        let fragment = match plugin.hook_fragment() {
            Some(path) => HookFragment::load(&path, &plugin.path)?,
            None => HookFragment::default(),
        };

        let doc = SharedDocument::new(self.target.hook_registry());
        let added = doc.update(self.dry_run, |value| {
            merge_hooks(value, &plugin.name, &fragment, doc.path())
        })?;
        debug!(plugin = %plugin.name, entries = added, "hooks merged");
        Ok(added)
    }

    /// Merge the plugin's services; keys it no longer ships are removed
    pub fn merge_services(&self, plugin: &Plugin) -> Result<ServiceMerge> {
        let fragment = match plugin.service_fragment() {
            Some(path) => ServiceFragment::load(&path, &plugin.path)?,
            None => ServiceFragment::default(),
        };
        let doc = SharedDocument::new(self.target.service_registry());

        let merge = match self.target.scope() {
            Scope::Project => {
                let global = SharedDocument::new(&self.host.service_registry).read()?;
                let global_keys = service_keys(&global);
                doc.update(self.dry_run, |value| {
                    merge_services(
                        value,
                        &plugin.name,
                        &fragment,
                        ServicePolicy::Project {
                            global_keys: &global_keys,
                        },
                        doc.path(),
                    )
                })?
            }
            Scope::Global => {
                let merge = doc.update(self.dry_run, |value| {
                    merge_services(value, &plugin.name, &fragment, ServicePolicy::Global, doc.path())
                })?;
                if !self.dry_run && !merge.added.is_empty() {
                    ServiceManifest::new(self.host.service_manifest()).record(merge.added.clone())?;
                }
                merge
            }
        };

        for key in &merge.removed {
            debug!(plugin = %plugin.name, service = %key, "service no longer shipped, removed");
        }
        for key in &merge.kept {
            warn!(plugin = %plugin.name, service = %key, path = %doc.path().display(), "service already defined, keeping existing entry");
        }
        Ok(merge)
    }

    /// Mark the plugin enabled in the global settings; no-op at project scope
    pub fn enable(&self, plugin: &Plugin) -> Result<bool> {
        if self.target.scope() != Scope::Global {
            return Ok(false);
        }
        let key = self.host.enabled_key(&plugin.name);
        let doc = SharedDocument::new(self.host.settings());
        doc.update(self.dry_run, |value| enable_plugin(value, &key, doc.path()))
    }
}
