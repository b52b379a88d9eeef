pub mod config;
pub mod document;
pub mod enabled;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod integrity;
pub mod lock;
pub mod manifest;
pub mod materializer;
pub mod merger;
pub mod reference;
pub mod report;
pub mod services;
pub mod source;
pub mod tagged;
pub mod target;
pub mod uninstall;

pub use config::{Config, HostPaths, DEFAULT_NAMESPACE};
pub use document::SharedDocument;
pub use engine::Engine;
pub use error::{DotKitError, Result};
pub use integrity::{BrokenReference, IntegrityReport, UpdateRequest};
pub use manifest::{FilterConfig, PluginManifest};
pub use reference::{Layout, Reference};
pub use report::{InstallReport, Issue};
pub use services::ServiceDescriptor;
pub use source::{Component, ComponentKind, Plugin, ProfileDef, SourceTree};
pub use tagged::{TaggedEntry, PROVENANCE_FIELD};
pub use target::{InstallRequest, InstallTarget, Scope, ScopeRequest, Selection, TargetResolver};
pub use uninstall::{
    AssumeNo, AssumeYes, Confirm, RemovalPlan, UninstallOutcome, UninstallReport, UninstallRequest,
};
