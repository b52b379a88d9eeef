#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use dot_kit_core::{
    AssumeNo, AssumeYes, Engine, HostPaths, InstallRequest, Reference, ScopeRequest, Selection,
    SourceTree, UninstallOutcome, UninstallRequest, UpdateRequest,
};
use serde_json::{json, Value};
use tempfile::TempDir;

struct Fixture {
    tmp: TempDir,
    src: PathBuf,
    project: PathBuf,
    host: HostPaths,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("kit");
        let project = tmp.path().join("project");
        fs::create_dir_all(src.join("plugins")).unwrap();
        fs::create_dir_all(&project).unwrap();
        let host = HostPaths::new(
            tmp.path().join("home/.claude"),
            tmp.path().join("home/.claude.json"),
            "kit",
        );
        fs::create_dir_all(&host.host_dir).unwrap();
        Self {
            tmp,
            src,
            project,
            host,
        }
    }

    fn plugin(&self, name: &str, version: &str) -> PathBuf {
        let dir = self.src.join("plugins").join(name);
        fs::create_dir_all(dir.join(".claude-plugin")).unwrap();
        fs::write(
            dir.join(".claude-plugin/plugin.json"),
            json!({"name": name, "version": version}).to_string(),
        )
        .unwrap();
        dir
    }

    fn file(&self, path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn stop_hook(&self, plugin: &str, script: &str) {
        let dir = self.src.join("plugins").join(plugin);
        self.file(
            &dir.join("hooks/hooks.json"),
            &json!({"hooks": {"Stop": [{
                "matcher": "",
                "hooks": [{"type": "command", "command": format!("${{CLAUDE_PLUGIN_ROOT}}/hooks/{}", script)}]
            }]}})
            .to_string(),
        );
        self.file(&dir.join("hooks").join(script), "#!/bin/sh\n");
    }

    fn engine(&self) -> Engine {
        Engine::new(SourceTree::open(&self.src).unwrap(), self.host.clone())
    }

    fn install(&self, scope: ScopeRequest, selection: Selection) -> dot_kit_core::InstallReport {
        self.engine()
            .install(&InstallRequest {
                scope,
                selection,
                dry_run: false,
            })
            .unwrap()
    }

    fn project_scope(&self) -> ScopeRequest {
        ScopeRequest::Project(self.project.clone())
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn standard_fixture() -> Fixture {
    let fx = Fixture::new();
    let core = fx.plugin("core", "1.0.0");
    fx.file(&core.join("agents/reviewer.md"), "reviewer");
    fx.file(&core.join("commands/commit.md"), "commit");
    fx.file(&core.join("skills/tdd/SKILL.md"), "tdd");
    fx.stop_hook("core", "stop.sh");
    fx.file(
        &core.join(".mcp.json"),
        &json!({"mcpServers": {"docs": {"command": "docs-mcp"}}}).to_string(),
    );
    let ui = fx.plugin("ui", "0.2.0");
    fx.file(&ui.join("agents/designer.md"), "designer");
    fx.file(
        &fx.src.join("profiles.toml"),
        "[profiles.web]\nplugins = [\"core\", \"ui\"]\n",
    );
    fx
}

#[test]
fn install_is_idempotent() {
    let fx = standard_fixture();
    let first = fx.install(ScopeRequest::Global, Selection::All);
    assert!(!first.has_issues(), "{:?}", first.issues);
    assert_eq!(first.plugins, vec!["core", "ui"]);
    assert_eq!(first.materialized, 5);
    assert_eq!(first.hooks_merged, 1);
    assert_eq!(first.services_merged, 1);

    let settings = fs::read_to_string(fx.host.settings()).unwrap();
    let services = fs::read_to_string(&fx.host.service_registry).unwrap();

    let second = fx.install(ScopeRequest::Global, Selection::All);
    assert_eq!(second.materialized, 0);
    assert_eq!(second.unchanged, 5);
    assert_eq!(fs::read_to_string(fx.host.settings()).unwrap(), settings);
    assert_eq!(fs::read_to_string(&fx.host.service_registry).unwrap(), services);

    let link = fx
        .host
        .namespace_dir()
        .join("core/1.0.0/skills/tdd");
    let reference = Reference::read(&link).unwrap().unwrap();
    assert_eq!(
        reference.target,
        fx.src.canonicalize().unwrap().join("plugins/core/skills/tdd")
    );
    let enabled = read_json(&fx.host.settings());
    assert_eq!(enabled["enabledPlugins"], json!({"core@kit": true, "ui@kit": true}));
}

#[test]
fn user_entries_survive_install_and_uninstall() {
    let fx = standard_fixture();
    let user_settings = json!({
        "model": "opus",
        "hooks": {"Stop": [{"matcher": "", "hooks": [{"type": "command", "command": "say done"}]}]},
        "enabledPlugins": {"lint@market": true}
    });
    let user_services = json!({"numStartups": 3, "mcpServers": {"mine": {"url": "https://mine"}}});
    fx.file(&fx.host.settings(), &user_settings.to_string());
    fx.file(&fx.host.service_registry, &user_services.to_string());

    fx.install(ScopeRequest::Global, Selection::All);
    let installed = read_json(&fx.host.settings());
    assert_eq!(installed["hooks"]["Stop"].as_array().unwrap().len(), 2);
    assert_eq!(installed["hooks"]["Stop"][0], user_settings["hooks"]["Stop"][0]);
    assert_eq!(installed["model"], "opus");

    let outcome = fx
        .engine()
        .uninstall(
            &UninstallRequest {
                scope: ScopeRequest::Global,
            },
            &mut AssumeYes,
        )
        .unwrap();
    let UninstallOutcome::Removed(report) = outcome else {
        panic!("expected removal");
    };
    assert!(!report.has_issues(), "{:?}", report.issues);
    assert_eq!(report.references_removed, 5);
    assert_eq!(report.services_removed, vec!["docs"]);

    assert_eq!(read_json(&fx.host.settings()), user_settings);
    assert_eq!(read_json(&fx.host.service_registry), user_services);
    assert!(!fx.host.namespace_dir().exists());
    assert!(fx.src.join("plugins/core/agents/reviewer.md").exists());
}

#[test]
fn second_uninstall_is_a_no_op() {
    let fx = standard_fixture();
    fx.install(fx.project_scope(), Selection::All);
    let request = UninstallRequest {
        scope: fx.project_scope(),
    };

    let first = fx.engine().uninstall(&request, &mut AssumeYes).unwrap();
    assert!(matches!(first, UninstallOutcome::Removed(_)));
    let second = fx.engine().uninstall(&request, &mut AssumeYes).unwrap();
    assert!(matches!(second, UninstallOutcome::NothingToDo));
}

#[test]
fn declined_uninstall_changes_nothing() {
    let fx = standard_fixture();
    fx.install(ScopeRequest::Global, Selection::All);
    let settings = fs::read_to_string(fx.host.settings()).unwrap();

    let outcome = fx
        .engine()
        .uninstall(
            &UninstallRequest {
                scope: ScopeRequest::Global,
            },
            &mut AssumeNo,
        )
        .unwrap();

    assert!(matches!(outcome, UninstallOutcome::Declined));
    assert_eq!(fs::read_to_string(fx.host.settings()).unwrap(), settings);
    assert!(fx
        .host
        .namespace_dir()
        .join("core/1.0.0/agents/reviewer.md")
        .exists());
}

#[test]
fn project_skips_components_provided_globally() {
    let fx = standard_fixture();
    fx.install(ScopeRequest::Global, Selection::Plugins(vec!["core".into()]));

    let report = fx.install(fx.project_scope(), Selection::Profile("web".into()));
    assert!(!report.has_issues(), "{:?}", report.issues);
    assert_eq!(report.skipped_components, 4);
    assert_eq!(report.materialized, 1);
    assert!(!fx.project.join(".claude/agents/reviewer.md").exists());
    assert!(fx.project.join(".claude/agents/designer.md").exists());
}

#[test]
fn project_converges_when_component_becomes_global() {
    let fx = standard_fixture();
    fx.install(fx.project_scope(), Selection::Plugins(vec!["core".into()]));
    assert!(fx.project.join(".claude/agents/reviewer.md").exists());

    fx.install(ScopeRequest::Global, Selection::Plugins(vec!["core".into()]));
    let report = fx.install(fx.project_scope(), Selection::Plugins(vec!["core".into()]));

    assert_eq!(report.skipped_components, 4);
    assert!(Reference::read(&fx.project.join(".claude/agents/reviewer.md"))
        .unwrap()
        .is_none());
}

#[test]
fn user_files_and_foreign_links_are_never_touched() {
    let fx = standard_fixture();
    let claude = fx.project.join(".claude");
    fx.file(&claude.join("agents/reviewer.md"), "my own reviewer");
    let outside = fx.tmp.path().join("notes.md");
    fx.file(&outside, "notes");
    fs::create_dir_all(claude.join("commands")).unwrap();
    Reference::new(claude.join("commands/notes.md"), outside.clone())
        .create()
        .unwrap();

    let report = fx.install(fx.project_scope(), Selection::Plugins(vec!["core".into()]));
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].subject, "core");
    assert_eq!(
        fs::read_to_string(claude.join("agents/reviewer.md")).unwrap(),
        "my own reviewer"
    );

    fx.engine()
        .uninstall(
            &UninstallRequest {
                scope: fx.project_scope(),
            },
            &mut AssumeYes,
        )
        .unwrap();

    assert!(claude.join("agents/reviewer.md").exists());
    assert_eq!(
        Reference::read(&claude.join("commands/notes.md"))
            .unwrap()
            .unwrap()
            .target,
        outside
    );
    assert!(!claude.join("skills").exists());
}

#[test]
fn version_bump_replaces_stop_hook() {
    let fx = standard_fixture();
    let user_stop = json!({"matcher": "", "hooks": [{"type": "command", "command": "say done"}]});
    fx.file(
        &fx.host.settings(),
        &json!({"hooks": {"Stop": [user_stop.clone()]}}).to_string(),
    );
    fx.install(ScopeRequest::Global, Selection::Plugins(vec!["core".into()]));

    fx.plugin("core", "2.0.0");
    fs::remove_file(fx.src.join("plugins/core/hooks/stop.sh")).unwrap();
    fx.stop_hook("core", "stop-v2.sh");
    let report = fx.install(ScopeRequest::Global, Selection::Plugins(vec!["core".into()]));
    assert!(!report.has_issues(), "{:?}", report.issues);

    let settings = read_json(&fx.host.settings());
    let stop = settings["hooks"]["Stop"].as_array().unwrap();
    assert_eq!(stop.len(), 2);
    assert_eq!(stop[0], user_stop);
    let tagged: Vec<&Value> = stop.iter().filter(|g| g.get("_dot_kit").is_some()).collect();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0]["_dot_kit"], "core");
    let command = tagged[0]["hooks"][0]["command"].as_str().unwrap();
    assert!(command.ends_with("plugins/core/hooks/stop-v2.sh"), "{}", command);
    assert!(!command.contains("${CLAUDE_PLUGIN_ROOT}"));

    let ns = fx.host.namespace_dir();
    assert!(!ns.join("core/1.0.0").exists());
    assert!(ns.join("core/2.0.0/hooks/stop-v2.sh").exists());

    let health = fx.engine().update(&UpdateRequest { project: None }).unwrap();
    assert!(health.is_healthy());
}

#[test]
fn same_component_name_in_two_plugins_is_reported_not_flipped() {
    let fx = standard_fixture();
    let lint = fx.plugin("lint", "1.0.0");
    fx.file(&lint.join("agents/reviewer.md"), "lint reviewer");
    let selection = || Selection::Plugins(vec!["core".into(), "lint".into()]);
    let slot = fx.project.join(".claude/agents/reviewer.md");

    let first = fx.install(fx.project_scope(), selection());
    assert_eq!(first.issues.len(), 1);
    assert_eq!(first.issues[0].subject, "lint");
    assert!(first.issues[0].message.contains("'core'"), "{}", first.issues[0].message);
    assert_eq!(first.conflicts, 1);

    let second = fx.install(fx.project_scope(), selection());
    assert_eq!(second.materialized, 0);
    assert_eq!(second.unchanged, 4);
    assert_eq!(second.issues.len(), 1);

    let link = Reference::read(&slot).unwrap().unwrap();
    assert!(link.resolved().ends_with("plugins/core/agents/reviewer.md"));
}

#[test]
fn version_outside_the_cache_is_rejected() {
    let fx = standard_fixture();
    let evil = fx.plugin("evil", "../../escape");
    fx.file(&evil.join("agents/x.md"), "x");

    let report = fx.install(ScopeRequest::Global, Selection::Plugins(vec!["evil".into()]));
    assert!(report.plugins.is_empty());
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].subject, "evil");
    assert!(!fx.host.cache_root().join("escape").exists());
    assert!(!fx.host.namespace_dir().exists());
}

#[test]
fn services_dropped_by_a_plugin_leave_the_project() {
    let fx = standard_fixture();
    let mcp = fx.src.join("plugins/core/.mcp.json");
    fx.file(
        &mcp,
        &json!({"mcpServers": {"docs": {"command": "docs-mcp"}, "old": {"command": "o"}}})
            .to_string(),
    );
    fx.file(
        &fx.project.join(".mcp.json"),
        &json!({"mcpServers": {"mine": {"command": "x"}}}).to_string(),
    );
    let core = || Selection::Plugins(vec!["core".into()]);
    fx.install(fx.project_scope(), core());

    fx.file(
        &mcp,
        &json!({"mcpServers": {"docs": {"command": "docs-mcp"}}}).to_string(),
    );
    fx.install(fx.project_scope(), core());
    let services = read_json(&fx.project.join(".mcp.json"));
    assert!(services["mcpServers"].get("old").is_none());
    assert_eq!(services["mcpServers"]["docs"]["_dot_kit"], "core");

    fs::remove_file(&mcp).unwrap();
    fx.install(fx.project_scope(), core());
    assert_eq!(
        read_json(&fx.project.join(".mcp.json")),
        json!({"mcpServers": {"mine": {"command": "x"}}})
    );
}

#[test]
fn project_skips_service_defined_globally() {
    let fx = standard_fixture();
    let cache = fx.plugin("cache", "1.0.0");
    fx.file(
        &cache.join(".mcp.json"),
        &json!({"mcpServers": {
            "redis": {"command": "redis-mcp"},
            "memcached": {"command": "memcached-mcp"}
        }})
        .to_string(),
    );
    fx.file(
        &fx.host.service_registry,
        &json!({"mcpServers": {"redis": {"command": "my-redis"}}}).to_string(),
    );

    let report = fx.install(fx.project_scope(), Selection::Plugins(vec!["cache".into()]));
    assert_eq!(report.skipped_services, 1);
    assert_eq!(report.services_merged, 1);
    assert_eq!(report.skipped_duplicates(), 1);

    let project = read_json(&fx.project.join(".mcp.json"));
    assert!(project["mcpServers"].get("redis").is_none());
    assert_eq!(project["mcpServers"]["memcached"]["_dot_kit"], "cache");
}

#[test]
fn project_uninstall_leaves_service_registry() {
    let fx = standard_fixture();
    fx.install(fx.project_scope(), Selection::Plugins(vec!["core".into()]));
    let services = fs::read_to_string(fx.project.join(".mcp.json")).unwrap();

    let outcome = fx
        .engine()
        .uninstall(
            &UninstallRequest {
                scope: fx.project_scope(),
            },
            &mut AssumeYes,
        )
        .unwrap();
    let UninstallOutcome::Removed(report) = outcome else {
        panic!("expected removal");
    };

    assert_eq!(report.notices.len(), 1);
    assert_eq!(fs::read_to_string(fx.project.join(".mcp.json")).unwrap(), services);
    assert_eq!(read_json(&fx.project.join(".claude/settings.json")), json!({}));
}

#[test]
fn dry_run_writes_nothing() {
    let fx = standard_fixture();
    let report = fx
        .engine()
        .install(&InstallRequest {
            scope: fx.project_scope(),
            selection: Selection::All,
            dry_run: true,
        })
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.materialized, 5);
    assert_eq!(report.hooks_merged, 1);
    assert!(!fx.project.join(".claude").exists());
    assert!(!fx.project.join(".mcp.json").exists());
}

#[test]
fn broken_plugin_does_not_stop_the_batch() {
    let fx = standard_fixture();
    fx.file(
        &fx.src.join("plugins/core/hooks/hooks.json"),
        "{ not json",
    );

    let report = fx.install(fx.project_scope(), Selection::All);
    assert_eq!(report.plugins, vec!["core", "ui"]);
    assert_eq!(report.issues.len(), 1);
    assert!(report.issues[0].message.starts_with("hooks:"));
    assert!(fx.project.join(".claude/agents/designer.md").exists());
}

#[test]
fn broken_references_are_reported() {
    let fx = standard_fixture();
    fx.install(fx.project_scope(), Selection::All);
    fs::remove_file(fx.src.join("plugins/ui/agents/designer.md")).unwrap();

    let report = fx
        .engine()
        .update(&UpdateRequest {
            project: Some(fx.project.clone()),
        })
        .unwrap();

    assert_eq!(report.broken.len(), 1);
    assert_eq!(report.broken[0].path, fx.project.join(".claude/agents/designer.md"));
    assert!(Reference::read(&report.broken[0].path).unwrap().is_some());
}
