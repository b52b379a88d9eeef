use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use dot_kit_core::config::{expand_home, Config};
use dot_kit_core::{
    Confirm, DotKitError, Engine, InstallRequest, RemovalPlan, Result, Scope, ScopeRequest,
    Selection, SourceTree, UninstallOutcome, UninstallRequest, UpdateRequest,
};

mod args;
use args::{Cli, Commands, ConfigAction, Shell};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let base_dir = resolve_base_dir(cli.base_dir.clone());
    let globals = Globals {
        base_dir,
        source: cli.source.clone(),
        host_dir: cli.host_dir.clone(),
    };

    let result = match cli.command {
        Some(Commands::Install {
            path,
            global,
            profile,
            plugin,
            dry_run,
        }) => handle_install(&globals, path, global, profile, plugin, dry_run),
        Some(Commands::Uninstall { path, global, yes }) => {
            handle_uninstall(&globals, path, global, yes)
        }
        Some(Commands::Update { path, pull }) => handle_update(&globals, path, pull),
        Some(Commands::List) => handle_list(&globals),
        Some(Commands::Config { action }) => handle_config(action, &globals.base_dir),
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(())
        }
        None => {
            Cli::command().print_help().ok();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Options shared by every command
struct Globals {
    base_dir: PathBuf,
    source: Option<PathBuf>,
    host_dir: Option<PathBuf>,
}

impl Globals {
    fn engine(&self) -> Result<Engine> {
        let config = Config::load(&self.base_dir)?;
        let source_root = match &self.source {
            Some(path) => expand_home(path)?,
            None => match config.source_root()? {
                Some(path) => path,
                None => default_source_root()?,
            },
        };

        let host_dir = self.host_dir.as_deref().map(expand_home).transpose()?;
        let host = config.host_paths(host_dir.as_deref())?;
        Ok(Engine::new(SourceTree::open(&source_root)?, host))
    }
}

/// The current directory, when it looks like a source tree
fn default_source_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    if cwd.join("plugins").is_dir() {
        Ok(cwd)
    } else {
        Err(DotKitError::SourceNotFound { path: cwd })
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "dot-kit", &mut io::stdout());
}

fn resolve_base_dir(cli_base: Option<PathBuf>) -> PathBuf {
    if let Some(base) = cli_base {
        return base;
    }

    dirs::home_dir()
        .map(|h| h.join(".dot-kit"))
        .unwrap_or_else(|| PathBuf::from(".dot-kit"))
}

fn resolve_scope(path: Option<PathBuf>, global: bool) -> Result<ScopeRequest> {
    if global {
        return Ok(ScopeRequest::Global);
    }
    let path = match path {
        Some(path) => expand_home(&path)?,
        None => std::env::current_dir()?,
    };
    Ok(ScopeRequest::Project(path))
}

fn handle_config(action: ConfigAction, base_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(base_dir)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(DotKitError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(base_dir)?;
            config.set(&key, &value)?;
            config.save(base_dir)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(base_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            let path = Config::path(base_dir);
            println!("{}", path.display());
        }
        ConfigAction::Init => {
            let path = Config::init(base_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}

fn handle_install(
    globals: &Globals,
    path: Option<PathBuf>,
    global: bool,
    profile: Option<String>,
    plugins: Vec<String>,
    dry_run: bool,
) -> Result<()> {
    let engine = globals.engine()?;
    let scope = resolve_scope(path, global)?;

    let mut selection = Selection::from_parts(plugins, profile);
    if selection == Selection::All && io::stdin().is_terminal() {
        selection = collect_selection(engine.source())?;
    }

    let report = engine.install(&InstallRequest {
        scope,
        selection,
        dry_run,
    })?;

    println!();
    println!("Scope: {}", report.scope.to_string().cyan());
    println!("Target: {}", report.root.display());
    if report.dry_run {
        println!("{}", "(dry run)".yellow());
    }
    println!();

    for name in &report.plugins {
        println!("  {} {}", "[OK]".green(), name);
    }
    for issue in &report.issues {
        println!("  {} {}", "[WARN]".yellow().bold(), issue);
    }

    println!();
    println!("Summary:");
    println!("  Linked: {}", report.materialized);
    println!("  Unchanged: {}", report.unchanged);
    if report.pruned > 0 {
        println!("  Pruned: {}", report.pruned);
    }
    println!("  Hooks merged: {}", report.hooks_merged);
    println!("  Services merged: {}", report.services_merged);
    if report.skipped_duplicates() > 0 {
        println!(
            "  {} {} (already provided globally: {} components, {} services)",
            "[SKIP]".yellow(),
            report.skipped_duplicates(),
            report.skipped_components,
            report.skipped_services
        );
    }

    if report.conflicts > 0 {
        println!();
        return Err(DotKitError::Conflict { path: report.root });
    }

    println!();
    if report.dry_run {
        println!("{}", "Dry run complete, nothing was written.".yellow());
    } else {
        println!("{} {}", "Installation complete:".green(), report.root.display());
    }

    Ok(())
}

/// Ask for a profile when the user gave no selection
fn collect_selection(source: &SourceTree) -> Result<Selection> {
    let profiles = source.profiles()?.profiles;
    if profiles.is_empty() {
        return Ok(Selection::All);
    }

    println!();
    println!("Available profiles:");
    for (name, def) in &profiles {
        let description = def.description.as_deref().unwrap_or("");
        println!(
            "  {} {} {}",
            name.cyan(),
            format!("({})", def.plugins.join(", ")).dimmed(),
            description
        );
    }
    println!();
    print!("Profile (empty for all plugins): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let answer = input.trim();

    Ok(if answer.is_empty() {
        Selection::All
    } else {
        Selection::Profile(answer.to_string())
    })
}

/// Prints the removal plan and asks for confirmation
struct PromptConfirm {
    assume_yes: bool,
}

impl Confirm for PromptConfirm {
    fn confirm(&mut self, plan: &RemovalPlan) -> bool {
        println!();
        println!(
            "Uninstall from {} ({}):",
            plan.root.display(),
            plan.scope.to_string().yellow()
        );
        println!("  References: {}", plan.references.len());
        println!("  Hook entries: {}", plan.hook_entries);
        if plan.scope == Scope::Global {
            println!("  Service entries: {}", plan.service_keys.len());
            println!("  Enabled plugins: {}", plan.enabled_keys.len());
        }
        if !plan.foreign.is_empty() {
            println!("  Kept (not managed by dot-kit): {}", plan.foreign.len());
        }
        println!();

        if self.assume_yes {
            return true;
        }

        print!("Type 'yes' to confirm: ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            return false;
        }
        input.trim() == "yes"
    }
}

fn handle_uninstall(globals: &Globals, path: Option<PathBuf>, global: bool, yes: bool) -> Result<()> {
    let engine = globals.engine()?;
    let scope = resolve_scope(path, global)?;
    let mut confirm = PromptConfirm { assume_yes: yes };

    match engine.uninstall(&UninstallRequest { scope }, &mut confirm)? {
        UninstallOutcome::NothingToDo => {
            println!("Nothing to uninstall.");
        }
        UninstallOutcome::Declined => {
            println!("Aborted.");
        }
        UninstallOutcome::Removed(report) => {
            for issue in &report.issues {
                println!("  {} {}", "[WARN]".yellow().bold(), issue);
            }
            for path in &report.foreign_kept {
                println!("  {} {}", "[SKIP]".yellow(), path.display());
            }
            for notice in &report.notices {
                println!("  {} {}", "[WARN]".yellow().bold(), notice);
            }

            println!();
            println!("Summary:");
            println!("  References removed: {}", report.references_removed);
            println!("  Hook entries removed: {}", report.hooks_removed);
            if report.scope == Scope::Global {
                println!("  Services removed: {}", report.services_removed.len());
                println!("  Enabled plugins removed: {}", report.enabled_removed.len());
            }
            println!();
            println!("{} {}", "Removed:".red(), report.root.display());
        }
    }

    Ok(())
}

fn handle_update(globals: &Globals, path: Option<PathBuf>, pull: bool) -> Result<()> {
    let engine = globals.engine()?;

    if pull {
        println!("Pulling {}...", engine.source().root().display());
        let output = engine.source().pull()?;
        if !output.is_empty() {
            println!("  {}", output);
        }
    }

    let project = path.map(|p| expand_home(&p)).transpose()?;
    let report = engine.update(&UpdateRequest { project })?;

    println!();
    println!("Target: {}", report.root.display());
    println!();
    for broken in &report.broken {
        println!(
            "  {} {} -> {}",
            "[WARN]".yellow().bold(),
            broken.path.display(),
            broken.target.display()
        );
    }
    for path in &report.foreign {
        println!("  {} {}", "[SKIP]".yellow(), path.display());
    }

    println!();
    println!("Summary:");
    println!("  Checked: {}", report.checked);
    println!("  Broken: {}", report.broken.len());
    println!("  Not managed: {}", report.foreign.len());

    println!();
    if report.is_healthy() {
        println!("{}", "All references OK.".green());
    } else {
        println!(
            "{} Run 'dot-kit install' again to repair broken references.",
            "WARNING:".yellow().bold()
        );
    }

    Ok(())
}

fn handle_list(globals: &Globals) -> Result<()> {
    let engine = globals.engine()?;
    let source = engine.source();
    let scan = source.scan()?;

    println!();
    println!("Source: {}", source.root().display());
    println!();
    println!("Plugins:");
    if scan.plugins.is_empty() && scan.issues.is_empty() {
        println!("  (none)");
    }
    for plugin in &scan.plugins {
        let groups: Vec<_> = plugin.groups.iter().map(|g| g.to_string()).collect();
        println!(
            "  {} {} {}",
            plugin.name.cyan(),
            plugin.version.dimmed(),
            plugin.description.as_deref().unwrap_or("")
        );
        if !groups.is_empty() {
            println!("      {}", groups.join(", ").dimmed());
        }
    }
    for issue in &scan.issues {
        println!("  {} {}", "[WARN]".yellow().bold(), issue);
    }

    let profiles = source.profiles()?.profiles;
    if !profiles.is_empty() {
        println!();
        println!("Profiles:");
        for (name, def) in &profiles {
            println!("  {} {}", name.cyan(), def.plugins.join(", "));
        }
    }
    println!();

    Ok(())
}
