// src/reconcile/mod.rs

//! Bringing the machine and the manifests into agreement
//!
//! Three directions share one [`Reconciler`]:
//!
//! - **install** converges the machine toward the merged manifests
//! - **init** absorbs the machine's state into the manifests
//! - **clean** removes what is installed but not declared
//!
//! Each builds an [`ActionPlan`] first and only then runs it, so plans can be
//! inspected (and printed for dry runs) without touching the system.

mod absorb;
mod clean;
mod converge;
mod plan;

pub use absorb::backup_input;
pub use converge::InstallSummary;
pub use plan::{Action, ActionPlan, Verb};

use crate::config::{Config, PackageSelection, StoreAppLevel};
use crate::error::Result;
use crate::manifest::{
    Domain, ManifestEntry, ManifestGraph, OptionTable, StoreApp, WriteOptions,
};
use crate::probe::{
    info_or_empty, leaves_or_empty, query_or_empty, BrewEnvironment, CommandRunner, FormulaInfo,
    InfoTarget, RunOptions, StateProbe,
};
use crate::repository::{basename, RepositoryIndex, DIRECT_TAP};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Installed state gathered in one pass
#[derive(Debug, Clone, Default)]
pub struct ActualState {
    /// Every installed package
    pub packages: Vec<String>,
    /// Packages chosen by the selection mode, with their install options
    pub selected: OptionTable,
    pub repositories: Vec<String>,
    pub gui_packages: Vec<String>,
    /// Installed casks whose definition is gone
    pub orphans: Vec<String>,
    pub store_apps: Vec<String>,
    pub info: BTreeMap<String, FormulaInfo>,
}

impl ActualState {
    /// Query everything the reconciler needs
    ///
    /// With store apps in detect-only mode, the declared store apps stand in
    /// for the installed ones unless `force_store_apps` is set.
    pub fn collect(
        probe: &dyn StateProbe,
        config: &Config,
        graph: &ManifestGraph,
        force_store_apps: bool,
    ) -> Result<Self> {
        let mut state = ActualState::default();

        if !config.cask_only {
            state.info = info_or_empty(probe, InfoTarget::Installed)?;
            state.packages = query_or_empty(probe, Domain::Package)?;

            let mut chosen: Vec<String> = match config.package_selection() {
                PackageSelection::OnRequest => state
                    .info
                    .iter()
                    .filter(|(name, info)| {
                        let linked = linked_version(probe, name, info);
                        info.installed_on_request(linked.as_deref())
                    })
                    .map(|(name, _)| name.clone())
                    .collect(),
                PackageSelection::Leaves => leaves_or_empty(probe)?,
                PackageSelection::All => state.packages.clone(),
            };
            for package in &config.top_packages {
                if state.packages.contains(package) && !chosen.contains(package) {
                    chosen.push(package.clone());
                }
            }

            for (name, info) in &state.info {
                if chosen.contains(name) {
                    let linked = linked_version(probe, name, info);
                    state
                        .selected
                        .insert(name, &info.install_options(linked.as_deref()));
                }
            }
        }

        state.repositories = query_or_empty(probe, Domain::Repository)?;
        if !state.repositories.iter().any(|t| t == DIRECT_TAP) {
            state.repositories.push(DIRECT_TAP.to_string());
        }

        for line in query_or_empty(probe, Domain::GuiPackage)? {
            let mut tokens = line.split_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            if tokens.next().is_none() {
                state.gui_packages.push(name.to_string());
            } else {
                warn!("The cask file of {} doesn't exist. Please check later.", line);
                state.orphans.push(name.to_string());
            }
        }

        state.store_apps = match config.store_apps {
            StoreAppLevel::Off => Vec::new(),
            StoreAppLevel::Manage => query_or_empty(probe, Domain::StoreApp)?,
            StoreAppLevel::DetectOnly if force_store_apps => {
                query_or_empty(probe, Domain::StoreApp)?
            }
            StoreAppLevel::DetectOnly => graph.merged_identifiers(Domain::StoreApp),
        };

        debug!(
            "Installed: {} packages ({} selected), {} taps, {} casks, {} store apps",
            state.packages.len(),
            state.selected.len(),
            state.repositories.len(),
            state.gui_packages.len(),
            state.store_apps.len()
        );
        Ok(state)
    }

    /// Whether a declared identifier is present on the machine
    ///
    /// Packages are compared by base name, so `user/tap/pkg` is found as `pkg`.
    pub fn is_installed(&self, domain: Domain, identifier: &str) -> bool {
        match domain {
            Domain::Package => self.packages.iter().any(|p| p == basename(identifier)),
            Domain::Repository => self.repositories.iter().any(|t| t == identifier),
            Domain::GuiPackage => self.gui_packages.iter().any(|c| c == identifier),
            Domain::StoreApp => {
                let wanted = StoreApp::parse(identifier);
                self.store_apps
                    .iter()
                    .any(|a| StoreApp::parse(a).matches(&wanted))
            }
            _ => false,
        }
    }

    /// Installed options of a selected package
    pub fn options(&self, package: &str) -> Option<&str> {
        self.selected.get(basename(package))
    }

    /// Installed state of an identity domain as manifest entries
    pub fn entries(&self, domain: Domain) -> Vec<ManifestEntry> {
        match domain {
            Domain::Package => self
                .selected
                .iter()
                .map(|(name, options)| ManifestEntry::new(domain, name).with_options(options))
                .collect(),
            Domain::Repository => to_entries(domain, &self.repositories),
            Domain::GuiPackage => to_entries(domain, &self.gui_packages),
            Domain::StoreApp => self
                .store_apps
                .iter()
                .map(|a| ManifestEntry::new(domain, StoreApp::parse(a).to_identifier()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn to_entries(domain: Domain, identifiers: &[String]) -> Vec<ManifestEntry> {
    identifiers
        .iter()
        .map(|id| ManifestEntry::new(domain, id.as_str()))
        .collect()
}

fn linked_version(probe: &dyn StateProbe, name: &str, info: &FormulaInfo) -> Option<String> {
    info.linked_keg.clone().or_else(|| probe.linked_version(name))
}

/// Drives install, init and clean against a probe and a command runner
pub struct Reconciler<'a> {
    config: &'a Config,
    probe: &'a dyn StateProbe,
    runner: &'a dyn CommandRunner,
    index: &'a dyn RepositoryIndex,
    has_mas: bool,
    cache: Option<PathBuf>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: &'a Config,
        probe: &'a dyn StateProbe,
        runner: &'a dyn CommandRunner,
        index: &'a dyn RepositoryIndex,
    ) -> Self {
        Self {
            config,
            probe,
            runner,
            index,
            has_mas: false,
            cache: None,
        }
    }

    /// Take the App Store CLI availability and cache location from Homebrew
    pub fn with_environment(mut self, env: &BrewEnvironment) -> Self {
        self.has_mas = env.has_mas;
        self.cache = Some(env.cache.clone());
        self
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn actual_state(&self, graph: &ManifestGraph, force_store_apps: bool) -> Result<ActualState> {
        ActualState::collect(self.probe, self.config, graph, force_store_apps)
    }

    /// Dialect override, else the detected one, else plain
    pub fn write_options(&self, graph: &ManifestGraph) -> WriteOptions {
        WriteOptions {
            dialect: self
                .config
                .dialect
                .or(graph.detected_dialect())
                .unwrap_or_default(),
            cask_repo: self.config.cask_repo.clone(),
            cask_only: self.config.cask_only,
            store_apps: self.config.store_apps.is_enabled(),
            echo: self.config.verbosity > 1,
        }
    }

    /// Run one action
    ///
    /// Shell commands abort the operation on failure; every other failed
    /// action is reported and skipped. Returns the output of a successful
    /// command.
    fn execute(&self, action: &Action) -> Result<Option<Vec<String>>> {
        match action.verb {
            Verb::Manual => {
                warn!("{}", action.command_line());
                Ok(None)
            }
            Verb::Run => {
                let output = self
                    .runner
                    .shell(&action.command_line(), &RunOptions::loud().fail_fast())?;
                Ok(Some(output.lines))
            }
            _ => match self.runner.run(&action.payload, &RunOptions::loud()) {
                Ok(output) if output.success() => Ok(Some(output.lines)),
                Ok(output) => {
                    warn!(
                        "Can not {} {} (exit code {}). Please check later.",
                        action.verb, action.identifier, output.code
                    );
                    Ok(None)
                }
                Err(e) => {
                    warn!("Can not {} {}: {}", action.verb, action.identifier, e);
                    Ok(None)
                }
            },
        }
    }

    /// `brew update` and upgrades, then install, clean and init
    pub fn update(&self, graph: &mut ManifestGraph) -> Result<()> {
        if self.config.upgrade {
            for command in ["brew update", "brew upgrade --fetch-HEAD", "brew upgrade --cask"] {
                self.runner
                    .shell(command, &RunOptions::loud().fail_fast())?;
            }
        }
        self.install(graph)?;
        if !self.config.dry_run {
            self.clean(graph)?;
        }
        self.initialize(graph)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::repository::EmptyIndex;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_graph(dir: &TempDir, content: &str) -> ManifestGraph {
        let path = dir.path().join("Brewfile");
        fs::write(&path, content).unwrap();
        ManifestGraph::resolve(path, &EmptyIndex).unwrap()
    }

    #[test]
    fn test_collect_selection_modes() {
        let dir = TempDir::new().unwrap();
        let graph = create_test_graph(&dir, "");
        let mut machine = FakeMachine::with_packages(&[("git", ""), ("pcre", ""), ("go", "")]);
        machine.leaves = vec!["git".to_string()];
        machine.not_on_request = vec!["pcre".to_string(), "go".to_string()];

        let mut config = create_test_config();
        let state = ActualState::collect(&machine, &config, &graph, false).unwrap();
        assert_eq!(state.selected.len(), 3);
        assert!(state.repositories.contains(&DIRECT_TAP.to_string()));

        config.leaves = true;
        config.top_packages = vec!["go".to_string(), "missing".to_string()];
        let state = ActualState::collect(&machine, &config, &graph, false).unwrap();
        let names: Vec<&str> = state.selected.names().collect();
        assert_eq!(names, vec!["git", "go"]);

        config.leaves = false;
        config.on_request = true;
        config.top_packages.clear();
        let state = ActualState::collect(&machine, &config, &graph, false).unwrap();
        let names: Vec<&str> = state.selected.names().collect();
        assert_eq!(names, vec!["git"]);
    }

    #[test]
    fn test_collect_splits_orphan_casks() {
        let dir = TempDir::new().unwrap();
        let graph = create_test_graph(&dir, "");
        let machine = FakeMachine::default();
        machine.casks.borrow_mut().extend([
            "firefox".to_string(),
            "old-app (!)".to_string(),
        ]);

        let state = ActualState::collect(&machine, &create_test_config(), &graph, false).unwrap();
        assert_eq!(state.gui_packages, vec!["firefox"]);
        assert_eq!(state.orphans, vec!["old-app"]);
    }

    #[test]
    fn test_detect_only_store_apps_use_declared() {
        let dir = TempDir::new().unwrap();
        let graph = create_test_graph(&dir, "appstore 497799835 Xcode\n");
        let machine = FakeMachine::default();
        machine.apps.borrow_mut().push("409183694 Keynote (12.0)".to_string());

        let mut config = create_test_config();
        config.store_apps = StoreAppLevel::DetectOnly;
        let state = ActualState::collect(&machine, &config, &graph, false).unwrap();
        assert_eq!(state.store_apps, vec!["497799835 Xcode"]);

        let state = ActualState::collect(&machine, &config, &graph, true).unwrap();
        assert_eq!(state.store_apps, vec!["409183694 Keynote (12.0)"]);
        assert!(state.is_installed(Domain::StoreApp, "409183694 Keynote"));
    }

    #[test]
    fn test_write_options_prefer_override() {
        let dir = TempDir::new().unwrap();
        let graph = create_test_graph(&dir, "brew 'git'\n");
        let machine = FakeMachine::default();
        let mut config = create_test_config();

        let reconciler = Reconciler::new(&config, &machine, &machine, &EmptyIndex);
        assert_eq!(
            reconciler.write_options(&graph).dialect,
            crate::manifest::Dialect::Bundle
        );

        config.dialect = Some(crate::manifest::Dialect::Command);
        let reconciler = Reconciler::new(&config, &machine, &machine, &EmptyIndex);
        assert_eq!(
            reconciler.write_options(&graph).dialect,
            crate::manifest::Dialect::Command
        );
    }

    #[test]
    fn test_update_without_upgrade_skips_brew_update() {
        let dir = TempDir::new().unwrap();
        let mut graph = create_test_graph(&dir, "brew git\n");
        let machine = FakeMachine::default();
        let mut config = create_test_config();
        config.input = dir.path().join("Brewfile");
        config.upgrade = false;

        let reconciler = Reconciler::new(&config, &machine, &machine, &EmptyIndex);
        reconciler.update(&mut graph).unwrap();

        let commands = machine.commands();
        assert!(!commands.iter().any(|c| c.contains("brew update")));
        assert!(commands.contains(&"brew install git".to_string()));
        let written = fs::read_to_string(dir.path().join("Brewfile")).unwrap();
        assert!(written.contains("brew git"));
    }
}
