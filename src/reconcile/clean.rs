// src/reconcile/clean.rs

//! Clean: remove what is installed but not declared

use super::{Action, ActionPlan, ActualState, Reconciler, Verb};
use crate::config::StoreAppLevel;
use crate::error::Result;
use crate::manifest::{Domain, ManifestGraph, StoreApp};
use crate::output::print_banner;
use crate::probe::{find_bundle, info_or_empty, leaves_or_empty, InfoTarget};
use crate::repository::{basename, tap_of, DIRECT_TAP};
use std::collections::HashSet;
use tracing::debug;

fn section_title(domain: Domain) -> &'static str {
    match domain {
        Domain::StoreApp => "# Clean up App Store applications",
        Domain::GuiPackage => "# Clean up cask packages",
        Domain::Package => "# Clean up brew packages",
        Domain::Repository => "# Clean up tap repositories",
        _ => "# Clean up cache",
    }
}

impl Reconciler<'_> {
    /// Removals for everything installed but not declared
    ///
    /// Store apps and casks go first, then packages, then taps, then the
    /// download cache. Dependencies of declared packages are kept, and a tap
    /// stays while anything it provides is declared.
    pub fn plan_clean(&self, graph: &ManifestGraph, actual: &ActualState) -> ActionPlan {
        let mut plan = ActionPlan::new();

        if self.config.store_apps == StoreAppLevel::Manage {
            let declared: Vec<StoreApp> = graph
                .merged_identifiers(Domain::StoreApp)
                .iter()
                .map(|a| StoreApp::parse(a))
                .collect();
            for app in &actual.store_apps {
                let installed = StoreApp::parse(app);
                if declared.iter().any(|d| d.matches(&installed)) {
                    continue;
                }
                let identifier = installed.to_identifier();
                match &installed.id {
                    Some(id) if self.has_mas => plan.push(Action::new(
                        Domain::StoreApp,
                        Verb::Remove,
                        &identifier,
                        &["sudo", "mas", "uninstall", id.as_str()],
                    )),
                    _ => {
                        if let Some(bundle) = find_bundle(&self.config.app_dirs, &installed.name) {
                            let bundle = bundle.to_string_lossy().into_owned();
                            plan.push(Action::new(
                                Domain::StoreApp,
                                Verb::Remove,
                                &identifier,
                                &["sudo", "rm", "-rf", bundle.as_str()],
                            ));
                        }
                    }
                }
            }
        }

        let declared_casks = graph.merged_identifiers(Domain::GuiPackage);
        let mut remaining_casks = Vec::new();
        for cask in &actual.gui_packages {
            if declared_casks.contains(cask) {
                remaining_casks.push(cask.as_str());
                continue;
            }
            plan.push(Action::new(
                Domain::GuiPackage,
                Verb::Remove,
                cask,
                &["brew", "uninstall", cask.as_str()],
            ));
        }

        let declared_packages = graph.merged_identifiers(Domain::Package);
        if !self.config.cask_only {
            let protected = protect_dependencies(&declared_packages, actual);
            for package in actual.selected.names() {
                if protected.contains(package) {
                    continue;
                }
                plan.push(Action::new(
                    Domain::Package,
                    Verb::Remove,
                    package,
                    &["brew", "uninstall", "--ignore-dependencies", package],
                ));
            }
        }

        let declared_taps = graph.merged_identifiers(Domain::Repository);
        for tap in &actual.repositories {
            if tap == DIRECT_TAP || declared_taps.contains(tap) {
                continue;
            }
            if *tap == self.config.cask_repo && !remaining_casks.is_empty() {
                continue;
            }
            let provides_package = declared_packages.iter().any(|p| tap_of(p) == Some(tap.as_str()))
                || self
                    .index
                    .packages(tap)
                    .iter()
                    .any(|p| declared_packages.iter().any(|d| basename(d) == p));
            let provides_cask = self
                .index
                .gui_packages(tap)
                .iter()
                .any(|c| declared_casks.contains(c));
            if provides_package || provides_cask {
                debug!("Keeping {}: it provides a declared package", tap);
                continue;
            }
            plan.push(Action::new(
                Domain::Repository,
                Verb::RemoveRepository,
                tap,
                &["brew", "untap", tap.as_str()],
            ));
        }

        plan.push(Action::run(Domain::RawCommand, "brew cleanup"));
        if let Some(cache) = &self.cache {
            plan.push(Action::run(
                Domain::RawCommand,
                &format!("rm -rf '{}'", cache.display()),
            ));
        }
        plan
    }

    pub fn clean(&self, graph: &ManifestGraph) -> Result<ActionPlan> {
        let actual = self.actual_state(graph, false)?;
        let plan = self.plan_clean(graph, &actual);
        self.run_removals(&plan, "clean")?;
        Ok(plan)
    }

    /// Leaves that were only ever installed as dependencies
    pub fn plan_clean_non_request(&self) -> Result<ActionPlan> {
        let info = info_or_empty(self.probe, InfoTarget::Installed)?;
        let leaves = leaves_or_empty(self.probe)?;
        let mut plan = ActionPlan::new();
        for (name, package) in &info {
            if !leaves.contains(name) {
                continue;
            }
            let linked = package
                .linked_keg
                .clone()
                .or_else(|| self.probe.linked_version(name));
            let requested = package
                .active_install(linked.as_deref())
                .and_then(|i| i.installed_on_request);
            if requested == Some(false) {
                plan.push(Action::new(
                    Domain::Package,
                    Verb::Remove,
                    name,
                    &["brew", "uninstall", name.as_str()],
                ));
            }
        }
        Ok(plan)
    }

    pub fn clean_non_request(&self) -> Result<ActionPlan> {
        let plan = self.plan_clean_non_request()?;
        self.run_removals(&plan, "clean_non_request")?;
        Ok(plan)
    }

    /// Print the plan on a dry run, run it otherwise
    fn run_removals(&self, plan: &ActionPlan, command: &str) -> Result<()> {
        let verbosity = self.config.verbosity;
        let dry_run = self.config.dry_run;
        if dry_run {
            print_banner("# This is dry run.", verbosity);
        }

        let mut section = None;
        for action in plan {
            if section != Some(action.domain) {
                print_banner(section_title(action.domain), verbosity);
                section = Some(action.domain);
            }
            if dry_run {
                println!("{}", action);
            } else {
                self.execute(action)?;
            }
        }

        if dry_run {
            print_banner(
                &format!(
                    "# This is dry run.\n# If you want to enforce cleanup, use '-C':\n#     $ brew-file {} -C",
                    command
                ),
                verbosity,
            );
        }
        Ok(())
    }
}

/// Declared packages and everything they depend on, by base name
fn protect_dependencies(declared: &[String], actual: &ActualState) -> HashSet<String> {
    let mut protected: HashSet<String> = declared.iter().map(|p| basename(p).to_string()).collect();
    let mut pending: Vec<String> = protected.iter().cloned().collect();
    while let Some(name) = pending.pop() {
        let Some(info) = actual.info.get(&name) else {
            continue;
        };
        for dependency in &info.dependencies {
            let dependency = basename(dependency).to_string();
            if protected.insert(dependency.clone()) {
                pending.push(dependency);
            }
        }
    }
    protected
}
