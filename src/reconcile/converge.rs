// src/reconcile/converge.rs

//! Install: converge the machine toward the manifests

use super::{Action, ActionPlan, ActualState, Reconciler, Verb};
use crate::config::expand_path;
use crate::error::Result;
use crate::manifest::{options_equal, Domain, ManifestGraph, StoreApp};
use crate::output::print_banner;
use crate::probe::{info_or_empty, InfoTarget, RunOptions};
use crate::repository::{basename, DIRECT_TAP};
use tracing::{debug, info, warn};

/// What an install pass did
#[derive(Debug, Clone, Default)]
pub struct InstallSummary {
    pub plan: ActionPlan,
    /// Identifiers whose action failed or needs manual work
    pub pending: Vec<String>,
    /// Manifests were rewritten with refreshed package options
    pub rewritten: bool,
}

fn section_title(domain: Domain) -> &'static str {
    match domain {
        Domain::BeforeCommand => "# Before commands",
        Domain::Repository => "# Add tap repositories",
        Domain::GuiPackage => "# Install cask packages",
        Domain::Package => "# Install brew packages",
        Domain::StoreApp => "# Install App Store applications",
        Domain::RawCommand => "# Other commands",
        Domain::AfterCommand => "# After commands",
        Domain::IncludedFile => "# Additional files",
    }
}

impl Reconciler<'_> {
    /// Actions that bring the machine to the merged manifests
    ///
    /// Order: before hooks, taps, casks, packages, store apps, raw commands,
    /// after hooks.
    pub fn plan_install(&self, graph: &ManifestGraph, actual: &ActualState) -> ActionPlan {
        let mut plan = ActionPlan::new();

        for hook in graph.merged_identifiers(Domain::BeforeCommand) {
            plan.push(Action::run(Domain::BeforeCommand, &hook));
        }

        for tap in graph.merged_identifiers(Domain::Repository) {
            if tap == DIRECT_TAP || actual.is_installed(Domain::Repository, &tap) {
                continue;
            }
            plan.push(Action::new(
                Domain::Repository,
                Verb::AddRepository,
                &tap,
                &["brew", "tap", tap.as_str()],
            ));
        }

        for cask in graph.merged_identifiers(Domain::GuiPackage) {
            if actual.is_installed(Domain::GuiPackage, &cask) {
                continue;
            }
            plan.push(Action::new(
                Domain::GuiPackage,
                Verb::Install,
                &cask,
                &["brew", "install", "--cask", "--force", cask.as_str()],
            ));
        }

        if !self.config.cask_only {
            for entry in graph.merged(Domain::Package) {
                let verb = if !actual.is_installed(Domain::Package, &entry.identifier) {
                    Verb::Install
                } else {
                    // Unselected packages have unknown options and are left alone
                    match actual.options(&entry.identifier) {
                        Some(installed) if !options_equal(&entry.options, installed) => {
                            debug!(
                                "{}: installed with '{}', declared '{}'",
                                entry.identifier, installed, entry.options
                            );
                            Verb::Reinstall
                        }
                        _ => continue,
                    }
                };
                let mut payload = vec!["brew", verb.as_str(), entry.identifier.as_str()];
                payload.extend(entry.options.split_whitespace());
                plan.push(Action::new(Domain::Package, verb, &entry.identifier, &payload));
            }
        }

        if self.config.store_apps.is_enabled() {
            for app in graph.merged_identifiers(Domain::StoreApp) {
                if actual.is_installed(Domain::StoreApp, &app) {
                    continue;
                }
                let parsed = StoreApp::parse(&app);
                let action = match &parsed.id {
                    Some(id) if self.has_mas => Action::new(
                        Domain::StoreApp,
                        Verb::Install,
                        &app,
                        &["mas", "purchase", id.as_str()],
                    ),
                    Some(_) => Action::new(
                        Domain::StoreApp,
                        Verb::Manual,
                        &app,
                        &[format!(
                            "mas is not installed; install {} from the App Store manually, or run: brew install mas",
                            parsed.name
                        )
                        .as_str()],
                    ),
                    None => Action::new(
                        Domain::StoreApp,
                        Verb::Manual,
                        &app,
                        &[format!(
                            "No id or wrong id information was given for App Store app {}. Please install it manually.",
                            parsed.name
                        )
                        .as_str()],
                    ),
                };
                plan.push(action);
            }
        }

        for command in graph.merged_identifiers(Domain::RawCommand) {
            plan.push(Action::run(Domain::RawCommand, &command));
        }
        for hook in graph.merged_identifiers(Domain::AfterCommand) {
            plan.push(Action::run(Domain::AfterCommand, &hook));
        }
        plan
    }

    /// Converge, then rewrite the manifests if any package was reinstalled
    pub fn install(&self, graph: &mut ManifestGraph) -> Result<InstallSummary> {
        let actual = self.actual_state(graph, true)?;
        let plan = self.plan_install(graph, &actual);
        let verbosity = self.config.verbosity;

        let mut pending = Vec::new();
        let mut reinstalled = Vec::new();
        let mut section = None;
        for action in &plan {
            if section != Some(action.domain) {
                print_banner(section_title(action.domain), verbosity);
                section = Some(action.domain);
            }
            let Some(lines) = self.execute(action)? else {
                pending.push(action.identifier.clone());
                continue;
            };
            if action.domain == Domain::Package {
                if self.config.link {
                    self.replay_links(&lines)?;
                }
                if action.verb == Verb::Reinstall {
                    reinstalled.push(action.identifier.clone());
                }
            }
        }

        let mut rewritten = false;
        if !reinstalled.is_empty() {
            for name in &reinstalled {
                let short = basename(name);
                let info = info_or_empty(self.probe, InfoTarget::Package(short))?;
                if let Some(package) = info.get(short) {
                    let linked = package
                        .linked_keg
                        .clone()
                        .or_else(|| self.probe.linked_version(short));
                    let options = package.install_options(linked.as_deref());
                    graph.set_package_options(name, &options);
                }
            }
            info!("Options changed; rewriting {}", graph.root().path().display());
            graph.write_all(&self.write_options(graph), self.index, verbosity)?;
            rewritten = true;
        }

        if !pending.is_empty() {
            warn!("Not installed: {}", pending.join(", "));
        }
        Ok(InstallSummary {
            plan,
            pending,
            rewritten,
        })
    }

    /// Run the `ln -s` commands an install printed
    fn replay_links(&self, lines: &[String]) -> Result<()> {
        for line in lines {
            let Some(pos) = line.find("ln -s") else {
                continue;
            };
            let argv: Vec<String> = line[pos..]
                .split_whitespace()
                .map(|token| expand_path(token).to_string_lossy().into_owned())
                .collect();
            let output = self.runner.run(&argv, &RunOptions::loud())?;
            if !output.success() {
                warn!("Failed to link: {}", argv.join(" "));
            }
        }
        Ok(())
    }
}
