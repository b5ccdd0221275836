// src/appmatch/mod.rs

//! Matching installed applications to casks
//!
//! Walks the application directories and classifies each bundle: bought
//! from the App Store, installed by a cask, installed directly although a
//! cask exists, installed by a formula, or unknown to Homebrew. The result
//! is an advisory `Caskfile`; nothing is fed back into the manifests.

mod casks;
mod report;

pub use casks::{
    bundle_names, cask_versions, parse_proposals, CaskCatalog, CaskDefinition, Proposal,
    ScriptOracle, TokenOracle, TOKEN_SCRIPT,
};
pub use report::{display_path, MatchReport};

use crate::config::Config;
use crate::error::Result;
use crate::manifest::{Domain, StoreApp};
use crate::output::print_banner;
use crate::probe::{
    info_or_empty, query_or_empty, BrewEnvironment, CommandRunner, InfoTarget, StateProbe,
};
use crate::repository::RepositoryIndex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the report
pub const CASKFILE: &str = "Caskfile";

/// How an application got onto the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AppClass {
    /// Installed by a cask
    Cask,
    /// Installed by a formula
    Brew,
    /// Installed directly, but a cask is available
    HasCask,
    AppStore,
    NoCask,
}

impl AppClass {
    pub const ALL: [AppClass; 5] = [
        AppClass::Cask,
        AppClass::Brew,
        AppClass::HasCask,
        AppClass::AppStore,
        AppClass::NoCask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppClass::Cask => "cask",
            AppClass::Brew => "brew",
            AppClass::HasCask => "has_cask",
            AppClass::AppStore => "appstore",
            AppClass::NoCask => "no_cask",
        }
    }
}

/// Classification of one application bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    pub dir: PathBuf,
    pub bundle: String,
    pub class: AppClass,
    /// The matching cask (or formula) first; every candidate for `HasCask`
    pub candidates: Vec<Proposal>,
    pub store_app: Option<StoreApp>,
    /// Build options of a formula-installed app
    pub options: String,
}

impl AppRecord {
    fn new(dir: &Path, bundle: &str, class: AppClass) -> Self {
        Self {
            dir: dir.to_path_buf(),
            bundle: bundle.to_string(),
            class,
            candidates: Vec::new(),
            store_app: None,
            options: String::new(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.bundle)
    }

    /// Token of the matched cask or formula
    pub fn token(&self) -> Option<&str> {
        self.candidates.first().map(|p| p.token.as_str())
    }
}

/// Application bundles (and other directories) in `app_dirs`
///
/// Hidden entries and `Utilities` are skipped; each directory is listed in
/// name order.
pub fn scan_bundles(app_dirs: &[PathBuf]) -> Vec<(PathBuf, String)> {
    let mut bundles = Vec::new();
    for dir in app_dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            debug!("Cannot read {}", dir.display());
            continue;
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| !n.starts_with('.') && n != "Utilities")
            .collect();
        names.sort();
        bundles.extend(names.into_iter().map(|n| (dir.clone(), n)));
    }
    bundles
}

/// Classifies bundles against the cask catalog, store apps and formulae
pub struct AppMatcher<'a> {
    catalog: CaskCatalog,
    store_apps: Vec<StoreApp>,
    /// Installed formulae and their build options
    packages: BTreeMap<String, String>,
    oracle: &'a dyn TokenOracle,
}

impl<'a> AppMatcher<'a> {
    pub fn new(
        catalog: CaskCatalog,
        store_apps: Vec<StoreApp>,
        packages: BTreeMap<String, String>,
        oracle: &'a dyn TokenOracle,
    ) -> Self {
        Self {
            catalog,
            store_apps,
            packages,
            oracle,
        }
    }

    pub fn classify(&mut self, dir: &Path, bundle: &str) -> Result<AppRecord> {
        let name = bundle.strip_suffix(".app").unwrap_or(bundle);

        if let Some(app) = self.store_apps.iter().find(|a| a.name == name) {
            let mut record = AppRecord::new(dir, bundle, AppClass::AppStore);
            record.store_app = Some(app.clone());
            return Ok(record);
        }

        let stem = bundle.split('.').next().unwrap_or(bundle);
        let listed = [bundle.to_string(), stem.to_string(), format!("{}.app", stem)]
            .iter()
            .find_map(|key| self.catalog.listed_for_bundle(key))
            .map(|c| Proposal {
                token: c.token.clone(),
                tap: c.tap.clone(),
            });
        if let Some(cask) = listed {
            self.catalog.mark_found(&cask.token);
            let mut record = AppRecord::new(dir, bundle, AppClass::Cask);
            record.candidates.push(cask);
            return Ok(record);
        }

        let query = if bundle.ends_with(".app") {
            bundle.to_string()
        } else {
            dir.join(bundle).to_string_lossy().into_owned()
        };
        let query = query.rsplit('/').next().unwrap_or(&query).to_string();
        let mut candidates = self.oracle.propose(&query)?;

        let mut installed = candidates
            .first()
            .is_some_and(|p| self.catalog.is_installed(&p.token));
        if !installed {
            for cask in self.catalog.providing(bundle) {
                let proposal = Proposal {
                    token: cask.token.clone(),
                    tap: cask.tap.clone(),
                };
                if cask.installed {
                    installed = true;
                    candidates = vec![proposal];
                    break;
                }
                if !candidates.iter().any(|p| p.token == proposal.token) {
                    candidates.push(proposal);
                }
            }
        }
        for candidate in &candidates {
            self.catalog.mark_found(&candidate.token);
        }

        let mut record = AppRecord::new(dir, bundle, AppClass::NoCask);
        if installed {
            info!("Installed by Cask: {} ({})", bundle, candidates[0].token);
            record.class = AppClass::Cask;
            candidates.truncate(1);
            record.candidates = candidates;
        } else if let Some(formula) = candidates
            .iter()
            .find(|p| self.packages.contains_key(&p.token))
        {
            record.class = AppClass::Brew;
            record.options = self.packages[&formula.token].clone();
            record.candidates = vec![Proposal {
                token: formula.token.clone(),
                tap: String::new(),
            }];
        } else if !candidates.is_empty() {
            let tokens: Vec<&str> = candidates.iter().map(|p| p.token.as_str()).collect();
            info!(
                "Installed directly, instead of by Cask: {}, Cask candidates: {}",
                bundle,
                tokens.join(", ")
            );
            record.class = AppClass::HasCask;
            record.candidates = candidates;
        } else {
            info!("Non Cask app: {}", bundle);
        }
        Ok(record)
    }

    /// Classify every bundle of `app_dirs`
    pub fn run(mut self, app_dirs: &[PathBuf], taps: Vec<String>, cask_repo: &str) -> Result<MatchReport> {
        let mut records = Vec::new();
        for (dir, bundle) in scan_bundles(app_dirs) {
            records.push(self.classify(&dir, &bundle)?);
        }
        Ok(MatchReport {
            records,
            catalog: self.catalog,
            taps,
            cask_repo: cask_repo.to_string(),
            app_dirs: app_dirs.to_vec(),
        })
    }
}

/// Check every installed application and write the `Caskfile` report
pub fn check_casks(
    config: &Config,
    probe: &dyn StateProbe,
    runner: &dyn CommandRunner,
    index: &dyn RepositoryIndex,
    env: &BrewEnvironment,
    output: &Path,
) -> Result<MatchReport> {
    let verbosity = config.verbosity;
    print_banner("# Starting to check applications for Cask...", verbosity);

    let store_apps: Vec<StoreApp> = query_or_empty(probe, Domain::StoreApp)?
        .iter()
        .map(|a| StoreApp::parse(a))
        .collect();
    let listed: Vec<String> = query_or_empty(probe, Domain::GuiPackage)?
        .iter()
        .filter_map(|l| l.split_whitespace().next().map(str::to_string))
        .collect();
    let taps: Vec<String> = query_or_empty(probe, Domain::Repository)?
        .into_iter()
        .filter(|t| index.has_casks(t))
        .collect();

    let oracle = ScriptOracle::locate(index, &config.cask_repo, taps.clone(), runner)?;
    let catalog = CaskCatalog::load(index, &taps, &listed, &env.caskroom());
    let packages: BTreeMap<String, String> = info_or_empty(probe, InfoTarget::Installed)?
        .into_iter()
        .map(|(name, package)| {
            let linked = package
                .linked_keg
                .clone()
                .or_else(|| probe.linked_version(&name));
            let options = package.install_options(linked.as_deref());
            (name, options)
        })
        .collect();

    let matcher = AppMatcher::new(catalog, store_apps, packages, &oracle);
    let report = matcher.run(&config.app_dirs, taps, &config.cask_repo)?;
    report.write(output, verbosity > 1)?;

    print_banner("# Summary", verbosity);
    if verbosity > 0 {
        println!("{}", report.summary());
    }
    Ok(report)
}
