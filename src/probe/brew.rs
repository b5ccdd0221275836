// src/probe/brew.rs

//! Homebrew-backed state probe

use super::traits::{
    argv, parse_info, CommandRunner, FormulaInfo, InfoTarget, RunOptions, StateProbe,
};
use crate::error::{Error, Result};
use crate::manifest::{Domain, StoreApp};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const HOMEBREW_INSTALL: &str = r#"/bin/bash -c "$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)""#;

/// Lines of `brew list --cask` that are not cask names
const CASK_LIST_NOISE: [&str; 3] = ["Warning: nothing to list", "=>", "->"];

/// Locations reported by an installed Homebrew
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrewEnvironment {
    pub brew: String,
    pub prefix: PathBuf,
    pub repository: PathBuf,
    pub cache: PathBuf,
    /// `mas` (App Store CLI) is on the PATH
    pub has_mas: bool,
}

impl BrewEnvironment {
    /// Locate Homebrew; fails with a remedy when it is not installed
    pub fn detect(runner: &dyn CommandRunner) -> Result<Self> {
        let which = runner.run(&argv(&["which", "brew"]), &RunOptions::quiet())?;
        let brew = match which.lines.first() {
            Some(path) if which.success() => path.trim().to_string(),
            _ => {
                return Err(Error::EnvironmentMissing {
                    tool: "Homebrew".to_string(),
                    remedy: HOMEBREW_INSTALL.to_string(),
                });
            }
        };

        let value = |name: &str| -> Result<PathBuf> {
            let flag = format!("--{}", name);
            let output = runner.run(
                &argv(&[brew.as_str(), flag.as_str()]),
                &RunOptions::quiet().fail_fast(),
            )?;
            output
                .lines
                .first()
                .map(|l| PathBuf::from(l.trim()))
                .ok_or_else(|| Error::CommandFailed {
                    command: format!("brew --{}", name),
                    code: output.code,
                })
        };
        let prefix = value("prefix")?;
        let repository = value("repository")?;
        let cache = value("cache")?;

        let has_mas = runner
            .run(&argv(&["which", "mas"]), &RunOptions::quiet())?
            .success();

        debug!(
            "Homebrew at {} (prefix {}, repository {}, cache {}), mas: {}",
            brew,
            prefix.display(),
            repository.display(),
            cache.display(),
            has_mas
        );
        Ok(Self {
            brew,
            prefix,
            repository,
            cache,
            has_mas,
        })
    }

    /// Where installed casks keep their versions
    pub fn caskroom(&self) -> PathBuf {
        self.prefix.join("Caskroom")
    }

    /// Fail unless the App Store CLI is available
    pub fn require_mas(&self) -> Result<()> {
        if self.has_mas {
            Ok(())
        } else {
            Err(Error::EnvironmentMissing {
                tool: "mas".to_string(),
                remedy: "brew install mas".to_string(),
            })
        }
    }
}

/// Queries Homebrew, `mas` and the application directories
pub struct BrewProbe<'a> {
    runner: &'a dyn CommandRunner,
    env: &'a BrewEnvironment,
    app_dirs: Vec<PathBuf>,
}

impl<'a> BrewProbe<'a> {
    pub fn new(runner: &'a dyn CommandRunner, env: &'a BrewEnvironment, app_dirs: Vec<PathBuf>) -> Self {
        Self {
            runner,
            env,
            app_dirs,
        }
    }

    fn lines(&self, args: &[&str]) -> Result<Vec<String>> {
        let options = RunOptions::quiet().env("HOMEBREW_NO_AUTO_UPDATE", "1");
        let output = self.runner.run(&argv(args), &options)?;
        if !output.success() {
            return Err(Error::CommandFailed {
                command: args.join(" "),
                code: output.code,
            });
        }
        Ok(output.lines)
    }

    fn store_apps(&self) -> Result<Vec<String>> {
        if self.env.has_mas {
            let lines = self.lines(&["mas", "list"])?;
            if lines.first().map(String::as_str) == Some("No installed apps found") {
                return Ok(Vec::new());
            }
            let mut apps: Vec<String> = lines
                .iter()
                .map(|l| StoreApp::parse(l).to_identifier())
                .collect();
            apps.sort_by_key(|a| StoreApp::parse(a).sort_key());
            return Ok(apps);
        }

        info!("mas is not installed; looking for App Store receipts instead");
        let mut apps = Vec::new();
        for bundle in receipt_bundles(&self.app_dirs) {
            let path = bundle.to_string_lossy().into_owned();
            let id = match self.lines(&["mdls", "-name", "kMDItemAppStoreAdamID", "-raw", path.as_str()]) {
                Ok(lines) => lines.into_iter().next().unwrap_or_default(),
                Err(e) => {
                    warn!("Cannot read the App Store id of {}: {}", path, e);
                    continue;
                }
            };
            let name = bundle
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            apps.push(format!("{} {}", id, name).trim().to_string());
        }
        Ok(apps)
    }
}

/// Application bundles carrying an App Store receipt
fn receipt_bundles(app_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut bundles = Vec::new();
    for dir in app_dirs {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.join("Contents/_MASReceipt/receipt").is_file() {
                bundles.push(path);
            }
        }
    }
    bundles.sort();
    bundles
}

impl StateProbe for BrewProbe<'_> {
    fn query(&self, domain: Domain) -> Result<Vec<String>> {
        match domain {
            Domain::Package => self.lines(&["brew", "list", "--formula"]),
            Domain::Repository => self.lines(&["brew", "tap"]),
            Domain::GuiPackage => Ok(self
                .lines(&["brew", "list", "--cask"])?
                .into_iter()
                .filter(|l| !CASK_LIST_NOISE.iter().any(|n| l.contains(n)))
                .collect()),
            Domain::StoreApp => self.store_apps(),
            _ => Ok(Vec::new()),
        }
    }

    fn info(&self, target: InfoTarget<'_>) -> Result<BTreeMap<String, FormulaInfo>> {
        let name = match target {
            InfoTarget::Installed => "--installed",
            InfoTarget::Package(name) => name,
        };
        let options = RunOptions::quiet()
            .fail_fast()
            .env("HOMEBREW_NO_AUTO_UPDATE", "1");
        let output = self
            .runner
            .run(&argv(&["brew", "info", "--json=v1", name]), &options)?;
        parse_info(&output.lines.join("\n"))
    }

    fn leaves(&self) -> Result<Vec<String>> {
        Ok(self
            .lines(&["brew", "leaves"])?
            .iter()
            .map(|l| crate::repository::basename(l.trim()).to_string())
            .collect())
    }

    fn linked_version(&self, name: &str) -> Option<String> {
        let link = fs::read_link(self.env.prefix.join("opt").join(name)).ok()?;
        link.file_name().map(|v| v.to_string_lossy().into_owned())
    }
}

/// Bundle path of an application in the first directory that has it
pub fn find_bundle(app_dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    app_dirs
        .iter()
        .map(|d| d.join(format!("{}.app", name)))
        .find(|p| p.exists())
        .or_else(|| {
            warn!("{}.app was not found in the application directories", name);
            None
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::traits::CommandOutput;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Runner answering from a table of canned outputs
    struct ScriptedRunner {
        responses: Vec<(String, CommandOutput)>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(responses: &[(&str, i32, &[&str])]) -> Self {
            Self {
                responses: responses
                    .iter()
                    .map(|(cmd, code, lines)| {
                        (
                            cmd.to_string(),
                            CommandOutput {
                                code: *code,
                                lines: lines.iter().map(|l| l.to_string()).collect(),
                            },
                        )
                    })
                    .collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, argv: &[String], _options: &RunOptions) -> Result<CommandOutput> {
            let command = argv.join(" ");
            self.calls.borrow_mut().push(command.clone());
            Ok(self
                .responses
                .iter()
                .find(|(c, _)| *c == command)
                .map(|(_, o)| o.clone())
                .unwrap_or(CommandOutput {
                    code: 1,
                    lines: Vec::new(),
                }))
        }
    }

    fn create_test_env(has_mas: bool) -> BrewEnvironment {
        BrewEnvironment {
            brew: "brew".to_string(),
            prefix: PathBuf::from("/opt/homebrew"),
            repository: PathBuf::from("/opt/homebrew"),
            cache: PathBuf::from("/tmp/cache"),
            has_mas,
        }
    }

    #[test]
    fn test_detect_missing_brew() {
        let runner = ScriptedRunner::new(&[]);
        let err = BrewEnvironment::detect(&runner).unwrap_err();
        assert!(matches!(err, Error::EnvironmentMissing { .. }));
        assert!(err.to_string().contains("curl -fsSL"));
    }

    #[test]
    fn test_detect_reads_locations() {
        let runner = ScriptedRunner::new(&[
            ("which brew", 0, &["/opt/homebrew/bin/brew"]),
            ("/opt/homebrew/bin/brew --prefix", 0, &["/opt/homebrew"]),
            ("/opt/homebrew/bin/brew --repository", 0, &["/opt/homebrew"]),
            ("/opt/homebrew/bin/brew --cache", 0, &["/Users/me/Library/Caches/Homebrew"]),
        ]);
        let env = BrewEnvironment::detect(&runner).unwrap();
        assert_eq!(env.caskroom(), PathBuf::from("/opt/homebrew/Caskroom"));
        assert!(!env.has_mas);
        assert!(env.require_mas().is_err());
    }

    #[test]
    fn test_cask_list_filters_noise() {
        let runner = ScriptedRunner::new(&[(
            "brew list --cask",
            0,
            &["firefox", "==> Casks", "old-app (!)", "Warning: nothing to list"],
        )]);
        let env = create_test_env(false);
        let probe = BrewProbe::new(&runner, &env, Vec::new());

        let casks = probe.query(Domain::GuiPackage).unwrap();
        assert_eq!(casks, vec!["firefox", "old-app (!)"]);
    }

    #[test]
    fn test_mas_list_sorted_by_name() {
        let runner = ScriptedRunner::new(&[(
            "mas list",
            0,
            &["497799835 Xcode (15.2)", "409183694 Keynote (13.1)"],
        )]);
        let env = create_test_env(true);
        let probe = BrewProbe::new(&runner, &env, Vec::new());

        assert_eq!(
            probe.query(Domain::StoreApp).unwrap(),
            vec!["409183694 Keynote", "497799835 Xcode"]
        );
    }

    #[test]
    fn test_mas_list_empty_message() {
        let runner = ScriptedRunner::new(&[("mas list", 0, &["No installed apps found"])]);
        let env = create_test_env(true);
        let probe = BrewProbe::new(&runner, &env, Vec::new());
        assert!(probe.query(Domain::StoreApp).unwrap().is_empty());
    }

    #[test]
    fn test_receipt_scan_without_mas() {
        let apps = TempDir::new().unwrap();
        let bundle = apps.path().join("Pages.app");
        fs::create_dir_all(bundle.join("Contents/_MASReceipt")).unwrap();
        fs::write(bundle.join("Contents/_MASReceipt/receipt"), "").unwrap();
        fs::create_dir_all(apps.path().join("Other.app/Contents")).unwrap();

        let mdls = format!(
            "mdls -name kMDItemAppStoreAdamID -raw {}",
            bundle.display()
        );
        let runner = ScriptedRunner::new(&[(mdls.as_str(), 0, &["409201541"])]);
        let env = create_test_env(false);
        let probe = BrewProbe::new(&runner, &env, vec![apps.path().to_path_buf()]);

        assert_eq!(
            probe.query(Domain::StoreApp).unwrap(),
            vec!["409201541 Pages"]
        );
    }

    #[test]
    fn test_receipt_scan_skips_unreadable_app() {
        let apps = TempDir::new().unwrap();
        for name in ["Keynote.app", "Pages.app"] {
            let receipt = apps.path().join(name).join("Contents/_MASReceipt");
            fs::create_dir_all(&receipt).unwrap();
            fs::write(receipt.join("receipt"), "").unwrap();
        }

        // Only Pages answers; the Keynote lookup exits non-zero
        let mdls = format!(
            "mdls -name kMDItemAppStoreAdamID -raw {}",
            apps.path().join("Pages.app").display()
        );
        let runner = ScriptedRunner::new(&[(mdls.as_str(), 0, &["409201541"])]);
        let env = create_test_env(false);
        let probe = BrewProbe::new(&runner, &env, vec![apps.path().to_path_buf()]);

        assert_eq!(
            probe.query(Domain::StoreApp).unwrap(),
            vec!["409201541 Pages"]
        );
        assert_eq!(runner.calls.borrow().len(), 2);
    }

    #[test]
    fn test_leaves_strip_tap_prefix() {
        let runner = ScriptedRunner::new(&[("brew leaves", 0, &["git", "user/tools/thing"])]);
        let env = create_test_env(false);
        let probe = BrewProbe::new(&runner, &env, Vec::new());
        assert_eq!(probe.leaves().unwrap(), vec!["git", "thing"]);
    }

    #[test]
    fn test_failed_query_is_error() {
        let runner = ScriptedRunner::new(&[]);
        let env = create_test_env(false);
        let probe = BrewProbe::new(&runner, &env, Vec::new());
        assert!(probe.query(Domain::Package).is_err());
        assert!(probe.query(Domain::RawCommand).unwrap().is_empty());
        assert_eq!(runner.calls.borrow().len(), 1);
    }
}
