// src/appmatch/report.rs

//! The `Caskfile` report

use super::casks::CaskCatalog;
use super::{AppClass, AppRecord};
use crate::error::Result;
use crate::output::Tee;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Everything found by one matching pass
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub records: Vec<AppRecord>,
    pub catalog: CaskCatalog,
    /// Taps that have cask definitions
    pub taps: Vec<String>,
    pub cask_repo: String,
    pub app_dirs: Vec<PathBuf>,
}

/// Path with the home directory shortened to `~`
pub fn display_path(path: &Path) -> String {
    let text = path.to_string_lossy().into_owned();
    match dirs::home_dir() {
        Some(home) if !home.as_os_str().is_empty() => match path.strip_prefix(&home) {
            Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
            Ok(rest) => format!("~/{}", rest.display()),
            Err(_) => text,
        },
        _ => text,
    }
}

impl MatchReport {
    fn of_class(&self, class: AppClass) -> impl Iterator<Item = &AppRecord> {
        self.records.iter().filter(move |r| r.class == class)
    }

    /// Number of applications of `class` found in `dir`
    pub fn tally(&self, class: AppClass, dir: &Path) -> usize {
        self.of_class(class).filter(|r| r.dir == dir).count()
    }

    /// Render the report
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Cask applications");
        let _ = writeln!(
            out,
            "# Please copy these lines to your Brewfile and use with `brew-file install`.\n"
        );
        let _ = writeln!(out, "# Main tap repository for {}", self.cask_repo);
        let _ = writeln!(out, "tap {}\n", self.cask_repo);

        let mut written: Vec<String> = Vec::new();
        let taps = std::iter::once(self.cask_repo.as_str()).chain(
            self.taps
                .iter()
                .map(String::as_str)
                .filter(|t| *t != self.cask_repo),
        );
        for tap in taps {
            if tap != self.cask_repo {
                let _ = writeln!(out, "# Casks in {}", tap);
                let _ = writeln!(out, "tap {}\n", tap);
            }
            self.render_tap(&mut out, tap, &mut written);
        }

        let brew: Vec<&AppRecord> = self.of_class(AppClass::Brew).collect();
        if !brew.is_empty() {
            let _ = writeln!(out, "# Apps installed by brew install command");
            for record in brew {
                let token = record.token().unwrap_or_default();
                let package = if record.options.is_empty() {
                    token.to_string()
                } else {
                    format!("{} {}", token, record.options)
                };
                let _ = writeln!(out, "brew {} # {}", package, display_path(&record.path()));
            }
            out.push('\n');
        }

        let mut store: Vec<&AppRecord> = self.of_class(AppClass::AppStore).collect();
        if !store.is_empty() {
            store.sort_by_key(|r| {
                r.store_app
                    .as_ref()
                    .map(|a| a.sort_key())
                    .unwrap_or_default()
            });
            let _ = writeln!(out, "# Apps installed from AppStore");
            for record in store {
                let path = display_path(&record.path());
                match record.store_app.as_ref().filter(|a| a.id.is_some()) {
                    Some(app) => {
                        let _ = writeln!(out, "appstore {} # {}", app.to_identifier(), path);
                    }
                    None => {
                        let _ = writeln!(out, "#appstore # {}", path);
                    }
                }
            }
            out.push('\n');
        }

        let unknown: Vec<&AppRecord> = self.of_class(AppClass::NoCask).collect();
        if !unknown.is_empty() {
            let _ = writeln!(out, "# Apps installed but no casks are available");
            let _ = writeln!(out, "# (System applications or directory installed.)");
            for record in unknown {
                let _ = writeln!(out, "# {}", display_path(&record.path()));
            }
        }
        out
    }

    fn render_tap(&self, out: &mut String, tap: &str, written: &mut Vec<String>) {
        let mut installed: Vec<(&str, String)> = self
            .of_class(AppClass::Cask)
            .filter(|r| r.candidates.first().is_some_and(|c| c.tap == tap))
            .map(|r| (r.token().unwrap_or_default(), display_path(&r.path())))
            .collect();
        installed.sort();
        if !installed.is_empty() {
            let _ = writeln!(out, "# Apps installed by Cask in {}", tap);
            for (token, path) in installed {
                if written.iter().any(|w| w == token) {
                    let _ = writeln!(out, "#cask {} # {}", token, path);
                } else {
                    let _ = writeln!(out, "cask {} # {}", token, path);
                    written.push(token.to_string());
                }
            }
            out.push('\n');
        }

        let unfound = self.catalog.unfound(tap);
        if !unfound.is_empty() {
            let _ = writeln!(
                out,
                "# Cask is found, but no applications are found (could be fonts, system settings, or installed in other directory.)"
            );
            for cask in unfound.iter().filter(|c| c.installed) {
                if !written.contains(&cask.token) {
                    let _ = writeln!(out, "cask {}", cask.token);
                    written.push(cask.token.clone());
                }
            }
            let outdated: Vec<&str> = unfound
                .iter()
                .filter(|c| !c.installed)
                .map(|c| c.token.as_str())
                .collect();
            if !outdated.is_empty() {
                let _ = writeln!(out, "\n# There are new version for following applications.");
                for token in outdated {
                    if !written.iter().any(|w| w == token) {
                        let _ = writeln!(out, "cask {}", token);
                        written.push(token.to_string());
                    }
                }
            }
            out.push('\n');
        }

        let mut direct: Vec<(&str, String)> = Vec::new();
        for record in self.of_class(AppClass::HasCask) {
            for candidate in record.candidates.iter().filter(|c| c.tap == tap) {
                direct.push((candidate.token.as_str(), display_path(&record.path())));
            }
        }
        direct.sort();
        if !direct.is_empty() {
            let _ = writeln!(out, "# Apps installed directly instead of by Cask in {}", tap);
            for (token, path) in direct {
                let _ = writeln!(out, "#cask {} # {}", token, path);
            }
            out.push('\n');
        }
    }

    /// Per-directory tallies
    pub fn summary(&self) -> String {
        let dirs: Vec<String> = self.app_dirs.iter().map(|d| display_path(d)).collect();
        let width = dirs.iter().map(String::len).max().unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(out, "Total: {} apps have been checked.", self.records.len());
        let _ = writeln!(out, "Apps in [{}]\n", dirs.join(", "));
        for class in AppClass::ALL {
            let counts: Vec<(&String, usize)> = self
                .app_dirs
                .iter()
                .zip(&dirs)
                .map(|(dir, shown)| (shown, self.tally(class, dir)))
                .filter(|(_, n)| *n > 0)
                .collect();
            if counts.is_empty() {
                continue;
            }
            let title = match class {
                AppClass::Cask => "Installed by Cask:",
                AppClass::Brew => "Installed by brew install command:",
                AppClass::HasCask => "Installed directly, but casks are available:",
                AppClass::AppStore => "Installed from App Store:",
                AppClass::NoCask => "No casks:",
            };
            let _ = writeln!(out, "{}", title);
            for (shown, n) in counts {
                let _ = writeln!(out, "{:<width$} : {}", shown, n, width = width);
            }
            out.push('\n');
        }
        out
    }

    /// Write the report to `path`, echoing it when `echo` is set
    pub fn write(&self, path: &Path, echo: bool) -> Result<()> {
        let mut tee = Tee::new(Some(path), echo);
        tee.write(&self.render());
        tee.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appmatch::{CaskDefinition, Proposal};
    use crate::manifest::StoreApp;
    use std::fs;
    use tempfile::TempDir;

    fn record(dir: &str, bundle: &str, class: AppClass, candidates: &[(&str, &str)]) -> AppRecord {
        AppRecord {
            dir: PathBuf::from(dir),
            bundle: bundle.to_string(),
            class,
            candidates: candidates
                .iter()
                .map(|(token, tap)| Proposal {
                    token: token.to_string(),
                    tap: tap.to_string(),
                })
                .collect(),
            store_app: None,
            options: String::new(),
        }
    }

    fn create_test_report() -> MatchReport {
        let mut keynote = record("/Applications", "Keynote.app", AppClass::AppStore, &[]);
        keynote.store_app = Some(StoreApp::parse("409183694 Keynote (12.0)"));
        let mut macvim = record("/Applications", "MacVim.app", AppClass::Brew, &[("macvim", "")]);
        macvim.options = "--HEAD".to_string();

        let font = CaskDefinition {
            token: "font-fira".to_string(),
            tap: "homebrew/cask".to_string(),
            listed: true,
            installed: true,
            bundles: Vec::new(),
            found: false,
        };

        MatchReport {
            records: vec![
                record("/Applications", "Firefox.app", AppClass::Cask, &[("firefox", "homebrew/cask")]),
                record("/Applications", "Viewer.app", AppClass::Cask, &[("viewer", "user/apps")]),
                record("/Applications", "Slack.app", AppClass::HasCask, &[("slack", "homebrew/cask")]),
                keynote,
                macvim,
                record("/opt/apps", "Tool.app", AppClass::NoCask, &[]),
            ],
            catalog: CaskCatalog::from_definitions(vec![font]),
            taps: vec!["homebrew/cask".to_string(), "user/apps".to_string()],
            cask_repo: "homebrew/cask".to_string(),
            app_dirs: vec![PathBuf::from("/Applications"), PathBuf::from("/opt/apps")],
        }
    }

    #[test]
    fn test_render_sections() {
        let text = create_test_report().render();
        let expected = "\
# Cask applications
# Please copy these lines to your Brewfile and use with `brew-file install`.

# Main tap repository for homebrew/cask
tap homebrew/cask

# Apps installed by Cask in homebrew/cask
cask firefox # /Applications/Firefox.app

# Cask is found, but no applications are found (could be fonts, system settings, or installed in other directory.)
cask font-fira

# Apps installed directly instead of by Cask in homebrew/cask
#cask slack # /Applications/Slack.app

# Casks in user/apps
tap user/apps

# Apps installed by Cask in user/apps
cask viewer # /Applications/Viewer.app

# Apps installed by brew install command
brew macvim --HEAD # /Applications/MacVim.app

# Apps installed from AppStore
appstore 409183694 Keynote # /Applications/Keynote.app

# Apps installed but no casks are available
# (System applications or directory installed.)
# /opt/apps/Tool.app
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_summary_tallies() {
        let report = create_test_report();
        assert_eq!(report.tally(AppClass::Cask, Path::new("/Applications")), 2);
        assert_eq!(report.tally(AppClass::NoCask, Path::new("/opt/apps")), 1);

        let summary = report.summary();
        assert!(summary.starts_with("Total: 6 apps have been checked.\n"));
        assert!(summary.contains("Installed by Cask:\n/Applications : 2\n"));
        assert!(summary.contains("No casks:\n/opt/apps     : 1\n"));
    }

    #[test]
    fn test_write_caskfile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Caskfile");
        let report = create_test_report();
        report.write(&path, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), report.render());
    }

    #[test]
    fn test_display_path_shortens_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(display_path(&home.join("Applications/A.app")), "~/Applications/A.app");
        assert_eq!(display_path(Path::new("/opt/x")), "/opt/x");
    }
}
