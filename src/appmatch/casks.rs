// src/appmatch/casks.rs

//! Cask definitions and the token oracle

use crate::error::{Error, Result};
use crate::probe::{CommandRunner, RunOptions};
use crate::repository::RepositoryIndex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper script in the cask tap that proposes a token for an app name
pub const TOKEN_SCRIPT: &str = "developer/bin/generate_cask_token";

/// One cask definition found in a tap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaskDefinition {
    pub token: String,
    pub tap: String,
    /// Reported by `brew list --cask`
    pub listed: bool,
    /// Listed, and the current version is present in the Caskroom
    pub installed: bool,
    /// Bundle names the definition installs
    pub bundles: Vec<String>,
    /// Matched to an application on disk
    pub found: bool,
}

impl CaskDefinition {
    pub fn new(token: &str, tap: &str, content: &str) -> Self {
        Self {
            token: token.to_string(),
            tap: tap.to_string(),
            listed: false,
            installed: false,
            bundles: bundle_names(content),
            found: false,
        }
    }

    fn provides(&self, bundle: &str) -> bool {
        self.bundles.iter().any(|b| b == bundle)
    }
}

/// First quoted string of `rest`, or its first bare word
fn first_value(rest: &str) -> &str {
    let rest = rest.trim();
    match rest.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let inner = &rest[1..];
            inner.split(quote).next().unwrap_or(inner)
        }
        _ => rest
            .split(|c: char| c.is_whitespace() || c == ',')
            .next()
            .unwrap_or(rest)
            .trim_start_matches(':'),
    }
}

fn last_component(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn with_app_extension(name: &str) -> String {
    if name.ends_with(".app") {
        name.to_string()
    } else {
        format!("{}.app", name)
    }
}

/// Bundle names declared by a cask definition
///
/// Per line, the first matching rule wins: a `name` stanza, an `app`
/// stanza, any `.app` token, a `pkg` stanza. Distinct results are kept in
/// order of appearance.
pub fn bundle_names(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        let name = if let Some(rest) = trimmed.strip_prefix("name ") {
            with_app_extension(first_value(rest))
        } else if let Some(rest) = trimmed.strip_prefix("app ") {
            with_app_extension(last_component(first_value(rest)))
        } else if let Some(pos) = line.find(".app") {
            let stem = last_component(&line[..pos]);
            let stem = stem.rsplit(['"', '\'']).next().unwrap_or(stem);
            with_app_extension(stem)
        } else if let Some(rest) = trimmed.strip_prefix("pkg ") {
            last_component(first_value(rest)).replace(".pkg", "")
        } else {
            continue;
        };
        if name != ".app" && !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Values of the `version` stanzas
pub fn cask_versions(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|l| l.trim_start().strip_prefix("version "))
        .map(|v| first_value(v).to_string())
        .collect()
}

/// Every cask definition of the scanned taps
#[derive(Debug, Clone, Default)]
pub struct CaskCatalog {
    casks: Vec<CaskDefinition>,
}

impl CaskCatalog {
    /// Read the definitions of `taps`
    ///
    /// `listed` is the output of `brew list --cask`; a listed cask counts as
    /// installed when `<caskroom>/<token>/<version>` exists.
    pub fn load(
        index: &dyn RepositoryIndex,
        taps: &[String],
        listed: &[String],
        caskroom: &Path,
    ) -> Self {
        let mut casks = Vec::new();
        for tap in taps {
            for token in index.gui_packages(tap) {
                let Some(content) = index.cask_definition(tap, &token) else {
                    continue;
                };
                let mut cask = CaskDefinition::new(&token, tap, &content);
                cask.listed = listed.contains(&token);
                cask.installed = cask.listed
                    && cask_versions(&content)
                        .iter()
                        .any(|v| caskroom.join(&token).join(v).is_dir());
                casks.push(cask);
            }
        }
        debug!("Loaded {} cask definitions from {} taps", casks.len(), taps.len());
        Self { casks }
    }

    pub fn from_definitions(casks: Vec<CaskDefinition>) -> Self {
        Self { casks }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaskDefinition> {
        self.casks.iter()
    }

    pub fn len(&self) -> usize {
        self.casks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.casks.is_empty()
    }

    /// The listed cask installing `bundle`; later taps take precedence
    pub fn listed_for_bundle(&self, bundle: &str) -> Option<&CaskDefinition> {
        self.casks
            .iter()
            .rev()
            .find(|c| c.listed && c.provides(bundle))
    }

    /// Every cask installing `bundle`
    pub fn providing(&self, bundle: &str) -> Vec<&CaskDefinition> {
        self.casks.iter().filter(|c| c.provides(bundle)).collect()
    }

    pub fn is_installed(&self, token: &str) -> bool {
        self.casks.iter().any(|c| c.token == token && c.installed)
    }

    pub fn mark_found(&mut self, token: &str) {
        for cask in self.casks.iter_mut().filter(|c| c.token == token) {
            cask.found = true;
        }
    }

    /// Listed casks of `tap` that no application on disk was matched to
    pub fn unfound(&self, tap: &str) -> Vec<&CaskDefinition> {
        let mut unfound: Vec<&CaskDefinition> = self
            .casks
            .iter()
            .filter(|c| c.tap == tap && c.listed && !c.found)
            .collect();
        unfound.sort_by(|a, b| a.token.cmp(&b.token));
        unfound
    }
}

/// A token proposed for an application, and the tap already defining it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub token: String,
    pub tap: String,
}

/// Proposes cask tokens for an application name
pub trait TokenOracle {
    /// Proposals for `app_name` that an existing tap already defines
    fn propose(&self, app_name: &str) -> Result<Vec<Proposal>>;
}

/// Oracle backed by the cask tap's `generate_cask_token` script
pub struct ScriptOracle<'a> {
    script: PathBuf,
    taps: Vec<String>,
    runner: &'a dyn CommandRunner,
}

impl<'a> ScriptOracle<'a> {
    /// Locate the script in `cask_repo`; the tap must be available
    pub fn locate(
        index: &dyn RepositoryIndex,
        cask_repo: &str,
        taps: Vec<String>,
        runner: &'a dyn CommandRunner,
    ) -> Result<Self> {
        let script = index.tap_file(cask_repo, TOKEN_SCRIPT).ok_or_else(|| {
            Error::RepositoryUnavailable(format!(
                "{} does not provide {}. Tap it with:\n    $ brew tap {}",
                cask_repo, TOKEN_SCRIPT, cask_repo
            ))
        })?;
        Ok(Self {
            script,
            taps,
            runner,
        })
    }
}

impl TokenOracle for ScriptOracle<'_> {
    fn propose(&self, app_name: &str) -> Result<Vec<Proposal>> {
        let argv = vec![
            self.script.to_string_lossy().into_owned(),
            app_name.to_lowercase(),
        ];
        let output = self
            .runner
            .run(&argv, &RunOptions::quiet().merge_stderr())?;
        Ok(parse_proposals(&output.lines, &self.taps))
    }
}

/// Read `generate_cask_token` output
///
/// Tokens come from `Proposed token:` lines; they count only when an
/// `already exists` line names one of `taps`.
pub fn parse_proposals(lines: &[String], taps: &[String]) -> Vec<Proposal> {
    let mut tokens = Vec::new();
    let mut existing = Vec::new();
    for line in lines {
        if line.contains("Proposed token") {
            if let Some(token) = line.split_whitespace().nth(2) {
                tokens.push(token.to_string());
            }
        }
        if line.contains("already exists") {
            let quoted = line.split('\'').nth(1).unwrap_or(line);
            let tap = taps.iter().find(|t| {
                let (user, repo) = t.split_once('/').unwrap_or(("", t));
                quoted.contains(&format!("{}/homebrew-{}", user, repo))
            });
            if let Some(tap) = tap {
                existing.push(tap.clone());
            }
        }
    }
    tokens
        .into_iter()
        .zip(existing)
        .map(|(token, tap)| Proposal { token, tap })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::CommandOutput;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    const FIREFOX: &str = r#"cask "firefox" do
  version "124.0"
  name "Mozilla Firefox"
  app "Firefox.app"
  zap trash: "~/Library/Application Support/Firefox"
end
"#;

    const DRIVER: &str = r#"cask "driver" do
  version :latest
  pkg "Installers/Driver Setup.pkg"
end
"#;

    struct FixtureIndex {
        casks: BTreeMap<String, String>,
    }

    impl RepositoryIndex for FixtureIndex {
        fn packages(&self, _tap: &str) -> Vec<String> {
            Vec::new()
        }

        fn gui_packages(&self, tap: &str) -> Vec<String> {
            if tap == "homebrew/cask" {
                self.casks.keys().cloned().collect()
            } else {
                Vec::new()
            }
        }

        fn cask_definition(&self, _tap: &str, token: &str) -> Option<String> {
            self.casks.get(token).cloned()
        }
    }

    #[test]
    fn test_bundle_names() {
        assert_eq!(
            bundle_names(FIREFOX),
            vec!["Mozilla Firefox.app", "Firefox.app"]
        );
        assert_eq!(bundle_names(DRIVER), vec!["Driver Setup"]);
        assert_eq!(
            bundle_names("  binary \"#{appdir}/Tool.app/Contents/MacOS/tool\"\n"),
            vec!["Tool.app"]
        );
    }

    #[test]
    fn test_cask_versions() {
        assert_eq!(cask_versions(FIREFOX), vec!["124.0"]);
        assert_eq!(cask_versions(DRIVER), vec!["latest"]);
    }

    #[test]
    fn test_catalog_installed_requires_caskroom_version() {
        let caskroom = TempDir::new().unwrap();
        fs::create_dir_all(caskroom.path().join("firefox/124.0")).unwrap();
        let index = FixtureIndex {
            casks: BTreeMap::from([
                ("firefox".to_string(), FIREFOX.to_string()),
                ("driver".to_string(), DRIVER.to_string()),
            ]),
        };

        let catalog = CaskCatalog::load(
            &index,
            &["homebrew/cask".to_string()],
            &["firefox".to_string(), "driver".to_string()],
            caskroom.path(),
        );
        assert_eq!(catalog.len(), 2);
        assert!(catalog.is_installed("firefox"));
        assert!(!catalog.is_installed("driver"));
        assert_eq!(
            catalog.listed_for_bundle("Firefox.app").map(|c| c.token.as_str()),
            Some("firefox")
        );
        assert_eq!(catalog.unfound("homebrew/cask").len(), 2);
    }

    #[test]
    fn test_parse_proposals() {
        let lines: Vec<String> = [
            "Proposed token:               visual-studio-code",
            "Proposed file name:           visual-studio-code.rb",
            "Warning: the token already exists at '/opt/homebrew/Library/Taps/homebrew/homebrew-cask/Casks/v/visual-studio-code.rb'",
        ]
        .iter()
        .map(|l| l.to_string())
        .collect();
        let taps = vec!["user/apps".to_string(), "homebrew/cask".to_string()];

        assert_eq!(
            parse_proposals(&lines, &taps),
            vec![Proposal {
                token: "visual-studio-code".to_string(),
                tap: "homebrew/cask".to_string(),
            }]
        );
        // A proposal no tap defines is dropped
        assert!(parse_proposals(&lines[..2], &taps).is_empty());
    }

    struct EchoRunner;

    impl CommandRunner for EchoRunner {
        fn run(&self, argv: &[String], _options: &RunOptions) -> Result<CommandOutput> {
            Ok(CommandOutput {
                code: 0,
                lines: vec![
                    format!("Proposed token: {}", argv[1]),
                    "already exists '/x/Taps/homebrew/homebrew-cask/Casks/a.rb'".to_string(),
                ],
            })
        }
    }

    #[test]
    fn test_script_oracle_requires_script() {
        let index = FixtureIndex {
            casks: BTreeMap::new(),
        };
        let result = ScriptOracle::locate(&index, "homebrew/cask", Vec::new(), &EchoRunner);
        assert!(matches!(result, Err(Error::RepositoryUnavailable(_))));

        let oracle = ScriptOracle {
            script: PathBuf::from("generate_cask_token"),
            taps: vec!["homebrew/cask".to_string()],
            runner: &EchoRunner,
        };
        let proposals = oracle.propose("Firefox.app").unwrap();
        assert_eq!(proposals[0].token, "firefox.app");
    }
}
