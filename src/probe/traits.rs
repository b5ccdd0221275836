// src/probe/traits.rs

//! Interfaces to the machine's installed state

use crate::error::Result;
use crate::manifest::Domain;
use serde::Deserialize;
use std::collections::BTreeMap;

/// How a command is run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Collect output silently instead of streaming it to the console
    pub capture_output: bool,
    /// Include stderr lines in the collected output
    pub merge_stderr: bool,
    /// Turn a non-zero exit into [`Error::CommandFailed`](crate::Error::CommandFailed)
    pub fail_fast: bool,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Print `$ <command>` before running
    pub echo: bool,
}

impl RunOptions {
    /// Captured, tolerant of failure: used for queries
    pub fn quiet() -> Self {
        Self {
            capture_output: true,
            ..Self::default()
        }
    }

    /// Echoed and streamed: used for actions
    pub fn loud() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    pub fn merge_stderr(mut self) -> Self {
        self.merge_stderr = true;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }
}

/// Exit code and output lines of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `-1` when the command could not be started
    pub code: i32,
    pub lines: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs external programs
pub trait CommandRunner {
    fn run(&self, argv: &[String], options: &RunOptions) -> Result<CommandOutput>;

    /// Run a shell command line
    fn shell(&self, command: &str, options: &RunOptions) -> Result<CommandOutput> {
        let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        self.run(&argv, options)
    }
}

/// Build an argument vector from string slices
pub fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// What `info` reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTarget<'a> {
    Installed,
    Package(&'a str),
}

/// One installed version from `brew info --json=v1`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InstalledVersion {
    pub version: String,
    #[serde(default)]
    pub used_options: Vec<String>,
    /// Absent in older Homebrew releases
    #[serde(default)]
    pub installed_on_request: Option<bool>,
    #[serde(default)]
    pub installed_as_dependency: Option<bool>,
}

/// Package details from `brew info --json=v1`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FormulaInfo {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub installed: Vec<InstalledVersion>,
    #[serde(default)]
    pub linked_keg: Option<String>,
    /// `stable`, `head`, `devel` versions and the `bottle` flag
    #[serde(default)]
    pub versions: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl FormulaInfo {
    /// The installed version in use
    ///
    /// `linked` overrides `linked_keg` (for kegs that are not linked but
    /// have an `opt` link). Falls back to the first installed version.
    pub fn active_install(&self, linked: Option<&str>) -> Option<&InstalledVersion> {
        let linked = linked.or(self.linked_keg.as_deref());
        linked
            .and_then(|version| {
                self.installed
                    .iter()
                    .find(|i| i.version.replace(".reinstall", "") == version)
            })
            .or_else(|| self.installed.first())
    }

    /// Options the active install was built with, as manifest options
    ///
    /// Non-stable installs add `--HEAD` or `--<kind>`.
    pub fn install_options(&self, linked: Option<&str>) -> String {
        let Some(installed) = self.active_install(linked) else {
            return String::new();
        };
        let mut options = installed.used_options.clone();
        for (kind, version) in &self.versions {
            if kind == "stable" {
                continue;
            }
            let Some(version) = version.as_str() else {
                continue;
            };
            let matches = installed.version == version
                || (kind == "head" && installed.version.starts_with("HEAD"));
            if matches {
                if kind == "head" {
                    options.push("--HEAD".to_string());
                } else {
                    options.push(format!("--{}", kind));
                }
            }
        }
        options.join(" ")
    }

    /// Unknown counts as requested
    pub fn installed_on_request(&self, linked: Option<&str>) -> bool {
        self.active_install(linked)
            .map(|i| i.installed_on_request != Some(false))
            .unwrap_or(true)
    }
}

/// Parse `brew info --json=v1` output, keyed by package name
pub fn parse_info(json: &str) -> Result<BTreeMap<String, FormulaInfo>> {
    let infos: Vec<FormulaInfo> = serde_json::from_str(json)?;
    Ok(infos.into_iter().map(|i| (i.name.clone(), i)).collect())
}

/// Installed state of the machine
///
/// Every call queries afresh; nothing is cached.
pub trait StateProbe {
    /// Installed identifiers of a domain
    ///
    /// Cask lines keep any trailing text; a line with more than one token
    /// is a cask whose definition is missing.
    fn query(&self, domain: Domain) -> Result<Vec<String>>;

    fn info(&self, target: InfoTarget<'_>) -> Result<BTreeMap<String, FormulaInfo>>;

    /// Installed packages nothing else depends on
    fn leaves(&self) -> Result<Vec<String>>;

    /// Version an unlinked keg's `opt` link points to
    fn linked_version(&self, _name: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIM_INFO: &str = r#"[
        {
            "name": "vim",
            "full_name": "vim",
            "linked_keg": "9.1.0",
            "versions": {"stable": "9.1.0", "head": "HEAD", "bottle": true},
            "dependencies": ["lua", "python@3.12"],
            "installed": [
                {"version": "9.0.0", "used_options": [], "installed_on_request": true},
                {"version": "9.1.0", "used_options": ["--with-python"], "installed_on_request": false}
            ]
        },
        {
            "name": "ctags",
            "versions": {"stable": "5.8", "head": "HEAD"},
            "installed": [{"version": "HEAD-2a1b3c", "used_options": []}]
        }
    ]"#;

    #[test]
    fn test_parse_info() {
        let info = parse_info(VIM_INFO).unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info["vim"].dependencies, vec!["lua", "python@3.12"]);
        assert!(info["ctags"].linked_keg.is_none());
    }

    #[test]
    fn test_active_install_prefers_linked_version() {
        let info = parse_info(VIM_INFO).unwrap();
        let vim = &info["vim"];
        assert_eq!(vim.active_install(None).unwrap().version, "9.1.0");
        assert_eq!(vim.active_install(Some("9.0.0")).unwrap().version, "9.0.0");
        assert_eq!(vim.install_options(None), "--with-python");
        assert!(!vim.installed_on_request(None));
        assert!(vim.installed_on_request(Some("9.0.0")));
    }

    #[test]
    fn test_head_install_options() {
        let info = parse_info(VIM_INFO).unwrap();
        let ctags = &info["ctags"];
        assert_eq!(ctags.install_options(None), "--HEAD");
        // Missing flag counts as requested
        assert!(ctags.installed_on_request(None));
    }

    #[test]
    fn test_run_options_builders() {
        let options = RunOptions::quiet().fail_fast().env("A", "1");
        assert!(options.capture_output);
        assert!(options.fail_fast);
        assert!(!options.echo);
        assert_eq!(options.env, vec![("A".to_string(), "1".to_string())]);
        assert!(RunOptions::loud().echo);
        assert!(CommandOutput::default().success());
    }
}
