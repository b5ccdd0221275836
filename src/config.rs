// src/config.rs

//! Runtime configuration
//!
//! A single [`Config`] value is built by the binary from command-line flags
//! (most of which fall back to `HOMEBREW_BREWFILE_*` environment variables)
//! and passed by reference into every component.

use crate::error::{Error, Result};
use crate::manifest::Dialect;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default tap holding cask definitions
pub const DEFAULT_CASK_REPO: &str = "homebrew/cask";

/// How much the tool manages App Store applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreAppLevel {
    /// Store apps are neither queried nor written
    Off,
    /// Store apps are queried, installed, cleaned and written
    #[default]
    Manage,
    /// Installed apps are checked, but newly found ones are not declared
    DetectOnly,
}

impl StoreAppLevel {
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            0 => Ok(StoreAppLevel::Off),
            1 => Ok(StoreAppLevel::Manage),
            2 => Ok(StoreAppLevel::DetectOnly),
            _ => Err(Error::InvalidConfig(format!(
                "App Store check level must be 0, 1 or 2, got {}",
                level
            ))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != StoreAppLevel::Off
    }
}

/// Which installed packages are recorded during initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageSelection {
    All,
    Leaves,
    OnRequest,
}

/// Options shared by every operation
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub backup: Option<PathBuf>,
    /// Dialect override; `None` uses the detected one
    pub dialect: Option<Dialect>,
    pub leaves: bool,
    pub on_request: bool,
    /// Packages always recorded, even when filtered out by `leaves`/`on_request`
    pub top_packages: Vec<String>,
    pub cask_only: bool,
    pub dry_run: bool,
    pub verbosity: u8,
    pub yes: bool,
    pub app_dirs: Vec<PathBuf>,
    pub store_apps: StoreAppLevel,
    pub cask_repo: String,
    /// Replay `ln -s` lines printed by installs
    pub link: bool,
    /// Run `brew update`/`brew upgrade` during `update`
    pub upgrade: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: default_input_path(),
            backup: None,
            dialect: None,
            leaves: false,
            on_request: false,
            top_packages: Vec::new(),
            cask_only: false,
            dry_run: true,
            verbosity: 1,
            yes: false,
            app_dirs: Vec::new(),
            store_apps: StoreAppLevel::default(),
            cask_repo: DEFAULT_CASK_REPO.to_string(),
            link: true,
            upgrade: true,
        }
    }
}

impl Config {
    /// `on_request` takes priority over `leaves`
    pub fn package_selection(&self) -> PackageSelection {
        if self.on_request {
            PackageSelection::OnRequest
        } else if self.leaves {
            PackageSelection::Leaves
        } else {
            PackageSelection::All
        }
    }
}

/// Split a comma-separated package list, dropping empty items
pub fn parse_top_packages(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// `~/.config/brewfile/Brewfile`, or `~/.brewfile/Brewfile` when only that exists
pub fn default_input_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let config = home.join(".config/brewfile/Brewfile");
    let legacy = home.join(".brewfile/Brewfile");
    if !config.is_file() && legacy.is_file() {
        legacy
    } else {
        config
    }
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references
///
/// Unset variables expand to the empty string; `\$` keeps a literal dollar.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut expanded = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'$') => {
                chars.next();
                expanded.push('$');
            }
            '$' => {
                let mut name = String::new();
                if chars.peek() == Some(&'{') {
                    chars.next();
                    for c in chars.by_ref() {
                        if c == '}' {
                            break;
                        }
                        name.push(c);
                    }
                } else {
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
                if name.is_empty() {
                    expanded.push('$');
                } else {
                    expanded.push_str(&std::env::var(&name).unwrap_or_default());
                }
            }
            _ => expanded.push(c),
        }
    }

    if expanded == "~" || expanded.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(expanded.trim_start_matches('~').trim_start_matches('/'));
        }
    }
    PathBuf::from(expanded)
}

/// Parse `--flag` / `--key=value` pairs such as `HOMEBREW_CASK_OPTS`
///
/// Pairs with more than one `=` are ignored. Returns `None` when nothing
/// usable is found in a non-empty value.
pub fn parse_env_opts(value: &str) -> Option<BTreeMap<String, String>> {
    let opts: BTreeMap<String, String> = value
        .split_whitespace()
        .filter(|pair| pair.matches('=').count() < 2)
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.to_lowercase(), value.to_string())
        })
        .collect();

    if opts.is_empty() && !value.trim().is_empty() {
        None
    } else {
        Some(opts)
    }
}

/// Directories searched for application bundles
///
/// `/Applications`, `~/Applications`, the cask `--appdir`, every extra
/// directory, and the `Utilities` folder of each, keeping only existing ones.
pub fn application_dirs(cask_opts: Option<&str>, extra: &[PathBuf]) -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let mut base = vec![PathBuf::from("/Applications"), home.join("Applications")];

    if let Some(value) = cask_opts {
        match parse_env_opts(value) {
            Some(opts) => {
                if let Some(appdir) = opts.get("--appdir").filter(|d| !d.is_empty()) {
                    base.push(expand_path(appdir.trim_end_matches('/')));
                }
            }
            None => warn!(
                "HOMEBREW_CASK_OPTS: \"{}\" is not a proper format. Ignoring the value.",
                value
            ),
        }
    }
    base.extend(extra.iter().cloned());

    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in &base {
        if !dirs.contains(dir) {
            dirs.push(dir.clone());
        }
    }
    let utilities: Vec<PathBuf> = dirs.iter().map(|d| d.join("Utilities")).collect();
    dirs.extend(utilities);
    dirs.retain(|d| Path::new(d).is_dir());
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_app_level_from_level() {
        assert_eq!(StoreAppLevel::from_level(0).unwrap(), StoreAppLevel::Off);
        assert_eq!(StoreAppLevel::from_level(1).unwrap(), StoreAppLevel::Manage);
        assert_eq!(
            StoreAppLevel::from_level(2).unwrap(),
            StoreAppLevel::DetectOnly
        );
        assert!(StoreAppLevel::from_level(3).is_err());
        assert!(!StoreAppLevel::Off.is_enabled());
    }

    #[test]
    fn test_on_request_takes_priority_over_leaves() {
        let mut config = Config::default();
        assert_eq!(config.package_selection(), PackageSelection::All);

        config.leaves = true;
        assert_eq!(config.package_selection(), PackageSelection::Leaves);

        config.on_request = true;
        assert_eq!(config.package_selection(), PackageSelection::OnRequest);
    }

    #[test]
    fn test_parse_top_packages() {
        assert_eq!(parse_top_packages("go, coreutils,,"), vec!["go", "coreutils"]);
        assert!(parse_top_packages("").is_empty());
    }

    #[test]
    fn test_expand_path_variables() {
        // SAFETY: tests in this module do not read BREWFILE_TEST_DIR concurrently
        unsafe { std::env::set_var("BREWFILE_TEST_DIR", "/tmp/brewfile") };

        assert_eq!(
            expand_path("$BREWFILE_TEST_DIR/Brewfile"),
            PathBuf::from("/tmp/brewfile/Brewfile")
        );
        assert_eq!(
            expand_path("${BREWFILE_TEST_DIR}/x"),
            PathBuf::from("/tmp/brewfile/x")
        );
        assert_eq!(expand_path("a\\$b"), PathBuf::from("a$b"));
        assert_eq!(
            expand_path("$BREWFILE_TEST_UNSET_VARIABLE/x"),
            PathBuf::from("/x")
        );
    }

    #[test]
    fn test_expand_path_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_path("~/Brewfile"), home.join("Brewfile"));
        assert_eq!(expand_path("relative/file"), PathBuf::from("relative/file"));
    }

    #[test]
    fn test_parse_env_opts() {
        let opts = parse_env_opts("--appdir=/opt/apps --no-quarantine").unwrap();
        assert_eq!(opts.get("--appdir").map(String::as_str), Some("/opt/apps"));
        assert_eq!(opts.get("--no-quarantine").map(String::as_str), Some(""));

        let opts = parse_env_opts("--a=b=c").map(|o| o.len());
        assert_eq!(opts, None);
    }

    #[test]
    fn test_application_dirs_includes_existing_extra() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Utilities")).unwrap();

        let dirs = application_dirs(None, &[dir.path().to_path_buf()]);
        assert!(dirs.contains(&dir.path().to_path_buf()));
        assert!(dirs.contains(&dir.path().join("Utilities")));
        assert!(dirs.iter().all(|d| d.is_dir()));
    }
}
