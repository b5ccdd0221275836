// src/repository/mod.rs

//! Local tap index
//!
//! Homebrew keeps every tapped repository on disk. This module lists the
//! package and cask definitions a tap provides, which drives `tapall`
//! expansion, the grouping of packages under their tap when writing a
//! manifest, tap removal during cleanup, and the cask scan of the
//! application matcher.
//!
//! Lookups never fail: a tap that is not available locally provides
//! nothing.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pseudo tap for packages installed from a local definition file
pub const DIRECT_TAP: &str = "direct";

/// Tap holding the core package definitions
pub const CORE_TAP: &str = "homebrew/core";

/// Definitions provided by taps
pub trait RepositoryIndex {
    /// Package names defined by a tap, sorted
    fn packages(&self, tap: &str) -> Vec<String>;

    /// Cask tokens defined by a tap, sorted
    fn gui_packages(&self, tap: &str) -> Vec<String>;

    /// Contents of a cask definition, if the tap provides it
    fn cask_definition(&self, tap: &str, token: &str) -> Option<String>;

    /// Whether the tap has a cask directory at all
    fn has_casks(&self, tap: &str) -> bool {
        !self.gui_packages(tap).is_empty()
    }

    /// Path of a helper script shipped inside a tap
    fn tap_file(&self, _tap: &str, _relative: &str) -> Option<PathBuf> {
        None
    }
}

/// Index that knows no taps
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyIndex;

impl RepositoryIndex for EmptyIndex {
    fn packages(&self, _tap: &str) -> Vec<String> {
        Vec::new()
    }

    fn gui_packages(&self, _tap: &str) -> Vec<String> {
        Vec::new()
    }

    fn cask_definition(&self, _tap: &str, _token: &str) -> Option<String> {
        None
    }
}

/// Taps as checked out under the Homebrew repository
#[derive(Debug, Clone)]
pub struct TapDirectory {
    repository: PathBuf,
    cache: PathBuf,
}

impl TapDirectory {
    /// `repository` is `brew --repository`, `cache` is `brew --cache`
    pub fn new(repository: impl Into<PathBuf>, cache: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            cache: cache.into(),
        }
    }

    /// `direct` maps to `<cache>/Formula`, `user/repo` to
    /// `<repository>/Library/Taps/user/homebrew-repo`
    pub fn tap_path(&self, tap: &str) -> PathBuf {
        if tap == DIRECT_TAP {
            return self.cache.join("Formula");
        }
        let (user, repo) = tap.split_once('/').unwrap_or(("", tap));
        self.repository
            .join("Library/Taps")
            .join(user)
            .join(format!("homebrew-{}", repo))
    }
}

/// Names of `*.rb` files in a directory, without the extension
fn ruby_definitions(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.strip_suffix(".rb").map(str::to_string)
        })
        .collect()
}

impl RepositoryIndex for TapDirectory {
    fn packages(&self, tap: &str) -> Vec<String> {
        let path = self.tap_path(tap);
        if !path.is_dir() {
            debug!("Tap {} is not available at {}", tap, path.display());
            return Vec::new();
        }
        let mut packages = ruby_definitions(&path);
        packages.extend(ruby_definitions(&path.join("Formula")));
        packages.sort();
        packages.dedup();
        packages
    }

    fn gui_packages(&self, tap: &str) -> Vec<String> {
        let mut casks = ruby_definitions(&self.tap_path(tap).join("Casks"));
        casks.sort();
        casks
    }

    fn cask_definition(&self, tap: &str, token: &str) -> Option<String> {
        let path = self.tap_path(tap).join("Casks").join(format!("{}.rb", token));
        fs::read_to_string(path).ok()
    }

    fn has_casks(&self, tap: &str) -> bool {
        self.tap_path(tap).join("Casks").is_dir()
    }

    fn tap_file(&self, tap: &str, relative: &str) -> Option<PathBuf> {
        let path = self.tap_path(tap).join(relative);
        path.exists().then_some(path)
    }
}

/// Tap part of a fully qualified name (`user/repo/pkg` gives `user/repo`)
pub fn tap_of(name: &str) -> Option<&str> {
    let (tap, _) = name.rsplit_once('/')?;
    tap.contains('/').then_some(tap)
}

/// Last path segment of a possibly qualified name
pub fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Order taps for writing: core, other `homebrew/*` taps alphabetically,
/// the cask tap, then third-party taps alphabetically
pub fn sort_taps(taps: &[String], cask_repo: &str) -> Vec<String> {
    let mut core = Vec::new();
    let mut homebrew = Vec::new();
    let mut cask = Vec::new();
    let mut others = Vec::new();
    for tap in taps {
        if tap == CORE_TAP {
            core.push(tap.clone());
        } else if tap == cask_repo {
            cask.push(tap.clone());
        } else if tap.starts_with("homebrew/") {
            homebrew.push(tap.clone());
        } else {
            others.push(tap.clone());
        }
    }
    homebrew.sort();
    others.sort();
    core.into_iter()
        .chain(homebrew)
        .chain(cask)
        .chain(others)
        .collect()
}
