// src/manifest/document.rs

//! One physical manifest file

use super::dialect::{self, Dialect, Parsed, Section};
use super::entry::{Domain, EntrySet, StoreApp};
use crate::error::Result;
use crate::output::Tee;
use crate::repository::{self, RepositoryIndex, DIRECT_TAP};
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings that shape a written manifest
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub dialect: Dialect,
    pub cask_repo: String,
    /// Omit packages entirely
    pub cask_only: bool,
    /// Write the store-app section
    pub store_apps: bool,
    /// Echo written text to stdout
    pub echo: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::Plain,
            cask_repo: crate::config::DEFAULT_CASK_REPO.to_string(),
            cask_only: false,
            store_apps: true,
            echo: false,
        }
    }
}

/// A manifest file with its declared (as read) and current (working) entries
#[derive(Debug, Clone)]
pub struct ManifestDocument {
    path: PathBuf,
    exists: bool,
    pub declared: EntrySet,
    pub current: EntrySet,
}

impl ManifestDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            declared: EntrySet::default(),
            current: EntrySet::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file was present at the last read
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Directory that relative includes are resolved against
    pub fn dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// Fill `declared` from the file and reset `current`
    ///
    /// A missing file yields an empty state. A present file always declares
    /// the `direct` pseudo tap.
    pub fn read(
        &mut self,
        index: &dyn RepositoryIndex,
        detected: &mut Option<Dialect>,
    ) -> Result<()> {
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                self.exists = true;
                self.parse(&text, index, detected);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Manifest {} does not exist", self.path.display());
                self.exists = false;
                self.declared = EntrySet::default();
                self.reset();
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Parse manifest text into `declared` and reset `current`
    pub fn parse(
        &mut self,
        text: &str,
        index: &dyn RepositoryIndex,
        detected: &mut Option<Dialect>,
    ) {
        let mut declared = EntrySet::default();
        declared.insert(Domain::Repository, DIRECT_TAP, "");

        // Hook sections depend on this document's own dialect
        let mut local = dialect::detect_dialect(text).or(*detected);
        let mut section = Section::Body;
        let mut ignoring = false;

        for line in text.lines() {
            let trimmed = line.trim();
            match dialect::ignore_marker(trimmed) {
                Some(true) => ignoring = true,
                Some(false) => {
                    ignoring = false;
                    continue;
                }
                None => {}
            }
            if ignoring {
                continue;
            }
            if trimmed.is_empty() {
                section = Section::Body;
                continue;
            }

            match dialect::parse_line(trimmed, section, &mut local) {
                Parsed::Skip => {}
                Parsed::Section(next) => section = next,
                Parsed::Entry {
                    domain,
                    identifier,
                    options,
                } => declared.insert(domain, &identifier, &options),
                Parsed::Primary(file) => {
                    declared.insert(Domain::IncludedFile, &file, "");
                    if !declared.primary_files.contains(&file) {
                        declared.primary_files.push(file);
                    }
                }
                Parsed::TapAll(tap) => {
                    declared.insert(Domain::Repository, &tap, "");
                    for package in index.packages(&tap) {
                        declared.insert(Domain::Package, &package, "");
                    }
                    for cask in index.gui_packages(&tap) {
                        declared.insert(Domain::GuiPackage, &cask, "");
                    }
                }
                Parsed::Orphan(cask) => declared.add_orphan(&cask),
            }
        }

        if detected.is_none() {
            *detected = local;
        }
        self.declared = declared;
        self.reset();
    }

    /// Discard working changes
    pub fn reset(&mut self) {
        self.current = self.declared.clone();
    }

    /// Serialize `current`
    ///
    /// Output is sorted and independent of declaration order, so rendering
    /// the result of a read reproduces it.
    pub fn render(&self, options: &WriteOptions, index: &dyn RepositoryIndex) -> String {
        let d = options.dialect;
        let set = &self.current;

        let mut packages: Vec<(String, String)> = set
            .entries(Domain::Package)
            .into_iter()
            .map(|e| (e.identifier, e.options))
            .collect();
        packages.sort();
        let mut casks = set.identifiers(Domain::GuiPackage);
        casks.sort();
        let mut orphans = set.orphan_gui_packages.clone();
        orphans.sort();
        let mut store_apps = set.identifiers(Domain::StoreApp);
        store_apps.sort_by_key(|a| StoreApp::parse(a).sort_key());
        let mut primaries = set.primary_files.clone();
        primaries.sort();
        let mut files = set.identifiers(Domain::IncludedFile);
        files.sort();
        let taps = repository::sort_taps(&set.identifiers(Domain::Repository), &options.cask_repo);

        let mut out = String::new();

        let before = set.identifiers(Domain::BeforeCommand);
        if !before.is_empty() {
            out.push_str(dialect::BANNER_BEFORE);
            out.push('\n');
            for command in &before {
                let _ = writeln!(out, "{}", d.before_line(command));
            }
        }

        let mut first = true;
        for tap in &taps {
            let direct = tap == DIRECT_TAP;
            let tap_packages = index.packages(tap);
            if direct && tap_packages.is_empty() {
                continue;
            }
            let mut tap_written = false;
            let mut open_tap = |out: &mut String, first: &mut bool| {
                if *first {
                    let _ = write!(out, "\n{}\n", dialect::BANNER_TAPS);
                    *first = false;
                }
                if !direct && !tap_written {
                    let _ = write!(out, "\n{}\n", d.tap_line(tap));
                    tap_written = true;
                }
            };

            if !options.cask_only {
                open_tap(&mut out, &mut first);
                let mut direct_header = direct;
                packages.retain(|(name, opts)| {
                    if !tap_packages.iter().any(|p| p == repository::basename(name)) {
                        return true;
                    }
                    if direct_header {
                        let _ = write!(out, "\n{}\n", dialect::BANNER_DIRECT);
                        direct_header = false;
                    }
                    let _ = writeln!(out, "{}", d.package_line(name, opts));
                    false
                });
            }

            let tap_casks = index.gui_packages(tap);
            casks.retain(|cask| {
                if !tap_casks.contains(cask) {
                    return true;
                }
                open_tap(&mut out, &mut first);
                let _ = writeln!(out, "{}", d.cask_line(cask));
                false
            });
        }

        if !options.cask_only && !packages.is_empty() {
            let _ = write!(out, "\n{}\n", dialect::BANNER_PACKAGES);
            for (name, opts) in &packages {
                let _ = writeln!(out, "{}", d.package_line(name, opts));
            }
        }

        if !casks.is_empty() {
            let _ = write!(out, "\n{}\n", dialect::BANNER_CASKS);
            for cask in &casks {
                let _ = writeln!(out, "{}", d.cask_line(cask));
            }
        }

        if !orphans.is_empty() {
            let _ = write!(out, "\n{}\n\n", dialect::BANNER_ORPHANS);
            for cask in &orphans {
                let _ = writeln!(out, "{}", d.orphan_cask_line(cask));
            }
        }

        if options.store_apps && !store_apps.is_empty() {
            let _ = write!(out, "\n{}\n", dialect::BANNER_STORE_APPS);
            for app in &store_apps {
                let _ = writeln!(out, "{}", d.store_app_line(app));
            }
        }

        if !primaries.is_empty() {
            let _ = write!(out, "\n{}\n", dialect::BANNER_MAIN);
            for file in &primaries {
                let _ = writeln!(out, "{}", d.main_line(file));
            }
        }

        let others: Vec<&String> = files.iter().filter(|f| !primaries.contains(f)).collect();
        if !others.is_empty() {
            let _ = write!(out, "\n{}\n", dialect::BANNER_FILES);
            for file in others {
                let _ = writeln!(out, "{}", d.file_line(file));
            }
        }

        let raw = set.identifiers(Domain::RawCommand);
        if !raw.is_empty() {
            let _ = write!(out, "\n{}\n", dialect::BANNER_COMMANDS);
            for command in &raw {
                let _ = writeln!(out, "{}", command);
            }
        }

        let after = set.identifiers(Domain::AfterCommand);
        if !after.is_empty() {
            let _ = write!(out, "\n{}\n", dialect::BANNER_AFTER);
            for command in &after {
                let _ = writeln!(out, "{}", d.after_line(command));
            }
        }

        if out.is_empty() {
            return out;
        }
        format!("{}{}", d.preamble(), out)
    }

    /// Write `current` to the file; returns `false` when there was nothing to write
    pub fn write(&self, options: &WriteOptions, index: &dyn RepositoryIndex) -> Result<bool> {
        let text = self.render(options, index);
        if text.is_empty() {
            debug!("Nothing to write for {}", self.path.display());
            return Ok(false);
        }

        let mut tee = Tee::new(Some(&self.path), options.echo);
        tee.write(&text);
        tee.close()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(
                &self.path,
                fs::Permissions::from_mode(options.dialect.file_mode()),
            )?;
        }
        Ok(true)
    }
}
