// src/reconcile/absorb.rs

//! Init: record the machine's state in the manifests

use super::Reconciler;
use crate::config::{Config, StoreAppLevel};
use crate::error::Result;
use crate::manifest::{Domain, ManifestGraph};
use crate::output::print_banner;
use std::fs;
use tracing::info;

/// Domains whose installed state is recorded
const ABSORBED: [Domain; 4] = [
    Domain::Repository,
    Domain::Package,
    Domain::GuiPackage,
    Domain::StoreApp,
];

/// Move an existing input file aside, or ask before overwriting it
///
/// Returns `false` when the user declines.
pub fn backup_input(config: &Config, confirm: &mut dyn FnMut(&str) -> bool) -> Result<bool> {
    if !config.input.exists() {
        return Ok(true);
    }
    match &config.backup {
        Some(backup) => {
            if let Some(parent) = backup.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&config.input, backup)?;
            info!("Old input file was moved to {}", backup.display());
            Ok(true)
        }
        None => {
            println!("{} is already there.", config.input.display());
            Ok(config.yes || confirm("Do you want to overwrite it?"))
        }
    }
}

impl Reconciler<'_> {
    fn absorbs(&self, domain: Domain) -> bool {
        match domain {
            Domain::Package => !self.config.cask_only,
            Domain::StoreApp => self.config.store_apps == StoreAppLevel::Manage,
            _ => true,
        }
    }

    /// Prune uninstalled entries from every member, absorb what is installed
    /// into the main member, and rewrite every member
    pub fn initialize(&self, graph: &mut ManifestGraph) -> Result<()> {
        let actual = self.actual_state(graph, false)?;

        for member in graph.members_mut() {
            member.reset();
            for domain in ABSORBED {
                if !self.absorbs(domain) {
                    continue;
                }
                for identifier in member.current.identifiers(domain) {
                    if !actual.is_installed(domain, &identifier) {
                        info!("{} {} is not installed; removing it", domain, identifier);
                        member.current.remove(domain, &identifier);
                    }
                }
            }
            member
                .current
                .orphan_gui_packages
                .retain(|c| actual.orphans.contains(c));
        }

        for domain in ABSORBED {
            if !self.absorbs(domain) {
                continue;
            }
            let mut values = actual.entries(domain);
            for kept in graph.main().current.entries(domain) {
                match values.iter_mut().find(|v| **v == kept) {
                    // Keep the declared spelling, e.g. a tap-qualified package
                    Some(value) => value.identifier = kept.identifier,
                    None => values.push(kept),
                }
            }
            graph.absorb(domain, values);
        }
        graph.absorb_orphans(actual.orphans.clone());

        let verbosity = self.config.verbosity;
        graph.write_all(&self.write_options(graph), self.index, verbosity)?;
        print_banner(
            &format!(
                "# You can check {} with:\n#     $ brew-file cat",
                graph.root().path().display()
            ),
            verbosity,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::repository::EmptyIndex;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_files(dir: &Path, files: &[(&str, &str)]) {
        for (name, content) in files {
            fs::write(dir.join(name), content).unwrap();
        }
    }

    #[test]
    fn test_initialize_absorbs_into_main_without_duplicates() {
        let dir = TempDir::new().unwrap();
        create_test_files(
            dir.path(),
            &[
                ("Brewfile", "brew git\nbrew gone\nfile extra.txt\n"),
                ("extra.txt", "brew vim\ncask firefox\n"),
            ],
        );
        let mut graph = ManifestGraph::resolve(dir.path().join("Brewfile"), &EmptyIndex).unwrap();
        let machine = FakeMachine::with_packages(&[("git", ""), ("vim", ""), ("jq", "--HEAD")]);
        machine.casks.borrow_mut().push("firefox".to_string());
        let config = create_test_config();

        let reconciler = Reconciler::new(&config, &machine, &machine, &EmptyIndex);
        reconciler.initialize(&mut graph).unwrap();

        let root = fs::read_to_string(dir.path().join("Brewfile")).unwrap();
        let extra = fs::read_to_string(dir.path().join("extra.txt")).unwrap();
        assert!(root.contains("brew git\n"));
        assert!(root.contains("brew jq --HEAD\n"));
        assert!(!root.contains("gone"));
        assert!(!root.contains("brew vim"));
        assert!(!root.contains("firefox"));
        assert!(extra.contains("brew vim\n"));
        assert!(extra.contains("cask firefox\n"));

        let reread = ManifestGraph::resolve(dir.path().join("Brewfile"), &EmptyIndex).unwrap();
        let merged = reread.merged_identifiers(Domain::Package);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_initialize_matches_tap_qualified_names() {
        let dir = TempDir::new().unwrap();
        create_test_files(
            dir.path(),
            &[
                ("Brewfile", "brew git\nbrew user/tools/lint\nfile extra.txt\n"),
                ("extra.txt", "brew user/tools/fmt\n"),
            ],
        );
        let mut graph = ManifestGraph::resolve(dir.path().join("Brewfile"), &EmptyIndex).unwrap();
        let machine = FakeMachine::with_packages(&[("git", ""), ("fmt", ""), ("lint", "")]);
        let config = create_test_config();

        let reconciler = Reconciler::new(&config, &machine, &machine, &EmptyIndex);
        reconciler.initialize(&mut graph).unwrap();

        let root = fs::read_to_string(dir.path().join("Brewfile")).unwrap();
        let extra = fs::read_to_string(dir.path().join("extra.txt")).unwrap();
        assert!(!root.contains("fmt"));
        assert!(root.contains("user/tools/lint"));
        assert!(!root.contains("brew lint"));
        assert!(extra.contains("brew user/tools/fmt\n"));

        let reread = ManifestGraph::resolve(dir.path().join("Brewfile"), &EmptyIndex).unwrap();
        assert_eq!(reread.merged_identifiers(Domain::Package).len(), 3);
    }

    #[test]
    fn test_initialize_keeps_installed_unselected_entries() {
        let dir = TempDir::new().unwrap();
        create_test_files(dir.path(), &[("Brewfile", "brew pcre\n")]);
        let mut graph = ManifestGraph::resolve(dir.path().join("Brewfile"), &EmptyIndex).unwrap();
        let mut machine = FakeMachine::with_packages(&[("git", ""), ("pcre", "")]);
        machine.leaves = vec!["git".to_string()];
        let mut config = create_test_config();
        config.leaves = true;

        let reconciler = Reconciler::new(&config, &machine, &machine, &EmptyIndex);
        reconciler.initialize(&mut graph).unwrap();

        let written = fs::read_to_string(dir.path().join("Brewfile")).unwrap();
        assert!(written.contains("brew git\n"));
        assert!(written.contains("brew pcre\n"));
    }

    #[test]
    fn test_initialize_records_orphans() {
        let dir = TempDir::new().unwrap();
        let mut graph = ManifestGraph::resolve(dir.path().join("Brewfile"), &EmptyIndex).unwrap();
        let machine = FakeMachine::default();
        machine.casks.borrow_mut().push("old-app (!)".to_string());
        let config = create_test_config();

        let reconciler = Reconciler::new(&config, &machine, &machine, &EmptyIndex);
        reconciler.initialize(&mut graph).unwrap();

        let written = fs::read_to_string(dir.path().join("Brewfile")).unwrap();
        assert!(written.contains("#cask old-app\n"));
    }

    #[test]
    fn test_backup_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("Brewfile");
        fs::write(&input, "brew git\n").unwrap();

        let mut config = create_test_config();
        config.input = input.clone();
        let mut asked = Vec::new();
        let mut decline = |q: &str| {
            asked.push(q.to_string());
            false
        };
        assert!(!backup_input(&config, &mut decline).unwrap());
        assert_eq!(asked, vec!["Do you want to overwrite it?"]);

        config.yes = true;
        assert!(backup_input(&config, &mut |_: &str| false).unwrap());

        config.backup = Some(dir.path().join("old/Brewfile.bak"));
        assert!(backup_input(&config, &mut |_: &str| false).unwrap());
        assert!(!input.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("old/Brewfile.bak")).unwrap(),
            "brew git\n"
        );
    }
}
