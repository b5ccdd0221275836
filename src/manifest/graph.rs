// src/manifest/graph.rs

//! Include graph
//!
//! The root manifest and every file it transitively includes, in depth-first
//! declaration order. One member is the *main* document: the target for
//! newly discovered entries. It is the deepest document reachable from the
//! root through includes marked `main`, or the root itself.

use super::dialect::Dialect;
use super::document::{ManifestDocument, WriteOptions};
use super::entry::{Domain, DocumentId, ManifestEntry};
use crate::config::expand_path;
use crate::error::Result;
use crate::output::print_banner;
use crate::repository::RepositoryIndex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ManifestGraph {
    members: Vec<ManifestDocument>,
    main: DocumentId,
    detected: Option<Dialect>,
}

impl ManifestGraph {
    /// Read `root` and every file it includes
    ///
    /// Each path is visited once, so include cycles and repeated includes
    /// are harmless.
    pub fn resolve(root: impl Into<PathBuf>, index: &dyn RepositoryIndex) -> Result<Self> {
        let root = root.into();
        let mut graph = Self {
            members: vec![ManifestDocument::new(&root)],
            main: DocumentId::ROOT,
            detected: None,
        };

        let mut visited = HashSet::new();
        visited.insert(visit_key(&root));
        let main = graph.visit(DocumentId::ROOT, true, &mut visited, index)?;
        graph.main = main.unwrap_or(DocumentId::ROOT);

        debug!(
            "Resolved {} manifest(s), main is {}",
            graph.members.len(),
            graph.main().path().display()
        );
        Ok(graph)
    }

    /// Read one member and descend into its includes
    ///
    /// Returns the deepest primary-chain member found below `id` when `id`
    /// itself is on the chain.
    fn visit(
        &mut self,
        id: DocumentId,
        on_chain: bool,
        visited: &mut HashSet<PathBuf>,
        index: &dyn RepositoryIndex,
    ) -> Result<Option<DocumentId>> {
        self.members[id.0].read(index, &mut self.detected)?;

        let member = &self.members[id.0];
        let includes = member.declared.identifiers(Domain::IncludedFile);
        let primaries = member.declared.primary_files.clone();
        let base = member.dir().map(Path::to_path_buf);

        let mut main = on_chain.then_some(id);
        for include in includes {
            let path = include_path(base.as_deref(), &include);
            if !visited.insert(visit_key(&path)) {
                warn!("{} is included more than once; skipping", path.display());
                continue;
            }

            let child = DocumentId(self.members.len());
            self.members.push(ManifestDocument::new(path));

            let child_on_chain = main.is_some() && primaries.contains(&include);
            if child_on_chain {
                main = Some(child);
            }
            if let Some(found) = self.visit(child, child_on_chain, visited, index)? {
                main = Some(found);
            }
        }
        Ok(main)
    }

    pub fn root(&self) -> &ManifestDocument {
        &self.members[DocumentId::ROOT.0]
    }

    pub fn main(&self) -> &ManifestDocument {
        &self.members[self.main.0]
    }

    pub fn main_id(&self) -> DocumentId {
        self.main
    }

    pub fn members(&self) -> &[ManifestDocument] {
        &self.members
    }

    pub fn member_mut(&mut self, id: DocumentId) -> &mut ManifestDocument {
        &mut self.members[id.0]
    }

    pub fn members_mut(&mut self) -> impl Iterator<Item = &mut ManifestDocument> {
        self.members.iter_mut()
    }

    /// Dialect detected while reading, if any line revealed one
    pub fn detected_dialect(&self) -> Option<Dialect> {
        self.detected
    }

    /// Paths of every member, root first
    pub fn paths(&self) -> Vec<&Path> {
        self.members.iter().map(|m| m.path()).collect()
    }

    /// Desired state of a domain across all members
    ///
    /// Later members override earlier ones on identity; each entry records
    /// the member it came from.
    pub fn merged(&self, domain: Domain) -> Vec<ManifestEntry> {
        let mut merged: Vec<ManifestEntry> = Vec::new();
        for (i, member) in self.members.iter().enumerate() {
            for mut entry in member.current.entries(domain) {
                entry.source_document = Some(DocumentId(i));
                match merged.iter_mut().find(|e| domain.is_identity() && **e == entry) {
                    Some(existing) => *existing = entry,
                    None => merged.push(entry),
                }
            }
        }
        merged
    }

    pub fn merged_identifiers(&self, domain: Domain) -> Vec<String> {
        self.merged(domain)
            .into_iter()
            .map(|e| e.identifier)
            .collect()
    }

    /// Orphan casks declared anywhere
    pub fn merged_orphans(&self) -> Vec<String> {
        let mut orphans: Vec<String> = Vec::new();
        for member in &self.members {
            for cask in &member.current.orphan_gui_packages {
                if !orphans.contains(cask) {
                    orphans.push(cask.clone());
                }
            }
        }
        orphans
    }

    fn satellites(&self) -> impl Iterator<Item = &ManifestDocument> {
        let main = self.main.0;
        self.members
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != main)
            .map(|(_, m)| m)
    }

    /// Replace the main member's entries for `domain` with `values`, leaving
    /// out anything another member already declares
    pub fn absorb(&mut self, domain: Domain, values: Vec<ManifestEntry>) {
        let kept: Vec<ManifestEntry> = values
            .into_iter()
            .filter(|v| {
                !self
                    .satellites()
                    .any(|m| m.current.contains(domain, &v.identifier))
            })
            .collect();
        self.members[self.main.0].current.set(domain, kept);
    }

    /// Same as [`absorb`](Self::absorb) for casks without a definition
    pub fn absorb_orphans(&mut self, values: Vec<String>) {
        let kept: Vec<String> = values
            .into_iter()
            .filter(|v| {
                !self.satellites().any(|m| {
                    m.current.orphan_gui_packages.contains(v)
                        || m.current.contains(Domain::GuiPackage, v)
                })
            })
            .collect();
        self.members[self.main.0].current.orphan_gui_packages = kept;
    }

    /// Remove an entry from the first member holding it
    pub fn remove_entry(&mut self, domain: Domain, identifier: &str) -> Option<DocumentId> {
        let position = self
            .members
            .iter()
            .position(|m| m.current.contains(domain, identifier))?;
        self.members[position].current.remove(domain, identifier);
        Some(DocumentId(position))
    }

    /// Record new options for a package wherever it is declared
    pub fn set_package_options(&mut self, name: &str, options: &str) -> bool {
        let mut found = false;
        for member in &mut self.members {
            if member.current.contains(Domain::Package, name) {
                member.current.set_options(name, options);
                found = true;
            }
        }
        found
    }

    /// Write every member, main first, announcing each file
    pub fn write_all(
        &self,
        options: &WriteOptions,
        index: &dyn RepositoryIndex,
        verbosity: u8,
    ) -> Result<()> {
        let order = std::iter::once(self.main.0)
            .chain((0..self.members.len()).filter(|i| *i != self.main.0));
        for i in order {
            let member = &self.members[i];
            print_banner(
                &format!("# Initialize {}", member.path().display()),
                verbosity,
            );
            member.write(options, index)?;
        }
        Ok(())
    }
}

/// Resolve an include relative to the including file's directory
fn include_path(base: Option<&Path>, include: &str) -> PathBuf {
    let expanded = expand_path(include);
    if expanded.is_absolute() {
        return expanded;
    }
    let mut relative = expanded.as_path();
    while let Ok(stripped) = relative.strip_prefix(".") {
        if stripped == relative {
            break;
        }
        relative = stripped;
    }
    base.unwrap_or(Path::new(".")).join(relative)
}

fn visit_key(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
