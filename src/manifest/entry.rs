// src/manifest/entry.rs

//! Declared manifest items
//!
//! [`ManifestEntry`] is the typed record for one declared item and
//! [`EntrySet`] holds every item of one document, one collection per
//! [`Domain`]. Packages carry an options string and live in an ordered
//! identifier-to-options table; every other domain is an ordered sequence.

use crate::repository::basename;
use std::fmt;
use std::str::FromStr;

/// Kind of declared item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Package,
    Repository,
    GuiPackage,
    StoreApp,
    IncludedFile,
    BeforeCommand,
    AfterCommand,
    RawCommand,
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::Package,
        Domain::Repository,
        Domain::GuiPackage,
        Domain::StoreApp,
        Domain::IncludedFile,
        Domain::BeforeCommand,
        Domain::AfterCommand,
        Domain::RawCommand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Package => "package",
            Domain::Repository => "repository",
            Domain::GuiPackage => "gui_package",
            Domain::StoreApp => "store_app",
            Domain::IncludedFile => "included_file",
            Domain::BeforeCommand => "before_command",
            Domain::AfterCommand => "after_command",
            Domain::RawCommand => "raw_command",
        }
    }

    /// Domains whose identifiers are unique within a document
    ///
    /// Commands are kept verbatim and may repeat.
    pub fn is_identity(&self) -> bool {
        !matches!(
            self,
            Domain::BeforeCommand | Domain::AfterCommand | Domain::RawCommand
        )
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("Unknown domain: {}", s))
    }
}

/// Index of a document within a [`ManifestGraph`](super::ManifestGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub usize);

impl DocumentId {
    pub const ROOT: DocumentId = DocumentId(0);
}

/// One declared item
///
/// Equality is identity equality: `options` and `source_document` are
/// ignored, and store apps compare through [`StoreApp::matches`].
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub domain: Domain,
    pub identifier: String,
    /// Trailing modifiers for packages, e.g. `--HEAD --with-lua`
    pub options: String,
    /// Document that owns the entry; only used to route writes
    pub source_document: Option<DocumentId>,
}

impl ManifestEntry {
    pub fn new(domain: Domain, identifier: impl Into<String>) -> Self {
        Self {
            domain,
            identifier: identifier.into(),
            options: String::new(),
            source_document: None,
        }
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }
}

impl PartialEq for ManifestEntry {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && identifiers_match(self.domain, &self.identifier, &other.identifier)
    }
}

/// Identity comparison of two identifiers of the same domain
pub fn identifiers_match(domain: Domain, a: &str, b: &str) -> bool {
    match domain {
        Domain::StoreApp => StoreApp::parse(a).matches(&StoreApp::parse(b)),
        Domain::Package => basename(a) == basename(b),
        _ => a == b,
    }
}

/// Compare option strings as unordered token sets
pub fn options_equal(a: &str, b: &str) -> bool {
    let mut a: Vec<&str> = a.split_whitespace().collect();
    let mut b: Vec<&str> = b.split_whitespace().collect();
    a.sort_unstable();
    a.dedup();
    b.sort_unstable();
    b.dedup();
    a == b
}

/// Minimum length of a numeric App Store id
const STORE_ID_MIN_LEN: usize = 9;

/// An App Store application as written in a manifest (`"<id> <name>"` or `"<name>"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreApp {
    pub id: Option<String>,
    pub name: String,
}

impl StoreApp {
    /// Parse `"<id> <name>"`, `"<name>"` or `mas list` output such as
    /// `"497799835 Xcode (15.2)"`
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (id, rest) = match raw.split_once(char::is_whitespace) {
            Some((first, rest)) if is_store_id(first) => (Some(first.to_string()), rest.trim()),
            None if is_store_id(raw) => (Some(raw.to_string()), ""),
            _ => (None, raw),
        };
        Self {
            id,
            name: strip_version_suffix(rest).to_string(),
        }
    }

    /// Ids are authoritative when both sides have one; otherwise names decide
    pub fn matches(&self, other: &StoreApp) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }

    pub fn sort_key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Manifest form: `"<id> <name>"`, or the bare name
    pub fn to_identifier(&self) -> String {
        match &self.id {
            Some(id) if self.name.is_empty() => id.clone(),
            Some(id) => format!("{} {}", id, self.name),
            None => self.name.clone(),
        }
    }
}

fn is_store_id(token: &str) -> bool {
    token.len() >= STORE_ID_MIN_LEN && token.bytes().all(|b| b.is_ascii_digit())
}

/// Remove a trailing `" (1.2.3)"` version annotation
fn strip_version_suffix(name: &str) -> &str {
    if let Some(inner) = name.strip_suffix(')') {
        if let Some(pos) = inner.rfind(" (") {
            let version = &inner[pos + 2..];
            let looks_like_version = version.starts_with(|c: char| c.is_ascii_digit())
                && version.contains('.')
                && version
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
            if looks_like_version {
                return name[..pos].trim_end();
            }
        }
    }
    name
}

/// Package identifier to options, in declaration order; the last declaration wins
///
/// `user/repo/name` and `name` are the same package; the first spelling is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionTable(Vec<(String, String)>);

impl OptionTable {
    pub fn insert(&mut self, identifier: &str, options: &str) {
        match self
            .0
            .iter_mut()
            .find(|(name, _)| identifiers_match(Domain::Package, name, identifier))
        {
            Some(existing) => existing.1 = options.to_string(),
            None => self.0.push((identifier.to_string(), options.to_string())),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| identifiers_match(Domain::Package, name, identifier))
            .map(|(_, opts)| opts.as_str())
    }

    pub fn remove(&mut self, identifier: &str) -> bool {
        let before = self.0.len();
        self.0
            .retain(|(name, _)| !identifiers_match(Domain::Package, name, identifier));
        self.0.len() != before
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, o)| (n.as_str(), o.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Read-only view of one domain's collection
pub enum Slot<'a> {
    Sequence(&'a [String]),
    Table(&'a OptionTable),
}

impl Slot<'_> {
    pub fn identifiers(&self) -> Vec<String> {
        match self {
            Slot::Sequence(items) => items.to_vec(),
            Slot::Table(table) => table.names().map(str::to_string).collect(),
        }
    }
}

/// Every declared item of one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySet {
    packages: OptionTable,
    repositories: Vec<String>,
    gui_packages: Vec<String>,
    store_apps: Vec<String>,
    included_files: Vec<String>,
    before_commands: Vec<String>,
    after_commands: Vec<String>,
    raw_commands: Vec<String>,
    /// Included files marked `main`; always a subset of the included files
    pub primary_files: Vec<String>,
    /// Installed casks that have no cask definition
    pub orphan_gui_packages: Vec<String>,
}

impl EntrySet {
    pub fn slot(&self, domain: Domain) -> Slot<'_> {
        match domain {
            Domain::Package => Slot::Table(&self.packages),
            Domain::Repository => Slot::Sequence(&self.repositories),
            Domain::GuiPackage => Slot::Sequence(&self.gui_packages),
            Domain::StoreApp => Slot::Sequence(&self.store_apps),
            Domain::IncludedFile => Slot::Sequence(&self.included_files),
            Domain::BeforeCommand => Slot::Sequence(&self.before_commands),
            Domain::AfterCommand => Slot::Sequence(&self.after_commands),
            Domain::RawCommand => Slot::Sequence(&self.raw_commands),
        }
    }

    fn sequence_mut(&mut self, domain: Domain) -> Option<&mut Vec<String>> {
        match domain {
            Domain::Package => None,
            Domain::Repository => Some(&mut self.repositories),
            Domain::GuiPackage => Some(&mut self.gui_packages),
            Domain::StoreApp => Some(&mut self.store_apps),
            Domain::IncludedFile => Some(&mut self.included_files),
            Domain::BeforeCommand => Some(&mut self.before_commands),
            Domain::AfterCommand => Some(&mut self.after_commands),
            Domain::RawCommand => Some(&mut self.raw_commands),
        }
    }

    pub fn identifiers(&self, domain: Domain) -> Vec<String> {
        self.slot(domain).identifiers()
    }

    pub fn entries(&self, domain: Domain) -> Vec<ManifestEntry> {
        match self.slot(domain) {
            Slot::Sequence(items) => items
                .iter()
                .map(|id| ManifestEntry::new(domain, id.as_str()))
                .collect(),
            Slot::Table(table) => table
                .iter()
                .map(|(id, opts)| ManifestEntry::new(domain, id).with_options(opts))
                .collect(),
        }
    }

    pub fn contains(&self, domain: Domain, identifier: &str) -> bool {
        match self.slot(domain) {
            Slot::Sequence(items) => items
                .iter()
                .any(|item| identifiers_match(domain, item, identifier)),
            Slot::Table(table) => table.get(identifier).is_some(),
        }
    }

    /// Options of a declared package
    pub fn options(&self, identifier: &str) -> Option<&str> {
        self.packages.get(identifier)
    }

    /// Add an item; identity domains keep a single entry per identifier
    pub fn insert(&mut self, domain: Domain, identifier: &str, options: &str) {
        if domain == Domain::Package {
            self.packages.insert(identifier, options);
            return;
        }
        let exists = domain.is_identity() && self.contains(domain, identifier);
        if let Some(items) = self.sequence_mut(domain) {
            if !exists {
                items.push(identifier.to_string());
            }
        }
    }

    /// Remove every item matching `identifier`; returns whether one was found
    pub fn remove(&mut self, domain: Domain, identifier: &str) -> bool {
        if domain == Domain::Package {
            return self.packages.remove(identifier);
        }
        let removed = match self.sequence_mut(domain) {
            Some(items) => {
                let before = items.len();
                items.retain(|item| !identifiers_match(domain, item, identifier));
                items.len() != before
            }
            None => false,
        };
        if removed && domain == Domain::IncludedFile {
            self.primary_files.retain(|f| f != identifier);
        }
        removed
    }

    /// Replace a whole domain
    pub fn set(&mut self, domain: Domain, values: Vec<ManifestEntry>) {
        if domain == Domain::Package {
            self.packages.clear();
        } else if let Some(items) = self.sequence_mut(domain) {
            items.clear();
        }
        for entry in values {
            self.insert(domain, &entry.identifier, &entry.options);
        }
        if domain == Domain::IncludedFile {
            let files = self.included_files.clone();
            self.primary_files.retain(|f| files.contains(f));
        }
    }

    pub fn set_options(&mut self, identifier: &str, options: &str) {
        self.packages.insert(identifier, options);
    }

    pub fn add_orphan(&mut self, identifier: &str) {
        if !self.orphan_gui_packages.iter().any(|c| c == identifier) {
            self.orphan_gui_packages.push(identifier.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        Domain::ALL.iter().all(|d| match self.slot(*d) {
            Slot::Sequence(items) => items.is_empty(),
            Slot::Table(table) => table.is_empty(),
        }) && self.orphan_gui_packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_round_trip() {
        for domain in Domain::ALL {
            assert_eq!(domain.as_str().parse::<Domain>().unwrap(), domain);
        }
        assert!("formula".parse::<Domain>().is_err());
        assert!(!Domain::RawCommand.is_identity());
        assert!(Domain::StoreApp.is_identity());
    }

    #[test]
    fn test_entry_identity_ignores_options_and_source() {
        let a = ManifestEntry::new(Domain::Package, "vim").with_options("--HEAD");
        let mut b = ManifestEntry::new(Domain::Package, "vim");
        b.source_document = Some(DocumentId(3));
        assert_eq!(a, b);
        assert_ne!(a, ManifestEntry::new(Domain::GuiPackage, "vim"));
    }

    #[test]
    fn test_store_app_version_suffix_is_stripped() {
        let declared = StoreApp::parse("123456789 Foo");
        let installed = StoreApp::parse("123456789 Foo (2.1)");
        assert_eq!(installed.id.as_deref(), Some("123456789"));
        assert_eq!(installed.name, "Foo");
        assert!(declared.matches(&installed));
    }

    #[test]
    fn test_store_app_id_is_authoritative() {
        let a = StoreApp::parse("123456789 Foo");
        let renamed = StoreApp::parse("123456789 Foo Pro");
        let other = StoreApp::parse("987654321 Foo");
        assert!(a.matches(&renamed));
        assert!(!a.matches(&other));

        let bare = StoreApp::parse("Foo");
        assert!(bare.id.is_none());
        assert!(bare.matches(&other));
    }

    #[test]
    fn test_store_app_short_number_is_part_of_name() {
        let app = StoreApp::parse("1Password 7");
        assert!(app.id.is_none());
        assert_eq!(app.name, "1Password 7");
        assert_eq!(app.to_identifier(), "1Password 7");
        assert_eq!(StoreApp::parse("Things (beta)").name, "Things (beta)");
    }

    #[test]
    fn test_options_equal_is_order_insensitive() {
        assert!(options_equal("--HEAD --with-lua", "--with-lua  --HEAD"));
        assert!(options_equal("", "  "));
        assert!(!options_equal("--with-lua", "--with-python"));
    }

    #[test]
    fn test_entry_set_last_package_declaration_wins() {
        let mut set = EntrySet::default();
        set.insert(Domain::Package, "vim", "--HEAD");
        set.insert(Domain::Package, "git", "");
        set.insert(Domain::Package, "vim", "--with-lua");

        assert_eq!(set.identifiers(Domain::Package), vec!["vim", "git"]);
        assert_eq!(set.options("vim"), Some("--with-lua"));
    }

    #[test]
    fn test_tap_qualified_package_matches_basename() {
        let mut set = EntrySet::default();
        set.insert(Domain::Package, "user/tools/fmt", "");

        assert!(set.contains(Domain::Package, "fmt"));
        assert!(!set.contains(Domain::Package, "fmt2"));
        set.insert(Domain::Package, "fmt", "--HEAD");
        assert_eq!(set.identifiers(Domain::Package), vec!["user/tools/fmt"]);
        assert_eq!(set.options("fmt"), Some("--HEAD"));
        assert!(set.remove(Domain::Package, "fmt"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_entry_set_dedups_identity_domains_only() {
        let mut set = EntrySet::default();
        set.insert(Domain::Repository, "user/tap", "");
        set.insert(Domain::Repository, "user/tap", "");
        set.insert(Domain::StoreApp, "123456789 Foo", "");
        set.insert(Domain::StoreApp, "123456789 Foo (1.0)", "");
        set.insert(Domain::RawCommand, "echo hi", "");
        set.insert(Domain::RawCommand, "echo hi", "");

        assert_eq!(set.identifiers(Domain::Repository).len(), 1);
        assert_eq!(set.identifiers(Domain::StoreApp).len(), 1);
        assert_eq!(set.identifiers(Domain::RawCommand).len(), 2);
    }

    #[test]
    fn test_entry_set_remove_and_set() {
        let mut set = EntrySet::default();
        set.insert(Domain::IncludedFile, "extra.txt", "");
        set.insert(Domain::IncludedFile, "main.txt", "");
        set.primary_files.push("main.txt".to_string());

        assert!(set.remove(Domain::IncludedFile, "main.txt"));
        assert!(set.primary_files.is_empty());
        assert!(!set.remove(Domain::IncludedFile, "missing"));

        set.set(
            Domain::GuiPackage,
            vec![ManifestEntry::new(Domain::GuiPackage, "firefox")],
        );
        assert!(set.contains(Domain::GuiPackage, "firefox"));
        assert!(!set.is_empty());
    }
}
