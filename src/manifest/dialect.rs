// src/manifest/dialect.rs

//! Manifest dialects
//!
//! The same declarations can be written three ways:
//!
//! - **plain**: `brew vim --HEAD`
//! - **bundle**: `brew 'vim', args: ['HEAD']` (Bundler-compatible)
//! - **command**: `brew install vim --HEAD`, an executable bash script with
//!   a bootstrap preamble between `#BREWFILE_IGNORE` and `#BREWFILE_ENDIGNORE`
//!
//! Reading accepts every dialect on every line; the first unambiguous line
//! fixes the detected dialect for the rest of the read.

use super::entry::{Domain, StoreApp};
use std::fmt;
use std::str::FromStr;

/// Textual form of a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Plain,
    Bundle,
    Command,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Plain => "plain",
            Dialect::Bundle => "bundle",
            Dialect::Command => "command",
        }
    }

    /// Unix permission bits of a written manifest
    pub fn file_mode(&self) -> u32 {
        match self {
            Dialect::Command => 0o755,
            _ => 0o644,
        }
    }

    /// Text written before the first section
    pub fn preamble(&self) -> &'static str {
        match self {
            Dialect::Command => COMMAND_PREAMBLE,
            _ => "",
        }
    }

    fn quote(&self, value: &str) -> String {
        match self {
            Dialect::Bundle => format!("'{}'", value),
            _ => value.to_string(),
        }
    }

    pub fn before_line(&self, command: &str) -> String {
        match self {
            Dialect::Plain => format!("before {}", command),
            Dialect::Bundle => format!("#before {}", command),
            Dialect::Command => command.to_string(),
        }
    }

    pub fn after_line(&self, command: &str) -> String {
        match self {
            Dialect::Plain => format!("after {}", command),
            Dialect::Bundle => format!("#after {}", command),
            Dialect::Command => command.to_string(),
        }
    }

    pub fn package_line(&self, name: &str, options: &str) -> String {
        let options = options.trim();
        match self {
            Dialect::Plain | Dialect::Command => {
                let keyword = if *self == Dialect::Command {
                    "brew install"
                } else {
                    "brew"
                };
                if options.is_empty() {
                    format!("{} {}", keyword, name)
                } else {
                    format!("{} {} {}", keyword, name, options)
                }
            }
            Dialect::Bundle => {
                if options.is_empty() {
                    format!("brew '{}'", name)
                } else {
                    let args: Vec<String> = options
                        .split_whitespace()
                        .map(|o| format!("'{}'", o.trim_start_matches("--")))
                        .collect();
                    format!("brew '{}', args: [{}]", name, args.join(", "))
                }
            }
        }
    }

    pub fn tap_line(&self, tap: &str) -> String {
        match self {
            Dialect::Command => format!("brew tap {}", tap),
            _ => format!("tap {}", self.quote(tap)),
        }
    }

    pub fn cask_line(&self, cask: &str) -> String {
        match self {
            Dialect::Command => format!("brew install --cask {}", cask),
            _ => format!("cask {}", self.quote(cask)),
        }
    }

    /// Casks without a definition are kept as comments
    pub fn orphan_cask_line(&self, cask: &str) -> String {
        format!("#{}", self.cask_line(cask))
    }

    pub fn store_app_line(&self, app: &str) -> String {
        let parsed = StoreApp::parse(app);
        match (self, &parsed.id) {
            (Dialect::Bundle, Some(id)) => format!("mas '{}', id: {}", parsed.name, id),
            (Dialect::Bundle, None) => format!("mas '{}'", parsed.name),
            (Dialect::Command, _) => format!("mas purchase {}", parsed.to_identifier()),
            (Dialect::Plain, _) => format!("appstore {}", parsed.to_identifier()),
        }
    }

    pub fn main_line(&self, file: &str) -> String {
        match self {
            Dialect::Plain => format!("main {}", file),
            _ => format!("#main {}", self.quote(file)),
        }
    }

    pub fn file_line(&self, file: &str) -> String {
        match self {
            Dialect::Plain => format!("file {}", file),
            _ => format!("#file {}", self.quote(file)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "file" | "none" => Ok(Dialect::Plain),
            "bundle" | "brewdler" => Ok(Dialect::Bundle),
            "command" | "cmd" => Ok(Dialect::Command),
            _ => Err(format!(
                "Unknown format: {} (expected file, bundle or command)",
                s
            )),
        }
    }
}

const COMMAND_PREAMBLE: &str = r#"#!/usr/bin/env bash

#BREWFILE_IGNORE
if ! which brew >& /dev/null;then
  brew_installed=0
  echo Homebrew is not installed!
  echo Install now...
  echo /bin/bash -c \"\$\(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh\)\"
  /bin/bash -c "$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)"
  echo
fi
#BREWFILE_ENDIGNORE

"#;

pub const BANNER_BEFORE: &str = "# Before commands";
pub const BANNER_TAPS: &str = "# tap repositories and their packages";
pub const BANNER_DIRECT: &str = "## Direct install";
pub const BANNER_PACKAGES: &str = "# Other Homebrew packages";
pub const BANNER_CASKS: &str = "# Other Cask applications";
pub const BANNER_ORPHANS: &str =
    "# Below applications were installed by Cask,\n# but do not have corresponding casks.";
pub const BANNER_STORE_APPS: &str = "# App Store applications";
pub const BANNER_MAIN: &str = "# Main file";
pub const BANNER_FILES: &str = "# Additional files";
pub const BANNER_COMMANDS: &str = "# Other commands";
pub const BANNER_AFTER: &str = "# After commands";

/// Banners that return the reader to ordinary declarations
const BODY_BANNERS: [&str; 8] = [
    BANNER_TAPS,
    BANNER_DIRECT,
    BANNER_PACKAGES,
    BANNER_CASKS,
    "# Below applications were installed by Cask,",
    BANNER_STORE_APPS,
    BANNER_MAIN,
    BANNER_FILES,
];

/// Part of the file the reader is in
///
/// Command-dialect hooks are bare shell lines, so lines inside the before and
/// after sections belong to the hook of that section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Body,
    Before,
    After,
}

/// Meaning of one manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Skip,
    Section(Section),
    Entry {
        domain: Domain,
        identifier: String,
        options: String,
    },
    /// `main <file>`: an included file on the primary chain
    Primary(String),
    /// `tapall <tap>`: the tap plus everything it provides
    TapAll(String),
    /// `#cask <name>`: installed cask with no definition
    Orphan(String),
}

impl Parsed {
    fn entry(domain: Domain, identifier: impl Into<String>) -> Self {
        Parsed::Entry {
            domain,
            identifier: identifier.into(),
            options: String::new(),
        }
    }
}

/// Whether a line opens (`Some(true)`) or closes (`Some(false)`) the pass-through block
pub fn ignore_marker(line: &str) -> Option<bool> {
    let rest = line.strip_prefix('#')?.trim_start();
    if rest.starts_with("BREWFILE_ENDIGNORE") {
        Some(false)
    } else if rest.starts_with("BREWFILE_IGNORE") {
        Some(true)
    } else {
        None
    }
}

/// Dialect of a whole document: the first line that reveals one decides
pub fn detect_dialect(text: &str) -> Option<Dialect> {
    let mut detected = None;
    for line in text.lines().map(str::trim) {
        if ignore_marker(line) == Some(true) {
            return Some(Dialect::Command);
        }
        if line.is_empty() {
            continue;
        }
        parse_line(line, Section::Body, &mut detected);
        if detected.is_some() {
            break;
        }
    }
    detected
}

/// Classify one line
///
/// `detected` is updated the first time a line reveals its dialect.
pub fn parse_line(line: &str, section: Section, detected: &mut Option<Dialect>) -> Parsed {
    let line = line.trim();
    if line.is_empty() {
        return Parsed::Skip;
    }

    if line.starts_with('#') {
        return parse_comment(line);
    }

    if section != Section::Body && *detected == Some(Dialect::Command) {
        let first = line.split_whitespace().next().unwrap_or_default();
        if first != "before" && first != "after" {
            let domain = if section == Section::Before {
                Domain::BeforeCommand
            } else {
                Domain::AfterCommand
            };
            return Parsed::entry(domain, line);
        }
    }

    parse_directive(line, detected)
}

fn parse_comment(line: &str) -> Parsed {
    if line == BANNER_BEFORE {
        return Parsed::Section(Section::Before);
    }
    if line == BANNER_AFTER {
        return Parsed::Section(Section::After);
    }
    if line == BANNER_COMMANDS || BODY_BANNERS.contains(&line) {
        return Parsed::Section(Section::Body);
    }

    // Reserved directives follow the `#` immediately
    let body = &line[1..];
    if body.starts_with(char::is_whitespace) || body.is_empty() {
        return Parsed::Skip;
    }
    let mut scratch = None;
    match parse_directive(body, &mut scratch) {
        parsed @ Parsed::Primary(_) => parsed,
        Parsed::Entry {
            domain: Domain::GuiPackage,
            identifier,
            ..
        } => Parsed::Orphan(identifier),
        parsed @ Parsed::Entry {
            domain: Domain::BeforeCommand | Domain::AfterCommand | Domain::IncludedFile,
            ..
        } => parsed,
        _ => Parsed::Skip,
    }
}

fn detect(detected: &mut Option<Dialect>, dialect: Dialect) {
    if detected.is_none() {
        *detected = Some(dialect);
    }
}

fn parse_directive(line: &str, detected: &mut Option<Dialect>) -> Parsed {
    let mut args: Vec<String> = line
        .replace(['\'', '"', '[', ']'], "")
        .replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if args.is_empty() {
        return Parsed::Skip;
    }

    // `brew tap x`, `brew cask install x`
    if args.len() > 2 && (args[1] == "tap" || args[1] == "cask") {
        args.remove(0);
        detect(detected, Dialect::Command);
    }
    // `brew install x`, `cask install x`, `mas purchase <id> <name>`
    if args.len() > 2
        && ((matches!(args[0].as_str(), "brew" | "cask") && args[1] == "install")
            || (args[0] == "mas" && args[1] == "purchase"))
    {
        args.remove(1);
        detect(detected, Dialect::Command);
    }
    // `brew install --cask x`
    if args.len() > 2 && args[0] == "brew" && args[1] == "--cask" {
        args.drain(..2);
        args.insert(0, "cask".to_string());
    }

    let cmd = args[0].as_str();
    let target = args.get(1).cloned().unwrap_or_default();
    let options = if args.len() > 2 {
        if args[2] == "args:" {
            detect(detected, Dialect::Bundle);
            args[3..]
                .iter()
                .map(|a| {
                    if a.starts_with('-') {
                        a.clone()
                    } else {
                        format!("--{}", a)
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            args[2..].join(" ")
        }
    } else {
        String::new()
    };

    if matches!(cmd, "brew" | "tap" | "tapall") && (line.contains('"') || line.contains('\'')) {
        detect(detected, Dialect::Bundle);
    }

    let rest = line
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default();

    match cmd {
        "before" | "after" if !rest.is_empty() => {
            let domain = if cmd == "before" {
                Domain::BeforeCommand
            } else {
                Domain::AfterCommand
            };
            Parsed::entry(domain, rest)
        }
        "mas" | "appstore" if !rest.is_empty() => match parse_store_app(rest, detected) {
            Some(app) => Parsed::entry(Domain::StoreApp, app),
            None => Parsed::entry(Domain::RawCommand, line),
        },
        _ if target.is_empty() => Parsed::entry(Domain::RawCommand, line),
        "brew" | "install" => Parsed::Entry {
            domain: Domain::Package,
            identifier: target,
            options,
        },
        "tap" => Parsed::entry(Domain::Repository, target),
        "tapall" => Parsed::TapAll(target),
        "cask" => Parsed::entry(Domain::GuiPackage, target),
        "main" => Parsed::Primary(target),
        "file" => Parsed::entry(Domain::IncludedFile, target),
        _ if cmd.eq_ignore_ascii_case("brewfile") => Parsed::entry(Domain::IncludedFile, target),
        _ => Parsed::entry(Domain::RawCommand, line),
    }
}

/// `'<name>', id: <id>`, `purchase <id> <name>` or `<id> <name>`
fn parse_store_app(rest: &str, detected: &mut Option<Dialect>) -> Option<String> {
    if let Some((name, id)) = rest.rsplit_once("id:") {
        detect(detected, Dialect::Bundle);
        let id = id.split_whitespace().next()?;
        let name = name.trim().trim_end_matches(',').trim().trim_matches(['\'', '"']);
        let app = StoreApp {
            id: Some(id.to_string()),
            name: name.to_string(),
        };
        return Some(app.to_identifier());
    }

    let rest = rest
        .strip_prefix("purchase ")
        .or_else(|| rest.strip_prefix("install "))
        .unwrap_or(rest);
    let rest = rest.trim().trim_matches(['\'', '"']);
    if rest.is_empty() {
        None
    } else {
        Some(StoreApp::parse(rest).to_identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> (Parsed, Option<Dialect>) {
        let mut detected = None;
        let parsed = parse_line(line, Section::Body, &mut detected);
        (parsed, detected)
    }

    fn package(name: &str, options: &str) -> Parsed {
        Parsed::Entry {
            domain: Domain::Package,
            identifier: name.to_string(),
            options: options.to_string(),
        }
    }

    #[test]
    fn test_dialect_from_str_aliases() {
        assert_eq!("file".parse::<Dialect>().unwrap(), Dialect::Plain);
        assert_eq!("none".parse::<Dialect>().unwrap(), Dialect::Plain);
        assert_eq!("brewdler".parse::<Dialect>().unwrap(), Dialect::Bundle);
        assert_eq!("cmd".parse::<Dialect>().unwrap(), Dialect::Command);
        assert!("yaml".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_package_in_each_dialect() {
        assert_eq!(parse("brew vim --HEAD"), (package("vim", "--HEAD"), None));
        assert_eq!(
            parse("brew 'vim', args: ['HEAD', 'with-lua']"),
            (package("vim", "--HEAD --with-lua"), Some(Dialect::Bundle))
        );
        assert_eq!(
            parse("brew install vim --HEAD"),
            (package("vim", "--HEAD"), Some(Dialect::Command))
        );
        assert_eq!(parse("install \"git\""), (package("git", ""), None));
    }

    #[test]
    fn test_quotes_on_tap_detect_bundle() {
        let (parsed, detected) = parse("tap \"homebrew/cask-fonts\"");
        assert_eq!(
            parsed,
            Parsed::entry(Domain::Repository, "homebrew/cask-fonts")
        );
        assert_eq!(detected, Some(Dialect::Bundle));
    }

    #[test]
    fn test_detection_is_sticky() {
        let mut detected = None;
        parse_line("brew install git", Section::Body, &mut detected);
        parse_line("brew 'vim'", Section::Body, &mut detected);
        assert_eq!(detected, Some(Dialect::Command));
    }

    #[test]
    fn test_command_forms() {
        assert_eq!(
            parse("brew tap user/repo").0,
            Parsed::entry(Domain::Repository, "user/repo")
        );
        assert_eq!(
            parse("brew cask install firefox").0,
            Parsed::entry(Domain::GuiPackage, "firefox")
        );
        assert_eq!(
            parse("brew install --cask firefox").0,
            Parsed::entry(Domain::GuiPackage, "firefox")
        );
        assert_eq!(
            parse("mas purchase 497799835 Xcode").0,
            Parsed::entry(Domain::StoreApp, "497799835 Xcode")
        );
    }

    #[test]
    fn test_store_app_forms() {
        assert_eq!(
            parse("appstore 497799835 Xcode").0,
            Parsed::entry(Domain::StoreApp, "497799835 Xcode")
        );
        let (parsed, detected) = parse("mas 'Final Cut Pro, X', id: 424389933");
        assert_eq!(
            parsed,
            Parsed::entry(Domain::StoreApp, "424389933 Final Cut Pro, X")
        );
        assert_eq!(detected, Some(Dialect::Bundle));
        assert_eq!(
            parse("appstore Keynote").0,
            Parsed::entry(Domain::StoreApp, "Keynote")
        );
    }

    #[test]
    fn test_files_hooks_and_raw_commands() {
        assert_eq!(parse("main ~/dotfiles/Brewfile").0, Parsed::Primary("~/dotfiles/Brewfile".into()));
        assert_eq!(
            parse("Brewfile extra.txt").0,
            Parsed::entry(Domain::IncludedFile, "extra.txt")
        );
        assert_eq!(
            parse("before echo  'start'").0,
            Parsed::entry(Domain::BeforeCommand, "echo  'start'")
        );
        assert_eq!(
            parse("defaults write com.apple.dock autohide -bool true").0,
            Parsed::entry(
                Domain::RawCommand,
                "defaults write com.apple.dock autohide -bool true"
            )
        );
        assert_eq!(parse("tapall user/repo").0, Parsed::TapAll("user/repo".into()));
        assert_eq!(parse("brew").0, Parsed::entry(Domain::RawCommand, "brew"));
    }

    #[test]
    fn test_comments_and_reserved_directives() {
        assert_eq!(parse("# just a note").0, Parsed::Skip);
        assert_eq!(parse("#!/usr/bin/env bash").0, Parsed::Skip);
        assert_eq!(parse("#cask old-app").0, Parsed::Orphan("old-app".into()));
        assert_eq!(
            parse("#brew install --cask old-app").0,
            Parsed::Orphan("old-app".into())
        );
        assert_eq!(parse("#main 'Brewfile.main'").0, Parsed::Primary("Brewfile.main".into()));
        assert_eq!(
            parse("#before brew update").0,
            Parsed::entry(Domain::BeforeCommand, "brew update")
        );
        assert_eq!(parse("#brew 'vim'").0, Parsed::Skip);
        assert_eq!(parse(BANNER_BEFORE).0, Parsed::Section(Section::Before));
        assert_eq!(parse(BANNER_PACKAGES).0, Parsed::Section(Section::Body));
    }

    #[test]
    fn test_command_dialect_hook_sections() {
        let mut detected = Some(Dialect::Command);
        assert_eq!(
            parse_line("brew update", Section::Before, &mut detected),
            Parsed::entry(Domain::BeforeCommand, "brew update")
        );
        assert_eq!(
            parse_line("echo done", Section::After, &mut detected),
            Parsed::entry(Domain::AfterCommand, "echo done")
        );

        let mut plain = Some(Dialect::Plain);
        assert_eq!(
            parse_line("tap user/repo", Section::Before, &mut plain),
            Parsed::entry(Domain::Repository, "user/repo")
        );
    }

    #[test]
    fn test_detect_dialect_of_document() {
        assert_eq!(
            detect_dialect("# Before commands\nbrew update\n\nbrew install git\n"),
            Some(Dialect::Command)
        );
        assert_eq!(detect_dialect("brew git\ntap 'user/tools'\n"), Some(Dialect::Bundle));
        assert_eq!(detect_dialect("#BREWFILE_IGNORE\nfoo\n"), Some(Dialect::Command));
        assert_eq!(detect_dialect("brew git\n"), None);
    }

    #[test]
    fn test_single_dash_options_survive_bundle() {
        let line = Dialect::Bundle.package_line("tool", "-v --HEAD");
        assert_eq!(line, "brew 'tool', args: ['-v', 'HEAD']");
        assert_eq!(parse(&line).0, package("tool", "-v --HEAD"));
    }

    #[test]
    fn test_ignore_marker() {
        assert_eq!(ignore_marker("#BREWFILE_IGNORE"), Some(true));
        assert_eq!(ignore_marker("# BREWFILE_ENDIGNORE"), Some(false));
        assert_eq!(ignore_marker("# other"), None);
    }

    #[test]
    fn test_write_lines() {
        assert_eq!(
            Dialect::Bundle.package_line("vim", "--HEAD --with-lua"),
            "brew 'vim', args: ['HEAD', 'with-lua']"
        );
        assert_eq!(Dialect::Command.package_line("vim", ""), "brew install vim");
        assert_eq!(Dialect::Plain.package_line("vim", " --HEAD"), "brew vim --HEAD");
        assert_eq!(
            Dialect::Bundle.store_app_line("497799835 Xcode"),
            "mas 'Xcode', id: 497799835"
        );
        assert_eq!(
            Dialect::Command.orphan_cask_line("old"),
            "#brew install --cask old"
        );
        assert_eq!(Dialect::Bundle.main_line("a.txt"), "#main 'a.txt'");
        assert_eq!(Dialect::Command.before_line("brew update"), "brew update");
    }
}
