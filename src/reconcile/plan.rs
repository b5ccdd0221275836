// src/reconcile/plan.rs

//! Ordered action plans

use crate::manifest::Domain;
use std::fmt;

/// What an action does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Install,
    Reinstall,
    Remove,
    AddRepository,
    RemoveRepository,
    /// Run a shell command line (hooks, raw commands, cache cleanup)
    Run,
    /// Something the user has to do by hand
    Manual,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Install => "install",
            Verb::Reinstall => "reinstall",
            Verb::Remove => "remove",
            Verb::AddRepository => "add_repository",
            Verb::RemoveRepository => "remove_repository",
            Verb::Run => "run",
            Verb::Manual => "manual",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a plan
///
/// `payload` is the argument vector to run; for [`Verb::Run`] it holds a
/// single shell command line and for [`Verb::Manual`] the message to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub domain: Domain,
    pub verb: Verb,
    pub identifier: String,
    pub payload: Vec<String>,
}

impl Action {
    pub fn new(domain: Domain, verb: Verb, identifier: &str, payload: &[&str]) -> Self {
        Self {
            domain,
            verb,
            identifier: identifier.to_string(),
            payload: payload.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn run(domain: Domain, command: &str) -> Self {
        Self::new(domain, Verb::Run, command, &[command])
    }

    /// Command as it would be typed
    pub fn command_line(&self) -> String {
        self.payload.join(" ")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.verb {
            Verb::Manual => write!(f, "# {}", self.command_line()),
            _ => f.write_str(&self.command_line()),
        }
    }
}

/// Actions in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    actions: Vec<Action>,
}

impl ActionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// No state-changing actions; commands that always run are ignored
    pub fn is_converged(&self) -> bool {
        self.actions.iter().all(|a| a.verb == Verb::Run)
    }

    pub fn count(&self, verb: Verb) -> usize {
        self.actions.iter().filter(|a| a.verb == verb).count()
    }

    /// Identifiers touched by `verb`, in order
    pub fn identifiers(&self, verb: Verb) -> Vec<&str> {
        self.actions
            .iter()
            .filter(|a| a.verb == verb)
            .map(|a| a.identifier.as_str())
            .collect()
    }
}

impl<'a> IntoIterator for &'a ActionPlan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
