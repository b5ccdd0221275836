// src/probe/mod.rs

//! Actual installed state
//!
//! [`StateProbe`] answers what is installed, [`CommandRunner`] runs the
//! commands that change it. Both are traits so reconciliation can be driven
//! against fakes.
//!
//! Query failures are not fatal: the `*_or_empty` helpers log a warning and
//! yield an empty result. Only a missing environment aborts.

mod brew;
mod exec;
mod traits;

pub use brew::{find_bundle, BrewEnvironment, BrewProbe};
pub use exec::SystemRunner;
pub use traits::{
    argv, parse_info, CommandOutput, CommandRunner, FormulaInfo, InfoTarget, InstalledVersion,
    RunOptions, StateProbe,
};

use crate::error::{Error, Result};
use crate::manifest::Domain;
use std::collections::BTreeMap;
use tracing::warn;

fn recover<T: Default>(result: Result<T>, what: &str) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e @ Error::EnvironmentMissing { .. }) => Err(e),
        Err(e) => {
            warn!("Failed to get {}: {}", what, e);
            Ok(T::default())
        }
    }
}

pub fn query_or_empty(probe: &dyn StateProbe, domain: Domain) -> Result<Vec<String>> {
    recover(probe.query(domain), &format!("installed {}", domain))
}

pub fn info_or_empty(
    probe: &dyn StateProbe,
    target: InfoTarget<'_>,
) -> Result<BTreeMap<String, FormulaInfo>> {
    recover(probe.info(target), "package information")
}

pub fn leaves_or_empty(probe: &dyn StateProbe) -> Result<Vec<String>> {
    recover(probe.leaves(), "leaves")
}
