// src/lib.rs

//! Brewfile
//!
//! Declarative manifest manager for Homebrew. A plain-text manifest (with
//! optional includes) lists taps, formulae, casks, App Store apps, hooks and
//! raw commands; the tool installs what is missing, records what is
//! installed, and removes what is not declared.
//!
//! # Architecture
//!
//! - Manifests: three dialects (plain, bundle, command) parsed into one model
//! - Graph: the root file and its includes, merged per domain
//! - Probe: every query of the machine goes through a trait
//! - Reconciler: install, init and clean are computed as action plans first
//! - App matcher: advisory `Caskfile` for applications installed outside Homebrew

pub mod appmatch;
pub mod config;
mod error;
pub mod logging;
pub mod manifest;
pub mod output;
pub mod probe;
pub mod reconcile;
pub mod repository;

pub use error::{Error, Result};
