// src/manifest/mod.rs

//! Manifest files and their include graph

mod dialect;
mod document;
mod entry;
mod graph;

pub use dialect::Dialect;
pub use document::{ManifestDocument, WriteOptions};
pub use entry::{
    identifiers_match, options_equal, Domain, DocumentId, EntrySet, ManifestEntry, OptionTable,
    Slot, StoreApp,
};
pub use graph::ManifestGraph;
