//! Node catalog and on-disk stores.
//!
//! The registry is the catalog of available node types: each entry carries
//! an implementation locator, a declared interface, and (for types linked
//! into this binary) a constructor. Node discovery is an explicit
//! registration step performed at program start; the serialized manifest
//! (`registry.json`) is the durable, interface-only view of the catalog.
//!
//! This crate also owns the two flat persistence surfaces next to the
//! configuration root: the saved-workflow store and the settings store
//! (including the `env` map consulted during input preparation).

pub mod catalog;
pub mod config;
pub mod names;
pub mod settings;
pub mod workflows;

pub use catalog::{NodeEntry, Registry, RegistryManifest};
pub use names::node_type_from_class_name;
pub use settings::Settings;
pub use workflows::{SavedWorkflow, WorkflowStore};
