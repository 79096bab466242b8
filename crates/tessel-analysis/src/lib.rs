//! tessel-analysis - Dependency analysis over Tessel shader IR
//!
//! Given a translation root (usually one entry point), computes the minimal
//! set of IR nodes a backend has to emit and the target capabilities their
//! usage implies.
//!
//! # Architecture
//!
//! ```text
//! ShaderIrLibrary + EntryPoint
//!         ↓
//!  DependencyCollector   (post-order walk, OrderedSet per node kind)
//!         ↓
//!  DependencyCollection
//!  ├── order                 types / constants / globals / functions
//!  ├── capabilities          op, type, built-in and stage tables
//!  └── global_initializers   run before main
//! ```

pub mod capabilities;
pub mod collector;
pub mod ordered_set;

pub use capabilities::Capability;
pub use collector::{collect_entry_point, CollectError, DependencyCollection, DependencyCollector};
pub use ordered_set::OrderedSet;
