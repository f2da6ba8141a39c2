//! Multitopic Core Section Tree Engine
//!
//! This crate keeps a course's sections in a consistent multi-level tree
//! (general section, pages, topics) and implements every structural edit
//! the course pages perform on it.
//!
//! # Architecture
//!
//! - **Arena + index**: Sections live in a flat map keyed by id; the tree
//!   index (parents, ordered children, depth-first order) is derived from
//!   their links and rebuilt after every edit
//! - **Copy-on-write operations**: The engine computes a new tree from the
//!   current one; only the difference is committed, atomically
//! - **Optimistic concurrency**: The store rejects change sets computed from
//!   a stale revision and the controller retries them
//! - **Dense ordinals**: Legacy section numbers always equal depth-first order
//!
//! # Modules
//!
//! - [`models`] - Data structures (Section, MoveDestination, ...)
//! - [`tree`] - Tree index, placement engine, visibility propagation
//! - [`services`] - Section controller, caches and collaborator traits
//! - [`db`] - Store trait, in-memory and JSON file stores, domain events
//! - [`config`] - Engine and controller configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod tree;

// Re-export commonly used types
pub use config::TreeConfig;
pub use models::*;
pub use services::*;
pub use tree::{CourseTree, PlacementEngine, TreeIndex, VisibilityPropagator};
