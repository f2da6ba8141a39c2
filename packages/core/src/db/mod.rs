//! Storage Layer
//!
//! This module handles everything between the tree engine and the external
//! record store:
//!
//! - `SectionStore` trait with optimistic revision checks
//! - In-memory and JSON file implementations
//! - Domain events published after each committed change
//!
//! The host application's relational store plugs in by implementing
//! [`SectionStore`].

mod error;
pub mod events;
mod json_store;
mod memory_store;
mod section_store;

pub use error::StoreError;
pub use events::SectionEvent;
pub use json_store::JsonFileSectionStore;
pub use memory_store::InMemorySectionStore;
pub use section_store::{CourseSnapshot, SectionChangeSet, SectionStore};
