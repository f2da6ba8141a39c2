//! SectionStore Trait - Persistence Abstraction Layer
//!
//! This module defines the `SectionStore` trait that abstracts the external
//! record store holding section rows. The controller talks only to this
//! trait, so the relational backend of the host application, the in-memory
//! store used by tests and the JSON file store used by the dev tool are
//! interchangeable.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so network-backed stores fit
//!    without blocking the runtime.
//! 2. **Whole-course loads**: A course has at most a few hundred sections;
//!    loading them all keeps the tree index simple and exact.
//! 3. **Atomic change sets**: One operation produces one [`SectionChangeSet`]
//!    which the store applies all-or-nothing.
//! 4. **Optimistic concurrency**: Every change set names the revision it was
//!    computed from. A store whose revision moved on rejects it with
//!    [`StoreError::RevisionConflict`].
//!
//! # Examples
//!
//! ```rust
//! use multitopic_core::db::{InMemorySectionStore, SectionChangeSet, SectionStore};
//! use multitopic_core::models::Section;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemorySectionStore::new();
//! let root_id = store.allocate_section_id().await?;
//!
//! let revision = store
//!     .save_sections(
//!         42,
//!         SectionChangeSet {
//!             base_revision: 0,
//!             upserts: vec![Section::new_root(root_id, 42)],
//!             deletions: vec![],
//!         },
//!     )
//!     .await?;
//! assert_eq!(revision, 1);
//! assert_eq!(store.load_sections(42).await?.sections.len(), 1);
//! # Ok(())
//! # }
//! ```

use super::error::StoreError;
use crate::models::{CourseId, Section, SectionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Every section of one course as of one store revision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSnapshot {
    pub course_id: CourseId,
    /// Revision counter, incremented by each committed change set (0 = never written)
    pub revision: u64,
    /// Sections ordered by ordinal
    pub sections: Vec<Section>,
}

/// Upserts and deletions produced by one operation, applied atomically
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionChangeSet {
    /// Revision the change set was computed from
    pub base_revision: u64,
    pub upserts: Vec<Section>,
    pub deletions: Vec<SectionId>,
}

impl SectionChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty()
    }

    /// Number of records touched
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletions.len()
    }
}

/// Abstraction over the persistent section record store
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the controller shares one store
/// across concurrent requests.
#[async_trait]
pub trait SectionStore: Send + Sync {
    /// Load every section of a course, ordered by ordinal
    ///
    /// An unknown course yields an empty snapshot at revision 0, not an error.
    async fn load_sections(&self, course_id: CourseId) -> Result<CourseSnapshot, StoreError>;

    /// Apply a change set atomically and return the new revision
    ///
    /// # Errors
    ///
    /// - `RevisionConflict` if `changes.base_revision` is not the current revision
    /// - `ForeignSection` if an upsert belongs to another course
    async fn save_sections(
        &self,
        course_id: CourseId,
        changes: SectionChangeSet,
    ) -> Result<u64, StoreError>;

    /// Current revision of a course, without loading its sections
    async fn revision(&self, course_id: CourseId) -> Result<u64, StoreError>;

    /// Reserve a fresh section id, unique across all courses
    ///
    /// Ids reserved by operations that later fail are simply skipped.
    async fn allocate_section_id(&self) -> Result<SectionId, StoreError>;
}

/// Reject upserts that belong to another course
pub(crate) fn check_course(course_id: CourseId, changes: &SectionChangeSet) -> Result<(), StoreError> {
    match changes.upserts.iter().find(|s| s.course_id != course_id) {
        Some(foreign) => Err(StoreError::ForeignSection {
            course_id,
            section_id: foreign.id,
        }),
        None => Ok(()),
    }
}
