//! In-memory section store
//!
//! Keeps every course in a map behind a tokio `RwLock`. Used by tests and as
//! the default store for embedding the engine without a database.

use super::error::StoreError;
use super::section_store::{check_course, CourseSnapshot, SectionChangeSet, SectionStore};
use crate::models::{CourseId, Section, SectionId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone)]
struct CourseRecords {
    revision: u64,
    sections: BTreeMap<SectionId, Section>,
}

impl CourseRecords {
    fn snapshot(&self, course_id: CourseId) -> CourseSnapshot {
        let mut sections: Vec<Section> = self.sections.values().cloned().collect();
        sections.sort_by_key(|s| (s.ordinal, s.id));
        CourseSnapshot {
            course_id,
            revision: self.revision,
            sections,
        }
    }
}

/// Section store backed by process memory
#[derive(Debug, Clone)]
pub struct InMemorySectionStore {
    courses: Arc<RwLock<HashMap<CourseId, CourseRecords>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemorySectionStore {
    pub fn new() -> Self {
        Self {
            courses: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Seed a store with existing sections of one course, at revision 1
    ///
    /// The records are stored as given, without validation, so tests can
    /// seed deliberately broken trees.
    pub fn with_sections(course_id: CourseId, sections: Vec<Section>) -> Self {
        let max_id = sections.iter().map(|s| s.id).max().unwrap_or(0);
        let records = CourseRecords {
            revision: 1,
            sections: sections.into_iter().map(|s| (s.id, s)).collect(),
        };
        let mut courses = HashMap::new();
        courses.insert(course_id, records);

        Self {
            courses: Arc::new(RwLock::new(courses)),
            next_id: Arc::new(AtomicI64::new(max_id + 1)),
        }
    }
}

impl Default for InMemorySectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SectionStore for InMemorySectionStore {
    async fn load_sections(&self, course_id: CourseId) -> Result<CourseSnapshot, StoreError> {
        let courses = self.courses.read().await;
        Ok(courses
            .get(&course_id)
            .map(|records| records.snapshot(course_id))
            .unwrap_or(CourseSnapshot {
                course_id,
                revision: 0,
                sections: Vec::new(),
            }))
    }

    async fn save_sections(
        &self,
        course_id: CourseId,
        changes: SectionChangeSet,
    ) -> Result<u64, StoreError> {
        check_course(course_id, &changes)?;

        let mut courses = self.courses.write().await;
        let records = courses.entry(course_id).or_default();
        if records.revision != changes.base_revision {
            return Err(StoreError::revision_conflict(
                course_id,
                changes.base_revision,
                records.revision,
            ));
        }

        for id in &changes.deletions {
            records.sections.remove(id);
        }
        for section in changes.upserts {
            records.sections.insert(section.id, section);
        }
        records.revision += 1;
        Ok(records.revision)
    }

    async fn revision(&self, course_id: CourseId) -> Result<u64, StoreError> {
        let courses = self.courses.read().await;
        Ok(courses.get(&course_id).map(|r| r.revision).unwrap_or(0))
    }

    async fn allocate_section_id(&self) -> Result<SectionId, StoreError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LEVEL_PAGE;

    fn root_change(course_id: CourseId, base_revision: u64) -> SectionChangeSet {
        SectionChangeSet {
            base_revision,
            upserts: vec![Section::new_root(1, course_id)],
            deletions: vec![],
        }
    }

    #[tokio::test]
    async fn test_unknown_course_is_empty_at_revision_zero() {
        let store = InMemorySectionStore::new();
        let snapshot = store.load_sections(5).await.unwrap();
        assert_eq!(snapshot.revision, 0);
        assert!(snapshot.sections.is_empty());
        assert_eq!(store.revision(5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_bumps_revision_and_orders_by_ordinal() {
        let store = InMemorySectionStore::new();
        store.save_sections(5, root_change(5, 0)).await.unwrap();

        let mut page = Section::new(9, 5, LEVEL_PAGE);
        page.parent_id = Some(1);
        page.ordinal = 1;
        let revision = store
            .save_sections(
                5,
                SectionChangeSet {
                    base_revision: 1,
                    upserts: vec![page],
                    deletions: vec![],
                },
            )
            .await
            .unwrap();

        assert_eq!(revision, 2);
        let snapshot = store.load_sections(5).await.unwrap();
        let ids: Vec<SectionId> = snapshot.sections.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 9]);
    }

    #[tokio::test]
    async fn test_stale_revision_is_rejected_without_changes() {
        let store = InMemorySectionStore::new();
        store.save_sections(5, root_change(5, 0)).await.unwrap();

        let err = store
            .save_sections(
                5,
                SectionChangeSet {
                    base_revision: 0,
                    upserts: vec![],
                    deletions: vec![1],
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.load_sections(5).await.unwrap().sections.len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_sections_are_rejected() {
        let store = InMemorySectionStore::new();
        let err = store.save_sections(6, root_change(5, 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignSection { course_id: 6, .. }));
    }

    #[tokio::test]
    async fn test_allocated_ids_follow_seeded_sections() {
        let store = InMemorySectionStore::with_sections(5, vec![Section::new_root(41, 5)]);
        assert_eq!(store.allocate_section_id().await.unwrap(), 42);
        assert_eq!(store.allocate_section_id().await.unwrap(), 43);
        assert_eq!(store.revision(5).await.unwrap(), 1);
    }
}
