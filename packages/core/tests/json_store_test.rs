//! JSON File Store Tests
//!
//! Integration tests for the file-backed section store and the controller
//! running on top of it.
//!
//! ## Test Coverage
//! - Course files survive reopening the store
//! - Id allocation resumes after the largest stored id
//! - Stale change sets are rejected without touching the file
//! - Corrupt course files surface as serialization errors

#[cfg(test)]
mod json_store_tests {
    use anyhow::Result;
    use multitopic_core::db::{JsonFileSectionStore, SectionChangeSet, SectionStore, StoreError};
    use multitopic_core::models::{MoveDestination, Section, LEVEL_PAGE};
    use multitopic_core::services::{AllowAll, RequestContext, SectionController};
    use multitopic_core::TreeConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    const COURSE: i64 = 3;

    async fn open_controller(dir: &TempDir) -> Result<SectionController> {
        let store = JsonFileSectionStore::open(dir.path()).await?;
        Ok(SectionController::new(
            Arc::new(store),
            Arc::new(AllowAll),
            &TreeConfig::default(),
        )?)
    }

    #[tokio::test]
    async fn test_course_survives_reopen() -> Result<()> {
        let dir = TempDir::new()?;
        let ctx = RequestContext::new("editor", COURSE).with_session_key(true);

        let (root, first, second) = {
            let controller = open_controller(&dir).await?;
            let root = controller.ensure_root(&ctx).await?.id;
            let first = controller
                .create_section(&ctx, root, None)
                .await?
                .done()
                .expect("page created")
                .id;
            let second = controller
                .create_section(&ctx, root, None)
                .await?
                .done()
                .expect("page created")
                .id;
            controller
                .move_section(&ctx, second, MoveDestination::before(first))
                .await?;
            (root, first, second)
        };

        let controller = open_controller(&dir).await?;
        let rows = controller.outline(&ctx).await?;
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![root, second, first]);
        assert_eq!(rows[1].display_name, "Page 1");

        // Fresh ids continue after the stored ones
        let third = controller.store().allocate_section_id().await?;
        assert!(third > first.max(second));
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_revision_leaves_file_untouched() -> Result<()> {
        let dir = TempDir::new()?;
        let store = JsonFileSectionStore::open(dir.path()).await?;

        let revision = store
            .save_sections(
                COURSE,
                SectionChangeSet {
                    base_revision: 0,
                    upserts: vec![Section::new_root(1, COURSE)],
                    deletions: vec![],
                },
            )
            .await?;
        assert_eq!(revision, 1);
        let before = std::fs::read_to_string(store.course_path(COURSE))?;

        let mut page = Section::new(2, COURSE, LEVEL_PAGE);
        page.parent_id = Some(1);
        page.ordinal = 1;
        let err = store
            .save_sections(
                COURSE,
                SectionChangeSet {
                    base_revision: 0,
                    upserts: vec![page],
                    deletions: vec![],
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StoreError::RevisionConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
        assert_eq!(std::fs::read_to_string(store.course_path(COURSE))?, before);
        Ok(())
    }

    #[test]
    fn test_corrupt_file_fails_open() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("course-9.json"), "{ not json")?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let result = tokio_test::block_on(JsonFileSectionStore::open(dir.path()));
        assert!(matches!(result, Err(StoreError::Serialization(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_course_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let store = JsonFileSectionStore::open(dir.path()).await?;

        let snapshot = store.load_sections(77).await?;
        assert_eq!(snapshot.revision, 0);
        assert!(snapshot.sections.is_empty());
        assert!(!store.course_path(77).exists());
        Ok(())
    }
}
