//! Section Tree Tests
//!
//! End-to-end tests through the public controller API against the
//! in-memory store.
//!
//! ## Test Coverage
//! - Worked examples: move with level change, promote on delete, protected root
//! - Tree invariants after a mixed sequence of operations
//! - Concurrent writers on one course never leave an inconsistent tree
//! - Sibling chains after a leaf delete

#[cfg(test)]
mod section_tree_tests {
    use anyhow::Result;
    use multitopic_core::db::{InMemorySectionStore, SectionStore};
    use multitopic_core::models::{ChildPolicy, MoveDestination, SectionId, LEVEL_PAGE};
    use multitopic_core::services::{
        AllowAll, ControllerResponse, DeleteOutcome, RequestContext, SectionController,
    };
    use multitopic_core::{CourseTree, Section, TreeConfig};
    use std::sync::Arc;

    const COURSE: i64 = 11;

    fn ctx() -> RequestContext {
        RequestContext::new("editor", COURSE).with_session_key(true)
    }

    fn new_controller(store: Arc<InMemorySectionStore>) -> Result<SectionController> {
        let config = TreeConfig {
            retry_base_delay_ms: 1,
            max_retries: 8,
            ..TreeConfig::default()
        };
        Ok(SectionController::new(store, Arc::new(AllowAll), &config)?)
    }

    fn done<T>(response: ControllerResponse<T>) -> T {
        match response {
            ControllerResponse::Done(value) => value,
            ControllerResponse::Notice(notice) => panic!("unexpected notice: {}", notice.message),
        }
    }

    /// A(root) -> [B -> [C], D]
    async fn abcd(controller: &SectionController) -> Result<[SectionId; 4]> {
        let ctx = ctx();
        let a = controller.ensure_root(&ctx).await?.id;
        let b = done(controller.create_section(&ctx, a, Some(1)).await?).id;
        let c = done(controller.create_section(&ctx, b, Some(2)).await?).id;
        let d = done(controller.create_section(&ctx, a, Some(1)).await?).id;
        Ok([a, b, c, d])
    }

    /// Load the stored course and check it indexes cleanly
    async fn stored_tree(store: &InMemorySectionStore) -> Result<CourseTree> {
        Ok(CourseTree::from_snapshot(store.load_sections(COURSE).await?)?)
    }

    fn order(tree: &CourseTree) -> Vec<SectionId> {
        tree.sections_in_order().map(|s| s.id).collect()
    }

    fn assert_invariants(tree: &CourseTree) {
        for (pos, section) in tree.sections_in_order().enumerate() {
            assert_eq!(section.ordinal as usize, pos);
            if let Some(parent_id) = section.parent_id {
                let parent: &Section = tree.section(parent_id).unwrap();
                assert!(section.level >= parent.level);
                assert!(!tree
                    .index()
                    .descendants_of(section.id)
                    .unwrap()
                    .contains(&parent_id));
            }
        }
    }

    #[tokio::test]
    async fn test_move_with_level_change_renumbers_depth_first() -> Result<()> {
        let store = Arc::new(InMemorySectionStore::new());
        let controller = new_controller(store.clone())?;
        let [a, b, c, d] = abcd(&controller).await?;

        let moved = done(
            controller
                .move_section(
                    &ctx(),
                    c,
                    MoveDestination::after(d).with_parent(a).with_level(LEVEL_PAGE),
                )
                .await?,
        );
        assert_eq!(moved.level, LEVEL_PAGE);
        assert_eq!(moved.parent_id, Some(a));

        let tree = stored_tree(&store).await?;
        assert_eq!(tree.index().children_of(a)?, &[b, d, c]);
        let ordinals: Vec<(SectionId, u32)> =
            tree.sections_in_order().map(|s| (s.id, s.ordinal)).collect();
        assert_eq!(ordinals, vec![(a, 0), (b, 1), (d, 2), (c, 3)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_promote_delete_reattaches_children() -> Result<()> {
        let store = Arc::new(InMemorySectionStore::new());
        let controller = new_controller(store.clone())?;
        let [a, b, c, d] = abcd(&controller).await?;

        let outcome = done(
            controller
                .delete_section(&ctx(), b, true, Some(ChildPolicy::Promote))
                .await?,
        );
        assert!(matches!(outcome, DeleteOutcome::Deleted { ref removed_ids, .. } if removed_ids == &vec![b]));

        let tree = stored_tree(&store).await?;
        assert_eq!(order(&tree), vec![a, c, d]);
        assert_eq!(tree.section(c)?.parent_id, Some(a));
        assert!(tree.get(b).is_none());
        assert_invariants(&tree);
        Ok(())
    }

    #[tokio::test]
    async fn test_root_cannot_move() -> Result<()> {
        let store = Arc::new(InMemorySectionStore::new());
        let controller = new_controller(store.clone())?;
        let [a, _, _, d] = abcd(&controller).await?;
        let before = store.load_sections(COURSE).await?;

        let response = controller
            .move_section(&ctx(), a, MoveDestination::after(d))
            .await?;
        assert_eq!(response.notice().map(|n| n.code.as_str()), Some("protectedsection"));
        assert_eq!(store.load_sections(COURSE).await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_leaf_delete_keeps_sibling_chain() -> Result<()> {
        let store = Arc::new(InMemorySectionStore::new());
        let controller = new_controller(store.clone())?;
        let [a, b, _, d] = abcd(&controller).await?;
        let e = done(controller.create_section(&ctx(), a, None).await?).id;

        done(controller.delete_section(&ctx(), d, true, None).await?);

        let tree = stored_tree(&store).await?;
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.section(b)?.next_sibling_id, Some(e));
        assert_eq!(tree.section(e)?.prev_sibling_id, Some(b));
        assert!(tree
            .sections_in_order()
            .all(|s| s.prev_sibling_id != Some(d) && s.next_sibling_id != Some(d)));
        Ok(())
    }

    #[tokio::test]
    async fn test_mixed_operations_preserve_invariants() -> Result<()> {
        let store = Arc::new(InMemorySectionStore::new());
        let controller = new_controller(store.clone())?;
        let [a, b, c, d] = abcd(&controller).await?;
        let ctx = ctx();

        let e = done(controller.create_section(&ctx, d, None).await?).id;
        let f = done(controller.create_section(&ctx, d, None).await?).id;
        assert_invariants(&stored_tree(&store).await?);

        done(controller.move_section(&ctx, f, MoveDestination::before(e)).await?);
        assert_invariants(&stored_tree(&store).await?);

        done(controller.move_section(&ctx, d, MoveDestination::before(b)).await?);
        assert_invariants(&stored_tree(&store).await?);

        done(controller.set_visibility(&ctx, d, false).await?);
        done(
            controller
                .delete_section(&ctx, b, true, Some(ChildPolicy::Cascade))
                .await?,
        );

        let tree = stored_tree(&store).await?;
        assert_invariants(&tree);
        assert_eq!(order(&tree), vec![a, d, f, e]);
        assert!(tree.get(c).is_none());
        assert!(!tree.section(f)?.visible);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_writers_stay_consistent() -> Result<()> {
        let store = Arc::new(InMemorySectionStore::new());
        let first = Arc::new(new_controller(store.clone())?);
        let second = Arc::new(new_controller(store.clone())?);
        let root = first.ensure_root(&ctx()).await?.id;

        let mut handles = Vec::new();
        for controller in [first.clone(), second.clone()] {
            handles.push(tokio::spawn(async move {
                let ctx = ctx();
                let mut created = Vec::new();
                for _ in 0..5 {
                    let page = controller.create_section(&ctx, root, None).await?;
                    created.push(done(page).id);
                }
                // Move the first page of this writer to the end
                controller
                    .move_section(&ctx, created[0], MoveDestination::under(root))
                    .await?;
                Ok::<_, multitopic_core::SectionError>(created)
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let tree = stored_tree(&store).await?;
        assert_eq!(tree.len(), 11);
        assert_invariants(&tree);
        Ok(())
    }
}
