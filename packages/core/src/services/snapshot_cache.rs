//! Course Tree Snapshot Cache
//!
//! Keeps the most recently indexed [`CourseTree`] of each course so reads do
//! not rebuild the index on every request.
//!
//! # Cache Invalidation
//!
//! The cache uses a hybrid invalidation strategy:
//! - **Time-based**: an entry older than the TTL is reloaded
//! - **Revision-based**: an entry whose revision differs from the store's
//!   current revision is reloaded
//! - **Explicit**: the controller invalidates a course after every write
//!
//! Trees that fail to index are never cached; the `InconsistentTree` error
//! reaches the caller on every access until the data is repaired.

use crate::db::SectionStore;
use crate::models::CourseId;
use crate::services::SectionError;
use crate::tree::CourseTree;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CachedTree {
    tree: Arc<CourseTree>,
    loaded_at: Instant,
}

#[derive(Debug)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<CourseId, CachedTree>>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Current tree of a course, loading and indexing it when needed
    ///
    /// Always asks the store for its revision, so a cached tree is returned
    /// only if nothing was committed since it was loaded.
    pub async fn get(
        &self,
        store: &dyn SectionStore,
        course_id: CourseId,
    ) -> Result<Arc<CourseTree>, SectionError> {
        let revision = store.revision(course_id).await?;
        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(&course_id) {
                if cached.tree.revision() == revision && cached.loaded_at.elapsed() < self.ttl {
                    return Ok(cached.tree.clone());
                }
            }
        }

        let snapshot = store.load_sections(course_id).await?;
        let tree = match CourseTree::from_snapshot(snapshot) {
            Ok(tree) => Arc::new(tree),
            Err(e) => {
                self.invalidate(course_id).await;
                return Err(e);
            }
        };
        tracing::debug!(
            "Indexed course {} at revision {} ({} section(s))",
            course_id,
            tree.revision(),
            tree.len()
        );

        self.entries.write().await.insert(
            course_id,
            CachedTree {
                tree: tree.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(tree)
    }

    pub async fn invalidate(&self, course_id: CourseId) {
        self.entries.write().await.remove(&course_id);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of cached courses
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemorySectionStore, SectionChangeSet};
    use crate::models::{Section, LEVEL_PAGE};

    fn seeded() -> InMemorySectionStore {
        InMemorySectionStore::with_sections(1, vec![Section::new_root(1, 1)])
    }

    #[tokio::test]
    async fn test_hit_returns_same_tree() {
        let store = seeded();
        let cache = SnapshotCache::new(Duration::from_secs(60));

        let first = cache.get(&store, 1).await.unwrap();
        let second = cache.get(&store, 1).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_revision_change_reloads() {
        let store = seeded();
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let before = cache.get(&store, 1).await.unwrap();

        let mut page = Section::new(2, 1, LEVEL_PAGE);
        page.parent_id = Some(1);
        page.ordinal = 1;
        store
            .save_sections(
                1,
                SectionChangeSet {
                    base_revision: before.revision(),
                    upserts: vec![page],
                    deletions: vec![],
                },
            )
            .await
            .unwrap();

        let after = cache.get(&store, 1).await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after.revision(), before.revision() + 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_reloads() {
        let store = seeded();
        let cache = SnapshotCache::new(Duration::ZERO);

        let first = cache.get(&store, 1).await.unwrap();
        let second = cache.get(&store, 1).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_inconsistent_tree_is_not_cached() {
        let mut orphan = Section::new(2, 1, LEVEL_PAGE);
        orphan.parent_id = Some(99);
        orphan.ordinal = 1;
        let store = InMemorySectionStore::with_sections(1, vec![Section::new_root(1, 1), orphan]);
        let cache = SnapshotCache::new(Duration::from_secs(60));

        let err = cache.get(&store, 1).await.unwrap_err();
        assert!(matches!(err, SectionError::InconsistentTree { .. }));
        assert!(cache.is_empty().await);
    }
}
