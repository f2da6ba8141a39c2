//! JSON file section store
//!
//! Persists each course as one pretty-printed JSON document named
//! `course-<id>.json` inside a data directory. Writes go to a temporary file
//! that is renamed over the original, so a crash never leaves a half-written
//! course behind.
//!
//! Section ids are allocated from a counter seeded with the largest id found
//! across all course files when the store is opened.

use super::error::StoreError;
use super::section_store::{check_course, CourseSnapshot, SectionChangeSet, SectionStore};
use crate::models::{CourseId, SectionId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

const FILE_PREFIX: &str = "course-";
const FILE_SUFFIX: &str = ".json";

/// Section store backed by one JSON file per course
#[derive(Debug)]
pub struct JsonFileSectionStore {
    dir: PathBuf,
    next_id: AtomicI64,
    /// Serializes the read-compare-write cycle of `save_sections`
    write_lock: Mutex<()>,
}

impl JsonFileSectionStore {
    /// Open (creating if needed) a store rooted at `dir`
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or an existing course file
    /// cannot be parsed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let mut max_id: SectionId = 0;
        let mut courses = 0usize;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            let path = entry.path();
            if course_id_from_path(&path).is_none() {
                continue;
            }
            let snapshot = read_snapshot(&path).await?;
            courses += 1;
            if let Some(id) = snapshot.sections.iter().map(|s| s.id).max() {
                max_id = max_id.max(id);
            }
        }

        tracing::info!(
            "Opened JSON section store at {} ({} course file(s), next id {})",
            dir.display(),
            courses,
            max_id + 1
        );

        Ok(Self {
            dir,
            next_id: AtomicI64::new(max_id + 1),
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a course's JSON document
    pub fn course_path(&self, course_id: CourseId) -> PathBuf {
        self.dir.join(format!("{}{}{}", FILE_PREFIX, course_id, FILE_SUFFIX))
    }

    async fn read_course(&self, course_id: CourseId) -> Result<CourseSnapshot, StoreError> {
        let path = self.course_path(course_id);
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?
        {
            return Ok(CourseSnapshot {
                course_id,
                revision: 0,
                sections: Vec::new(),
            });
        }
        let snapshot = read_snapshot(&path).await?;
        if snapshot.course_id != course_id {
            return Err(StoreError::backend(format!(
                "{} holds course {}, expected {}",
                path.display(),
                snapshot.course_id,
                course_id
            )));
        }
        Ok(snapshot)
    }

    async fn write_course(&self, snapshot: &CourseSnapshot) -> Result<(), StoreError> {
        let path = self.course_path(snapshot.course_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }
}

#[async_trait]
impl SectionStore for JsonFileSectionStore {
    async fn load_sections(&self, course_id: CourseId) -> Result<CourseSnapshot, StoreError> {
        let mut snapshot = self.read_course(course_id).await?;
        snapshot.sections.sort_by_key(|s| (s.ordinal, s.id));
        Ok(snapshot)
    }

    async fn save_sections(
        &self,
        course_id: CourseId,
        changes: SectionChangeSet,
    ) -> Result<u64, StoreError> {
        check_course(course_id, &changes)?;
        let _guard = self.write_lock.lock().await;

        let current = self.read_course(course_id).await?;
        if current.revision != changes.base_revision {
            return Err(StoreError::revision_conflict(
                course_id,
                changes.base_revision,
                current.revision,
            ));
        }

        let mut sections: BTreeMap<SectionId, _> =
            current.sections.into_iter().map(|s| (s.id, s)).collect();
        for id in &changes.deletions {
            sections.remove(id);
        }
        for section in changes.upserts {
            sections.insert(section.id, section);
        }
        let mut ordered: Vec<_> = sections.into_values().collect();
        ordered.sort_by_key(|s| (s.ordinal, s.id));

        let snapshot = CourseSnapshot {
            course_id,
            revision: current.revision + 1,
            sections: ordered,
        };
        self.write_course(&snapshot).await?;

        tracing::debug!(
            "Wrote course {} revision {} ({} section(s))",
            course_id,
            snapshot.revision,
            snapshot.sections.len()
        );
        Ok(snapshot.revision)
    }

    async fn revision(&self, course_id: CourseId) -> Result<u64, StoreError> {
        Ok(self.read_course(course_id).await?.revision)
    }

    async fn allocate_section_id(&self) -> Result<SectionId, StoreError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

fn course_id_from_path(path: &Path) -> Option<CourseId> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

async fn read_snapshot(path: &Path) -> Result<CourseSnapshot, StoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}
