//! Store Error Types
//!
//! This module defines error types for section store operations: optimistic
//! concurrency conflicts, file I/O and (de)serialization failures.

use crate::models::CourseId;
use std::path::PathBuf;
use thiserror::Error;

/// Section store errors
///
/// Structural problems with the tree itself are not store errors; they are
/// detected by the tree index and reported as
/// [`SectionError::InconsistentTree`](crate::services::SectionError).
#[derive(Error, Debug)]
pub enum StoreError {
    /// The change set was computed from a revision that is no longer current
    #[error("Revision conflict for course {course_id}: expected revision {expected}, found {actual}")]
    RevisionConflict {
        course_id: CourseId,
        expected: u64,
        actual: u64,
    },

    /// A change set referenced a section belonging to another course
    #[error("Section {section_id} does not belong to course {course_id}")]
    ForeignSection {
        course_id: CourseId,
        section_id: i64,
    },

    /// Failed to read or write the backing file
    #[error("Store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Stored data could not be (de)serialized
    #[error("Store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("Store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a revision conflict error
    pub fn revision_conflict(course_id: CourseId, expected: u64, actual: u64) -> Self {
        Self::RevisionConflict {
            course_id,
            expected,
            actual,
        }
    }

    /// Create an I/O error with the offending path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a generic backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether retrying against fresh state can succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::RevisionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::revision_conflict(4, 2, 3);
        assert_eq!(
            err.to_string(),
            "Revision conflict for course 4: expected revision 2, found 3"
        );
        assert!(err.is_conflict());

        let err = StoreError::backend("disk full");
        assert_eq!(err.to_string(), "Store backend failure: disk full");
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json")
            .expect_err("Should fail to parse");
        let err: StoreError = json_error.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
