//! Section Data Structures
//!
//! This module defines the `Section` record and the small value types that
//! travel with it through the engine.
//!
//! # Architecture
//!
//! - **Arena + id links**: Sections never own each other. The tree is expressed
//!   through `parent_id` and the `prev_sibling_id`/`next_sibling_id` chain,
//!   and the in-memory [`TreeIndex`](crate::tree::TreeIndex) is derived from
//!   these fields on demand.
//! - **Legacy flat view**: `ordinal` doubles as the legacy section number. It is
//!   always a projection of the tree (depth-first order), never an independent
//!   value.
//!
//! # Examples
//!
//! ```rust
//! use multitopic_core::models::{Section, LEVEL_PAGE};
//!
//! let page = Section::new(7, 42, LEVEL_PAGE);
//! assert!(page.is_empty());
//! assert!(page.visible);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of a section record
pub type SectionId = i64;

/// Identity of the course owning a section tree
pub type CourseId = i64;

/// Level of the course's general section (the tree root)
pub const LEVEL_ROOT: u8 = 0;

/// Level of top-level pages
pub const LEVEL_PAGE: u8 = 1;

/// Level of topics (content groups shown inside a page)
pub const LEVEL_TOPIC: u8 = 2;

/// One node of a course's section tree.
///
/// # Fields
///
/// - `id`: Stable identity assigned by the store
/// - `course_id`: Owning course
/// - `ordinal`: Legacy flat section number (0 is always the root)
/// - `level`: Tier in the hierarchy (0 root, 1 page, 2 topic)
/// - `parent_id`: Enclosing section (`None` only for the root)
/// - `prev_sibling_id` / `next_sibling_id`: Ordering links among the parent's children
/// - `visible`: Stored visibility flag
/// - `summary`: Section summary text
/// - `name`: Optional override of the computed default name
/// - `availability`: Serialized availability condition (opaque to this crate)
/// - `available_info`: Display override for availability, cleared by hide cascades
/// - `sequence`: Ids of content items placed in the section
/// - `modified_at`: Last modification timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,

    pub course_id: CourseId,

    pub ordinal: u32,

    pub level: u8,

    pub parent_id: Option<SectionId>,

    pub prev_sibling_id: Option<SectionId>,

    pub next_sibling_id: Option<SectionId>,

    #[serde(default = "default_visible")]
    pub visible: bool,

    #[serde(default)]
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_info: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequence: Vec<i64>,

    pub modified_at: DateTime<Utc>,
}

fn default_visible() -> bool {
    true
}

impl Section {
    /// Create an unlinked, visible section with no content
    ///
    /// Links and ordinal are filled in by the placement engine.
    pub fn new(id: SectionId, course_id: CourseId, level: u8) -> Self {
        Self {
            id,
            course_id,
            ordinal: 0,
            level,
            parent_id: None,
            prev_sibling_id: None,
            next_sibling_id: None,
            visible: true,
            summary: String::new(),
            name: None,
            availability: None,
            available_info: None,
            sequence: Vec::new(),
            modified_at: Utc::now(),
        }
    }

    /// Create the level-0 general section of a course
    pub fn new_root(id: SectionId, course_id: CourseId) -> Self {
        Self::new(id, course_id, LEVEL_ROOT)
    }

    /// Whether this is the course's general section
    pub fn is_root(&self) -> bool {
        self.level == LEVEL_ROOT
    }

    /// Whether this section sits at topic level or deeper
    pub fn is_topic_or_deeper(&self) -> bool {
        self.level >= LEVEL_TOPIC
    }

    /// A section with no summary and no content items can be deleted without
    /// asking for confirmation
    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty() && self.sequence.is_empty()
    }

    /// Compare only the fields the tree engine owns
    pub fn same_placement(&self, other: &Section) -> bool {
        self.ordinal == other.ordinal
            && self.level == other.level
            && self.parent_id == other.parent_id
            && self.prev_sibling_id == other.prev_sibling_id
            && self.next_sibling_id == other.next_sibling_id
    }

    /// Compare every persisted field except the modification timestamp
    pub fn same_content(&self, other: &Section) -> bool {
        self.same_placement(other)
            && self.id == other.id
            && self.course_id == other.course_id
            && self.visible == other.visible
            && self.summary == other.summary
            && self.name == other.name
            && self.availability == other.availability
            && self.available_info == other.available_info
            && self.sequence == other.sequence
    }
}

/// How a caller addresses a section: by stable id or by legacy ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionRef {
    Id(SectionId),
    Ordinal(u32),
}

impl std::fmt::Display for SectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionRef::Id(id) => write!(f, "id {}", id),
            SectionRef::Ordinal(ordinal) => write!(f, "section number {}", ordinal),
        }
    }
}

impl From<SectionId> for SectionRef {
    fn from(id: SectionId) -> Self {
        SectionRef::Id(id)
    }
}

/// Sparse edit of a section's editable fields
///
/// `None` leaves a field untouched. For `name` and `availability`,
/// `Some(None)` clears the override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionUpdate {
    pub name: Option<Option<String>>,
    pub summary: Option<String>,
    pub availability: Option<Option<String>>,
    pub level: Option<u8>,
}

impl SectionUpdate {
    /// Whether the update carries no change at all
    pub fn is_noop(&self) -> bool {
        self.name.is_none()
            && self.summary.is_none()
            && self.availability.is_none()
            && self.level.is_none()
    }
}

/// What to do with the descendants of a section being deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChildPolicy {
    /// Reattach the children to the deleted section's parent, in its place
    Promote,
    /// Delete the whole subtree
    Cascade,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_section_is_unlinked_and_visible() {
        let section = Section::new(5, 1, LEVEL_TOPIC);
        assert_eq!(section.parent_id, None);
        assert_eq!(section.prev_sibling_id, None);
        assert_eq!(section.next_sibling_id, None);
        assert!(section.visible);
        assert!(section.is_topic_or_deeper());
        assert!(!section.is_root());
    }

    #[test]
    fn test_is_empty_considers_summary_and_sequence() {
        let mut section = Section::new(5, 1, LEVEL_PAGE);
        assert!(section.is_empty());

        section.summary = "   ".to_string();
        assert!(section.is_empty());

        section.sequence.push(99);
        assert!(!section.is_empty());

        section.sequence.clear();
        section.summary = "Week one".to_string();
        assert!(!section.is_empty());
    }

    #[test]
    fn test_section_serializes_camel_case() {
        let mut section = Section::new(3, 9, LEVEL_PAGE);
        section.parent_id = Some(1);
        let json = serde_json::to_value(&section).unwrap();

        assert_eq!(json["courseId"], 9);
        assert_eq!(json["parentId"], 1);
        assert!(json.get("name").is_none(), "empty overrides are skipped");

        let back: Section = serde_json::from_value(json).unwrap();
        assert!(back.same_content(&section));
    }

    #[test]
    fn test_visible_defaults_to_true_when_missing() {
        let json = serde_json::json!({
            "id": 2,
            "courseId": 1,
            "ordinal": 1,
            "level": 1,
            "parentId": 1,
            "prevSiblingId": null,
            "nextSiblingId": null,
            "modifiedAt": "2024-01-01T00:00:00Z"
        });
        let section: Section = serde_json::from_value(json).unwrap();
        assert!(section.visible);
        assert!(section.summary.is_empty());
    }

    #[test]
    fn test_section_ref_display() {
        assert_eq!(SectionRef::Id(12).to_string(), "id 12");
        assert_eq!(SectionRef::Ordinal(3).to_string(), "section number 3");
    }
}
