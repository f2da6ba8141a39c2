//! Domain Events for the Section Controller
//!
//! This module defines the events emitted after a section operation commits.
//! They follow the observer pattern, so caches, UI bridges and audit logs can
//! subscribe to course changes without coupling to the store implementation.
//!
//! # Architecture
//!
//! Events are published on a tokio broadcast channel, allowing multiple
//! subscribers to receive notifications asynchronously. An event is only
//! published once its change set has been accepted by the store.

use crate::models::{CourseId, Section, SectionId};
use serde::{Deserialize, Serialize};

/// Section-level change published after a successful commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SectionEvent {
    /// A section was inserted into the tree
    #[serde(rename = "section:created")]
    Created { section: Section },

    /// Name, summary or availability changed
    #[serde(rename = "section:updated")]
    Updated { section: Section },

    /// A section (with its subtree) was placed elsewhere
    #[serde(rename = "section:moved", rename_all = "camelCase")]
    Moved {
        course_id: CourseId,
        section_id: SectionId,
        from_parent_id: Option<SectionId>,
        to_parent_id: Option<SectionId>,
        level: u8,
        ordinal: u32,
    },

    /// Sections were removed; `promoted_ids` lists children that survived
    #[serde(rename = "section:deleted", rename_all = "camelCase")]
    Deleted {
        course_id: CourseId,
        section_id: SectionId,
        removed_ids: Vec<SectionId>,
        promoted_ids: Vec<SectionId>,
    },

    /// Show/hide, with the descendants overwritten by a hide cascade
    #[serde(rename = "section:visibilityChanged", rename_all = "camelCase")]
    VisibilityChanged {
        course_id: CourseId,
        section_id: SectionId,
        visible: bool,
        cascaded_ids: Vec<SectionId>,
    },
}

impl SectionEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            SectionEvent::Created { .. } => "section:created",
            SectionEvent::Updated { .. } => "section:updated",
            SectionEvent::Moved { .. } => "section:moved",
            SectionEvent::Deleted { .. } => "section:deleted",
            SectionEvent::VisibilityChanged { .. } => "section:visibilityChanged",
        }
    }

    pub fn course_id(&self) -> CourseId {
        match self {
            SectionEvent::Created { section } | SectionEvent::Updated { section } => {
                section.course_id
            }
            SectionEvent::Moved { course_id, .. }
            | SectionEvent::Deleted { course_id, .. }
            | SectionEvent::VisibilityChanged { course_id, .. } => *course_id,
        }
    }

    /// Section the operation was addressed to
    pub fn section_id(&self) -> SectionId {
        match self {
            SectionEvent::Created { section } | SectionEvent::Updated { section } => section.id,
            SectionEvent::Moved { section_id, .. }
            | SectionEvent::Deleted { section_id, .. }
            | SectionEvent::VisibilityChanged { section_id, .. } => *section_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Contract test: the wire format is internally tagged and flat
    #[test]
    fn test_section_event_serialization_contract() {
        let event = SectionEvent::VisibilityChanged {
            course_id: 3,
            section_id: 7,
            visible: false,
            cascaded_ids: vec![8, 9],
        };

        let parsed: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed.get("type").unwrap(), "section:visibilityChanged");
        assert_eq!(parsed.get("sectionId").unwrap(), 7);
        assert_eq!(parsed.get("cascadedIds").unwrap(), &serde_json::json!([8, 9]));
        assert!(parsed.get("visibilityChanged").is_none());
        assert_eq!(event.event_type(), "section:visibilityChanged");
    }

    #[test]
    fn test_accessors_cover_section_payloads() {
        let section = Section::new(12, 4, crate::models::LEVEL_PAGE);
        let event = SectionEvent::Created { section };
        assert_eq!(event.course_id(), 4);
        assert_eq!(event.section_id(), 12);

        let json = serde_json::to_string(&event).unwrap();
        let back: SectionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
