//! Move destination descriptor
//!
//! Transient value describing where a section should go. It is parsed from
//! request parameters by the page layer and consumed once by the placement
//! engine.

use super::section::SectionId;
use serde::{Deserialize, Serialize};

/// Target position of a move
///
/// Any combination of fields may be set. The effective parent is resolved in
/// priority order `parent_id`, then the parent of `prev_sibling_id`, then the
/// parent of `next_sibling_id`. With neither sibling given the section is
/// appended as the last child.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveDestination {
    pub parent_id: Option<SectionId>,
    pub prev_sibling_id: Option<SectionId>,
    pub next_sibling_id: Option<SectionId>,
    pub level: Option<u8>,
}

impl MoveDestination {
    /// Append as last child of `parent_id`
    pub fn under(parent_id: SectionId) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Default::default()
        }
    }

    /// Place directly after `prev_sibling_id`, under the same parent
    pub fn after(prev_sibling_id: SectionId) -> Self {
        Self {
            prev_sibling_id: Some(prev_sibling_id),
            ..Default::default()
        }
    }

    /// Place directly before `next_sibling_id`, under the same parent
    pub fn before(next_sibling_id: SectionId) -> Self {
        Self {
            next_sibling_id: Some(next_sibling_id),
            ..Default::default()
        }
    }

    /// Request an explicit level for the moved section
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    /// Pin the destination parent explicitly
    pub fn with_parent(mut self, parent_id: SectionId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Whether the descriptor names any position at all
    ///
    /// The page layer only builds a move when at least one of parent,
    /// previous or next is present; a bare level is not a destination.
    pub fn is_positioned(&self) -> bool {
        self.parent_id.is_some() || self.prev_sibling_id.is_some() || self.next_sibling_id.is_some()
    }

    /// Whether the move asks to change level, which needs the update capability
    pub fn changes_level(&self) -> bool {
        self.level.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let dest = MoveDestination::after(4).with_parent(1).with_level(2);
        assert_eq!(dest.parent_id, Some(1));
        assert_eq!(dest.prev_sibling_id, Some(4));
        assert_eq!(dest.next_sibling_id, None);
        assert_eq!(dest.level, Some(2));
        assert!(dest.changes_level());
    }

    #[test]
    fn test_level_alone_is_not_a_position() {
        let dest = MoveDestination {
            level: Some(1),
            ..Default::default()
        };
        assert!(!dest.is_positioned());
        assert!(MoveDestination::before(3).is_positioned());
    }
}
