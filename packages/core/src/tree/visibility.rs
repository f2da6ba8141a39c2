//! Visibility Propagator
//!
//! Applies show/hide state to a section and cascades hides to its
//! descendants.
//!
//! Hiding is destructive: every descendant's stored flag is overwritten with
//! `false` and its `available_info` override is cleared. Showing only touches
//! the section itself, so descendants stay hidden until they are shown one by
//! one. No pre-hide state is remembered.

use super::course_tree::CourseTree;
use crate::models::SectionId;
use crate::services::SectionError;

/// Outcome of a visibility change
#[derive(Debug, Clone)]
pub struct VisibilityChange {
    pub tree: CourseTree,
    /// Descendants whose flag was overwritten by a hide cascade
    pub cascaded_ids: Vec<SectionId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityPropagator;

impl VisibilityPropagator {
    pub fn new() -> Self {
        Self
    }

    /// Set a section's visible flag, cascading hides to all descendants
    ///
    /// # Errors
    ///
    /// `NodeNotFound` for an unknown id.
    pub fn set_visible(
        &self,
        tree: &CourseTree,
        id: SectionId,
        visible: bool,
    ) -> Result<VisibilityChange, SectionError> {
        tree.section(id)?;
        let mut next = tree.clone();
        next.section_mut(id)?.visible = visible;

        let mut cascaded_ids = Vec::new();
        if !visible {
            for descendant in tree.index().descendants_of(id)? {
                let section = next.section_mut(*descendant)?;
                if section.visible || section.available_info.is_some() {
                    cascaded_ids.push(*descendant);
                }
                section.visible = false;
                section.available_info = None;
            }
        }
        next.refresh_index()?;

        tracing::debug!(
            "Section {} visible={} ({} descendant(s) hidden by cascade)",
            id,
            visible,
            cascaded_ids.len()
        );
        Ok(VisibilityChange { tree: next, cascaded_ids })
    }
}
