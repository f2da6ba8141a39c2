//! Course tree arena
//!
//! `CourseTree` owns a flat map of a course's sections keyed by id together
//! with the [`TreeIndex`] derived from them. Engine operations clone the tree,
//! rewrite links on the clone and call [`CourseTree::reindex`], which both
//! validates the result and re-derives every ordinal from depth-first order.
//! The original tree is never touched, so a failed operation leaves nothing
//! to roll back.

use super::index::TreeIndex;
use crate::db::{CourseSnapshot, SectionChangeSet};
use crate::models::{CourseId, Section, SectionId, SectionRef};
use crate::services::SectionError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Sections of one course plus their structural index
#[derive(Debug, Clone)]
pub struct CourseTree {
    course_id: CourseId,
    revision: u64,
    sections: BTreeMap<SectionId, Section>,
    index: TreeIndex,
}

impl CourseTree {
    /// Build a tree from stored records, validating structure and ordinals
    ///
    /// # Errors
    ///
    /// `InconsistentTree` if the structure is invalid, a section belongs to
    /// another course, or a stored ordinal disagrees with depth-first order.
    pub fn from_sections(
        course_id: CourseId,
        revision: u64,
        sections: Vec<Section>,
    ) -> Result<Self, SectionError> {
        let foreign: Vec<String> = sections
            .iter()
            .filter(|s| s.course_id != course_id)
            .map(|s| format!("section {} belongs to course {}", s.id, s.course_id))
            .collect();
        if !foreign.is_empty() {
            return Err(SectionError::inconsistent(foreign));
        }

        let index = TreeIndex::rebuild(&sections)?;
        let sections: BTreeMap<SectionId, Section> =
            sections.into_iter().map(|s| (s.id, s)).collect();

        let mismatched: Vec<String> = index
            .depth_first_order()
            .iter()
            .enumerate()
            .filter(|(pos, id)| sections[*id].ordinal as usize != *pos)
            .map(|(pos, id)| {
                format!(
                    "section {} has ordinal {} but is at position {} in tree order",
                    id, sections[id].ordinal, pos
                )
            })
            .collect();
        if !mismatched.is_empty() {
            return Err(SectionError::inconsistent(mismatched));
        }

        Ok(Self {
            course_id,
            revision,
            sections,
            index,
        })
    }

    /// Build a tree from a store snapshot
    pub fn from_snapshot(snapshot: CourseSnapshot) -> Result<Self, SectionError> {
        Self::from_sections(snapshot.course_id, snapshot.revision, snapshot.sections)
    }

    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    /// Store revision this tree was loaded from
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn index(&self) -> &TreeIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn root(&self) -> &Section {
        &self.sections[&self.index.root_id()]
    }

    pub fn get(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(&id)
    }

    /// Section by id, or `NodeNotFound`
    pub fn section(&self, id: SectionId) -> Result<&Section, SectionError> {
        self.sections
            .get(&id)
            .ok_or_else(|| SectionError::node_not_found(id))
    }

    /// Section at a legacy ordinal, or `NodeNotFound`
    pub fn by_ordinal(&self, ordinal: u32) -> Result<&Section, SectionError> {
        self.index
            .depth_first_order()
            .get(ordinal as usize)
            .and_then(|id| self.sections.get(id))
            .ok_or_else(|| SectionError::reference_not_found(SectionRef::Ordinal(ordinal)))
    }

    pub fn resolve(&self, reference: SectionRef) -> Result<&Section, SectionError> {
        match reference {
            SectionRef::Id(id) => self.section(id),
            SectionRef::Ordinal(ordinal) => self.by_ordinal(ordinal),
        }
    }

    /// Sections in depth-first order (ordinal order)
    pub fn sections_in_order(&self) -> impl Iterator<Item = &Section> + '_ {
        self.index
            .depth_first_order()
            .iter()
            .map(move |id| &self.sections[id])
    }

    pub(crate) fn section_mut(&mut self, id: SectionId) -> Result<&mut Section, SectionError> {
        self.sections
            .get_mut(&id)
            .ok_or_else(|| SectionError::node_not_found(id))
    }

    pub(crate) fn insert(&mut self, section: Section) {
        self.sections.insert(section.id, section);
    }

    pub(crate) fn remove(&mut self, id: SectionId) -> Option<Section> {
        self.sections.remove(&id)
    }

    /// Rewrite the parent and sibling links of `children` so they form one
    /// chain under `parent_id`, in the given order
    pub(crate) fn relink_children(
        &mut self,
        parent_id: SectionId,
        children: &[SectionId],
    ) -> Result<(), SectionError> {
        for (pos, id) in children.iter().enumerate() {
            let section = self.section_mut(*id)?;
            section.parent_id = Some(parent_id);
            section.prev_sibling_id = if pos > 0 { Some(children[pos - 1]) } else { None };
            section.next_sibling_id = children.get(pos + 1).copied();
        }
        Ok(())
    }

    /// Shift the level of `ids` by `delta`
    pub(crate) fn shift_levels(&mut self, ids: &[SectionId], delta: i16) -> Result<(), SectionError> {
        if delta == 0 {
            return Ok(());
        }
        for id in ids {
            let section = self.section_mut(*id)?;
            let shifted = section.level as i16 + delta;
            section.level = u8::try_from(shifted).map_err(|_| {
                SectionError::invalid_parent(
                    section.parent_id.unwrap_or(section.id),
                    section.level,
                    format!("level shift by {} leaves the valid range", delta),
                )
            })?;
        }
        Ok(())
    }

    /// Rebuild the index from the current links and re-derive ordinals
    ///
    /// Called after every structural edit. A failure here means the edit
    /// produced an invalid tree and the working copy must be discarded.
    pub(crate) fn reindex(&mut self) -> Result<(), SectionError> {
        let index = TreeIndex::rebuild(self.sections.values())?;
        for (pos, id) in index.depth_first_order().iter().enumerate() {
            if let Some(section) = self.sections.get_mut(id) {
                section.ordinal = pos as u32;
            }
        }
        self.index = index;
        Ok(())
    }

    /// Refresh the index after a non-structural edit (visibility)
    pub(crate) fn refresh_index(&mut self) -> Result<(), SectionError> {
        self.index = TreeIndex::rebuild(self.sections.values())?;
        Ok(())
    }

    /// Collect the records that differ from `base` into a change set
    ///
    /// Changed and new records are stamped with `now`. The change set carries
    /// `base`'s revision so the store can reject it if someone else committed
    /// in between.
    pub fn changes_since(&self, base: &CourseTree, now: DateTime<Utc>) -> SectionChangeSet {
        let mut upserts = Vec::new();
        for (id, section) in &self.sections {
            let changed = match base.sections.get(id) {
                Some(old) => !old.same_content(section),
                None => true,
            };
            if changed {
                let mut record = section.clone();
                record.modified_at = now;
                upserts.push(record);
            }
        }
        let deletions = base
            .sections
            .keys()
            .filter(|id| !self.sections.contains_key(id))
            .copied()
            .collect();

        SectionChangeSet {
            base_revision: base.revision,
            upserts,
            deletions,
        }
    }

    /// Placement-only comparison, ignoring content and timestamps
    pub fn same_structure(&self, other: &CourseTree) -> bool {
        self.sections.len() == other.sections.len()
            && self.sections.iter().all(|(id, section)| {
                other
                    .sections
                    .get(id)
                    .map(|o| o.same_placement(section))
                    .unwrap_or(false)
            })
    }
}
