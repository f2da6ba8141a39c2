//! Tree Index
//!
//! Derived, in-memory structure answering structural queries about one
//! course's section tree without rescanning the flat record list.
//!
//! # Architecture
//!
//! The index is rebuilt from the flat collection of [`Section`] records (the
//! persisted "arena + id links" representation). While rebuilding it checks
//! every structural invariant and reports *all* violations it finds as
//! diagnostics of a single [`SectionError::InconsistentTree`]. It never
//! repairs anything.
//!
//! # Performance
//!
//! - `parent_of`, `children_of`, `level_of`, `ordinal_of`: O(1) map lookups
//! - `is_descendant`: O(1) using depth-first positions and subtree sizes
//! - `ancestors_of`, `is_effectively_visible`: O(depth)
//! - `rebuild`: O(n)

use crate::models::{Section, SectionId, LEVEL_ROOT};
use crate::services::SectionError;
use std::collections::{HashMap, HashSet};

/// Structural index over one course's sections
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    root_id: SectionId,
    parents: HashMap<SectionId, Option<SectionId>>,
    children: HashMap<SectionId, Vec<SectionId>>,
    levels: HashMap<SectionId, u8>,
    visible: HashMap<SectionId, bool>,
    /// Depth-first order, siblings in link order
    order: Vec<SectionId>,
    /// Position of each section in `order`
    positions: HashMap<SectionId, usize>,
    /// Number of sections in each subtree, including its root
    subtree_sizes: HashMap<SectionId, usize>,
}

impl TreeIndex {
    /// Reconstruct the index from the full collection of a course's sections
    ///
    /// # Errors
    ///
    /// Returns `InconsistentTree` listing every violation found:
    /// - missing or duplicated level-0 section, duplicated ids
    /// - dangling parent or sibling references
    /// - asymmetric or cross-parent sibling links, broken sibling chains
    /// - levels shallower than the parent's level
    /// - cycles (sections unreachable from the root)
    pub fn rebuild<'a, I>(sections: I) -> Result<Self, SectionError>
    where
        I: IntoIterator<Item = &'a Section>,
    {
        let mut diagnostics = Vec::new();
        let mut by_id: HashMap<SectionId, &Section> = HashMap::new();

        for section in sections {
            if by_id.insert(section.id, section).is_some() {
                diagnostics.push(format!("duplicate section id {}", section.id));
            }
        }

        // Root detection
        let roots: Vec<&Section> = by_id.values().copied().filter(|s| s.parent_id.is_none()).collect();
        let root_id = match roots.as_slice() {
            [] => {
                diagnostics.push("course has no general (level-0) section".to_string());
                None
            }
            [root] => {
                if root.level != LEVEL_ROOT {
                    diagnostics.push(format!(
                        "section {} has no parent but is at level {}",
                        root.id, root.level
                    ));
                }
                if root.prev_sibling_id.is_some() || root.next_sibling_id.is_some() {
                    diagnostics.push(format!("general section {} has sibling links", root.id));
                }
                Some(root.id)
            }
            many => {
                let mut ids: Vec<SectionId> = many.iter().map(|s| s.id).collect();
                ids.sort_unstable();
                diagnostics.push(format!("course has several parentless sections: {:?}", ids));
                None
            }
        };

        // Parent references and levels
        let mut grouped: HashMap<SectionId, Vec<&Section>> = HashMap::new();
        for section in by_id.values() {
            let Some(parent_id) = section.parent_id else {
                continue;
            };
            if section.level == LEVEL_ROOT {
                diagnostics.push(format!("section {} is at level 0 but has a parent", section.id));
            }
            match by_id.get(&parent_id) {
                None => diagnostics.push(format!(
                    "section {} references missing parent {}",
                    section.id, parent_id
                )),
                Some(parent) => {
                    if section.level < parent.level {
                        diagnostics.push(format!(
                            "section {} at level {} is shallower than its parent {} at level {}",
                            section.id, section.level, parent.id, parent.level
                        ));
                    }
                    grouped.entry(parent_id).or_default().push(*section);
                }
            }
        }

        // Sibling links
        for section in by_id.values() {
            if let Some(prev_id) = section.prev_sibling_id {
                match by_id.get(&prev_id) {
                    None => diagnostics.push(format!(
                        "section {} references missing previous sibling {}",
                        section.id, prev_id
                    )),
                    Some(prev) => {
                        if prev.next_sibling_id != Some(section.id) {
                            diagnostics.push(format!(
                                "sibling link {} -> {} is not mirrored",
                                prev.id, section.id
                            ));
                        }
                        check_sibling_pair(prev, section, &mut diagnostics);
                    }
                }
            }
            if let Some(next_id) = section.next_sibling_id {
                match by_id.get(&next_id) {
                    None => diagnostics.push(format!(
                        "section {} references missing next sibling {}",
                        section.id, next_id
                    )),
                    Some(next) => {
                        if next.prev_sibling_id != Some(section.id) {
                            diagnostics.push(format!(
                                "sibling link {} <- {} is not mirrored",
                                section.id, next.id
                            ));
                        }
                    }
                }
            }
        }

        // Ordered children per parent, following the chain from its head
        let mut children: HashMap<SectionId, Vec<SectionId>> = HashMap::new();
        for (parent_id, kids) in &grouped {
            let heads: Vec<&&Section> = kids.iter().filter(|s| s.prev_sibling_id.is_none()).collect();
            if heads.len() != 1 {
                diagnostics.push(format!(
                    "children of section {} have {} chain heads instead of 1",
                    parent_id,
                    heads.len()
                ));
                continue;
            }
            let member_ids: HashSet<SectionId> = kids.iter().map(|s| s.id).collect();
            let mut chain = Vec::with_capacity(kids.len());
            let mut seen = HashSet::new();
            let mut cursor = Some(heads[0].id);
            while let Some(id) = cursor {
                if !member_ids.contains(&id) || !seen.insert(id) {
                    break;
                }
                chain.push(id);
                cursor = by_id.get(&id).and_then(|s| s.next_sibling_id);
            }
            if chain.len() != kids.len() {
                diagnostics.push(format!(
                    "sibling chain under section {} covers {} of {} children",
                    parent_id,
                    chain.len(),
                    kids.len()
                ));
                continue;
            }
            children.insert(*parent_id, chain);
        }

        if !diagnostics.is_empty() {
            diagnostics.sort();
            return Err(SectionError::inconsistent(diagnostics));
        }
        let Some(root_id) = root_id else {
            return Err(SectionError::inconsistent(vec![
                "course has no general (level-0) section".to_string(),
            ]));
        };

        // Depth-first walk from the root; anything not reached sits on a cycle
        let mut order = Vec::with_capacity(by_id.len());
        let mut stack = vec![root_id];
        let mut reached = HashSet::new();
        while let Some(id) = stack.pop() {
            if !reached.insert(id) {
                continue;
            }
            order.push(id);
            if let Some(kids) = children.get(&id) {
                stack.extend(kids.iter().rev().copied());
            }
        }
        if order.len() != by_id.len() {
            let mut unreachable: Vec<SectionId> = by_id
                .keys()
                .copied()
                .filter(|id| !reached.contains(id))
                .collect();
            unreachable.sort_unstable();
            return Err(SectionError::inconsistent(vec![format!(
                "sections {:?} are not reachable from the general section (cycle)",
                unreachable
            )]));
        }

        let positions: HashMap<SectionId, usize> =
            order.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();

        // Subtree sizes, accumulated bottom-up in reverse depth-first order
        let mut subtree_sizes: HashMap<SectionId, usize> = HashMap::with_capacity(order.len());
        for id in order.iter().rev() {
            let size = 1 + children
                .get(id)
                .map(|kids| kids.iter().map(|k| subtree_sizes[k]).sum::<usize>())
                .unwrap_or(0);
            subtree_sizes.insert(*id, size);
        }

        Ok(Self {
            root_id,
            parents: by_id.values().map(|s| (s.id, s.parent_id)).collect(),
            levels: by_id.values().map(|s| (s.id, s.level)).collect(),
            visible: by_id.values().map(|s| (s.id, s.visible)).collect(),
            children,
            order,
            positions,
            subtree_sizes,
        })
    }

    /// Id of the course's general section
    pub fn root_id(&self) -> SectionId {
        self.root_id
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: SectionId) -> bool {
        self.positions.contains_key(&id)
    }

    fn ensure(&self, id: SectionId) -> Result<(), SectionError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(SectionError::node_not_found(id))
        }
    }

    /// Parent of a section (`None` for the general section)
    pub fn parent_of(&self, id: SectionId) -> Result<Option<SectionId>, SectionError> {
        self.parents
            .get(&id)
            .copied()
            .ok_or_else(|| SectionError::node_not_found(id))
    }

    /// Children of a section in sibling order
    pub fn children_of(&self, id: SectionId) -> Result<&[SectionId], SectionError> {
        self.ensure(id)?;
        Ok(self.children.get(&id).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// All children of the section's parent in sibling order, the section included
    pub fn siblings_of(&self, id: SectionId) -> Result<Vec<SectionId>, SectionError> {
        match self.parent_of(id)? {
            Some(parent_id) => Ok(self.children_of(parent_id)?.to_vec()),
            None => Ok(vec![id]),
        }
    }

    /// Path from the general section down to `id`, both included
    pub fn ancestors_of(&self, id: SectionId) -> Result<Vec<SectionId>, SectionError> {
        let mut path = vec![id];
        let mut current = self.parent_of(id)?;
        while let Some(parent_id) = current {
            path.push(parent_id);
            current = self.parent_of(parent_id)?;
        }
        path.reverse();
        Ok(path)
    }

    /// All descendants of `id` in depth-first order, `id` excluded
    pub fn descendants_of(&self, id: SectionId) -> Result<&[SectionId], SectionError> {
        let pos = *self
            .positions
            .get(&id)
            .ok_or_else(|| SectionError::node_not_found(id))?;
        let size = self.subtree_sizes[&id];
        Ok(&self.order[pos + 1..pos + size])
    }

    /// Whether `candidate` lies strictly inside the subtree rooted at `ancestor`
    pub fn is_descendant(&self, ancestor: SectionId, candidate: SectionId) -> bool {
        match (self.positions.get(&ancestor), self.positions.get(&candidate)) {
            (Some(&a), Some(&c)) => c > a && c < a + self.subtree_sizes[&ancestor],
            _ => false,
        }
    }

    /// Every section in depth-first order, siblings in link order
    pub fn depth_first_order(&self) -> &[SectionId] {
        &self.order
    }

    /// Depth-first position of a section, which is its expected ordinal
    pub fn ordinal_of(&self, id: SectionId) -> Result<u32, SectionError> {
        self.positions
            .get(&id)
            .map(|pos| *pos as u32)
            .ok_or_else(|| SectionError::node_not_found(id))
    }

    pub fn level_of(&self, id: SectionId) -> Result<u8, SectionError> {
        self.levels
            .get(&id)
            .copied()
            .ok_or_else(|| SectionError::node_not_found(id))
    }

    /// Level shared by the section's current children, if it has any
    pub fn child_level_of(&self, id: SectionId) -> Result<Option<u8>, SectionError> {
        let kids = self.children_of(id)?;
        Ok(kids.first().map(|first| self.levels[first]))
    }

    /// Deepest level found in the subtree rooted at `id`
    pub fn max_level_in_subtree(&self, id: SectionId) -> Result<u8, SectionError> {
        let own = self.level_of(id)?;
        Ok(self
            .descendants_of(id)?
            .iter()
            .map(|d| self.levels[d])
            .fold(own, u8::max))
    }

    /// A section is effectively visible when it and all its ancestors are visible
    pub fn is_effectively_visible(&self, id: SectionId) -> Result<bool, SectionError> {
        Ok(self
            .ancestors_of(id)?
            .iter()
            .all(|a| self.visible.get(a).copied().unwrap_or(false)))
    }

    /// Previous section at the same level in the flat (depth-first) sequence
    ///
    /// The walk stops at the first section of a shallower level, so the result
    /// never leaves the enclosing container.
    pub fn previous_at_level(&self, id: SectionId) -> Result<Option<SectionId>, SectionError> {
        let level = self.level_of(id)?;
        let pos = self.positions[&id];
        for candidate in self.order[..pos].iter().rev() {
            let candidate_level = self.levels[candidate];
            if candidate_level == level {
                return Ok(Some(*candidate));
            }
            if candidate_level < level {
                break;
            }
        }
        Ok(None)
    }
}

fn check_sibling_pair(prev: &Section, next: &Section, diagnostics: &mut Vec<String>) {
    if prev.parent_id != next.parent_id {
        diagnostics.push(format!(
            "siblings {} and {} have different parents",
            prev.id, next.id
        ));
    }
    if prev.level != next.level {
        diagnostics.push(format!(
            "siblings {} and {} are at different levels ({} and {})",
            prev.id, next.id, prev.level, next.level
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LEVEL_PAGE, LEVEL_TOPIC};

    fn section(id: SectionId, level: u8, parent: Option<SectionId>) -> Section {
        let mut s = Section::new(id, 1, level);
        s.parent_id = parent;
        s
    }

    fn link(sections: &mut [Section], ids: &[SectionId]) {
        for (i, id) in ids.iter().enumerate() {
            let s = sections.iter_mut().find(|s| s.id == *id).unwrap();
            s.prev_sibling_id = if i > 0 { Some(ids[i - 1]) } else { None };
            s.next_sibling_id = ids.get(i + 1).copied();
        }
    }

    /// A(root) -> [B -> [C], D]
    fn sample() -> Vec<Section> {
        let mut sections = vec![
            section(1, LEVEL_ROOT, None),
            section(2, LEVEL_PAGE, Some(1)),
            section(3, LEVEL_TOPIC, Some(2)),
            section(4, LEVEL_PAGE, Some(1)),
        ];
        link(&mut sections, &[2, 4]);
        sections
    }

    #[test]
    fn test_rebuild_answers_structural_queries() {
        let index = TreeIndex::rebuild(&sample()).unwrap();

        assert_eq!(index.root_id(), 1);
        assert_eq!(index.parent_of(3).unwrap(), Some(2));
        assert_eq!(index.parent_of(1).unwrap(), None);
        assert_eq!(index.children_of(1).unwrap(), &[2, 4]);
        assert_eq!(index.siblings_of(4).unwrap(), vec![2, 4]);
        assert_eq!(index.siblings_of(1).unwrap(), vec![1]);
        assert_eq!(index.ancestors_of(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(index.descendants_of(1).unwrap(), &[2, 3, 4]);
        assert_eq!(index.descendants_of(3).unwrap(), &[] as &[SectionId]);
        assert_eq!(index.depth_first_order(), &[1, 2, 3, 4]);
        assert_eq!(index.ordinal_of(4).unwrap(), 3);
        assert_eq!(index.child_level_of(1).unwrap(), Some(LEVEL_PAGE));
        assert_eq!(index.child_level_of(4).unwrap(), None);
        assert_eq!(index.max_level_in_subtree(2).unwrap(), LEVEL_TOPIC);
    }

    #[test]
    fn test_is_descendant_uses_subtree_ranges() {
        let index = TreeIndex::rebuild(&sample()).unwrap();
        assert!(index.is_descendant(1, 3));
        assert!(index.is_descendant(2, 3));
        assert!(!index.is_descendant(4, 3));
        assert!(!index.is_descendant(3, 3));
        assert!(!index.is_descendant(3, 2));
    }

    #[test]
    fn test_previous_at_level_skips_deeper_sections() {
        let index = TreeIndex::rebuild(&sample()).unwrap();
        assert_eq!(index.previous_at_level(4).unwrap(), Some(2));
        assert_eq!(index.previous_at_level(2).unwrap(), None);
        assert_eq!(index.previous_at_level(3).unwrap(), None);
    }

    #[test]
    fn test_effective_visibility_follows_ancestors() {
        let mut sections = sample();
        sections[1].visible = false;
        let index = TreeIndex::rebuild(&sections).unwrap();
        assert!(!index.is_effectively_visible(3).unwrap());
        assert!(index.is_effectively_visible(4).unwrap());
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let index = TreeIndex::rebuild(&sample()).unwrap();
        assert!(matches!(
            index.parent_of(99),
            Err(SectionError::NodeNotFound { .. })
        ));
        assert!(matches!(
            index.children_of(99),
            Err(SectionError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn test_rebuild_rejects_dangling_parent() {
        let mut sections = sample();
        sections[2].parent_id = Some(42);
        let err = TreeIndex::rebuild(&sections).unwrap_err();
        match err {
            SectionError::InconsistentTree { diagnostics } => {
                assert!(diagnostics.iter().any(|d| d.contains("missing parent 42")));
            }
            other => panic!("expected InconsistentTree, got {:?}", other),
        }
    }

    #[test]
    fn test_rebuild_rejects_cycle() {
        // 5 and 6 point at each other and are detached from the root
        let mut sections = sample();
        sections.push(section(5, LEVEL_TOPIC, Some(6)));
        sections.push(section(6, LEVEL_TOPIC, Some(5)));
        let err = TreeIndex::rebuild(&sections).unwrap_err();
        match err {
            SectionError::InconsistentTree { diagnostics } => {
                assert!(diagnostics[0].contains("cycle"), "{:?}", diagnostics);
            }
            other => panic!("expected InconsistentTree, got {:?}", other),
        }
    }

    #[test]
    fn test_rebuild_rejects_missing_and_duplicate_roots() {
        let sections = vec![section(2, LEVEL_PAGE, Some(1))];
        assert!(matches!(
            TreeIndex::rebuild(&sections),
            Err(SectionError::InconsistentTree { .. })
        ));

        let sections = vec![section(1, LEVEL_ROOT, None), section(2, LEVEL_ROOT, None)];
        assert!(matches!(
            TreeIndex::rebuild(&sections),
            Err(SectionError::InconsistentTree { .. })
        ));
    }

    #[test]
    fn test_rebuild_rejects_broken_sibling_chain() {
        let mut sections = sample();
        // D claims to follow C, which lives under another parent
        sections[3].prev_sibling_id = Some(3);
        let err = TreeIndex::rebuild(&sections).unwrap_err();
        match err {
            SectionError::InconsistentTree { diagnostics } => {
                assert!(diagnostics.iter().any(|d| d.contains("not mirrored")));
                assert!(diagnostics.iter().any(|d| d.contains("different parents")));
            }
            other => panic!("expected InconsistentTree, got {:?}", other),
        }
    }

    #[test]
    fn test_rebuild_rejects_child_shallower_than_parent() {
        let mut sections = sample();
        sections[1].level = LEVEL_TOPIC;
        sections[3].level = LEVEL_TOPIC;
        sections[2].level = LEVEL_PAGE;
        let err = TreeIndex::rebuild(&sections).unwrap_err();
        assert!(err.to_string().contains("shallower than its parent"));
    }
}
