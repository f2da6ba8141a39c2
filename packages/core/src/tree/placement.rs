//! Placement Engine
//!
//! Computes the new parent, sibling links, levels and ordinals for sections
//! being created, deleted, moved or re-leveled.
//!
//! # Transactions
//!
//! Every operation takes the current tree by reference and returns a new
//! tree. Validation happens before any link is rewritten, and the rewritten
//! copy is re-validated by [`CourseTree::reindex`]. On any error the caller's
//! tree is unchanged.
//!
//! # Level rules
//!
//! - The general section is the only level-0 section.
//! - A section's level is never shallower than its parent's.
//! - All children of a parent share one level (the parent's *child level*).
//! - No section is deeper than the configured maximum level.

use super::course_tree::CourseTree;
use crate::models::{
    ChildPolicy, CourseId, MoveDestination, Section, SectionId, LEVEL_ROOT,
};
use crate::services::SectionError;

/// Result of a delete: the new tree and every section id removed
#[derive(Debug, Clone)]
pub struct Removal {
    pub tree: CourseTree,
    pub removed_ids: Vec<SectionId>,
}

/// Structural operations on a [`CourseTree`]
#[derive(Debug, Clone)]
pub struct PlacementEngine {
    max_level: u8,
}

impl PlacementEngine {
    pub fn new(max_level: u8) -> Self {
        Self { max_level }
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Level a new child of `parent_id` gets when none is requested
    ///
    /// Existing children fix the level; otherwise one level below the parent,
    /// capped at the maximum level.
    pub fn default_child_level(
        &self,
        tree: &CourseTree,
        parent_id: SectionId,
    ) -> Result<u8, SectionError> {
        Ok(match tree.index().child_level_of(parent_id)? {
            Some(level) => level,
            None => self.first_child_level(tree.index().level_of(parent_id)?),
        })
    }

    fn first_child_level(&self, parent_level: u8) -> u8 {
        parent_level
            .saturating_add(1)
            .min(self.max_level.max(parent_level))
    }

    /// Check that a section at `level` may sit among `siblings` under `parent_id`
    fn validate_level(
        &self,
        tree: &CourseTree,
        parent_id: SectionId,
        level: u8,
        siblings: &[SectionId],
    ) -> Result<(), SectionError> {
        let parent_level = tree.index().level_of(parent_id)?;
        if level == LEVEL_ROOT {
            return Err(SectionError::invalid_parent(
                parent_id,
                level,
                "only the general section may be at level 0",
            ));
        }
        if level > self.max_level {
            return Err(SectionError::invalid_parent(
                parent_id,
                level,
                format!("deepest allowed level is {}", self.max_level),
            ));
        }
        if parent_level > level {
            return Err(SectionError::invalid_parent(
                parent_id,
                level,
                format!("parent is at deeper level {}", parent_level),
            ));
        }
        if let Some(first) = siblings.first() {
            let sibling_level = tree.index().level_of(*first)?;
            if sibling_level != level {
                return Err(SectionError::invalid_parent(
                    parent_id,
                    level,
                    format!("existing children are at level {}", sibling_level),
                ));
            }
        }
        Ok(())
    }

    /// Append a new section as the last child of `parent_id`
    ///
    /// The new section's ordinal is its depth-first position; sections after
    /// it in the flat sequence shift up by one.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the parent does not exist
    /// - `InvalidParent` if the level is 0, too deep, shallower than the
    ///   parent, or different from the parent's existing children
    pub fn create(
        &self,
        tree: &CourseTree,
        new_id: SectionId,
        parent_id: SectionId,
        level: u8,
    ) -> Result<CourseTree, SectionError> {
        tree.section(parent_id)?;
        if tree.get(new_id).is_some() {
            return Err(SectionError::invalid_update(format!(
                "section id {} is already in use",
                new_id
            )));
        }

        let mut siblings = tree.index().children_of(parent_id)?.to_vec();
        self.validate_level(tree, parent_id, level, &siblings)?;

        let mut next = tree.clone();
        next.insert(Section::new(new_id, tree.course_id(), level));
        siblings.push(new_id);
        next.relink_children(parent_id, &siblings)?;
        next.reindex()?;

        tracing::debug!(
            "Placed new section {} at level {} under {} (ordinal {})",
            new_id,
            level,
            parent_id,
            next.section(new_id)?.ordinal
        );
        Ok(next)
    }

    /// Remove a section, applying `policy` to its children
    ///
    /// A section without children is removed and its neighbours are linked to
    /// each other. With children, `ChildPolicy::Promote` splices them into the
    /// deleted section's place (their subtrees shift so the children take its
    /// level) and `ChildPolicy::Cascade` removes the whole subtree.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` for an unknown id
    /// - `ProtectedNode` for the general section
    /// - `ChildPolicyRequired` if the section has children and `policy` is `None`
    pub fn delete(
        &self,
        tree: &CourseTree,
        id: SectionId,
        policy: Option<ChildPolicy>,
    ) -> Result<Removal, SectionError> {
        let section = tree.section(id)?;
        let Some(parent_id) = section.parent_id else {
            return Err(SectionError::protected_node(id, "deleted"));
        };

        let index = tree.index();
        let children = index.children_of(id)?.to_vec();
        let siblings = index.children_of(parent_id)?;
        let mut next = tree.clone();
        let mut removed_ids = vec![id];

        let replacement: Vec<SectionId> = match (children.is_empty(), policy) {
            (true, _) => Vec::new(),
            (false, None) => {
                return Err(SectionError::ChildPolicyRequired {
                    id,
                    child_count: children.len(),
                })
            }
            (false, Some(ChildPolicy::Cascade)) => {
                for descendant in index.descendants_of(id)? {
                    next.remove(*descendant);
                    removed_ids.push(*descendant);
                }
                Vec::new()
            }
            (false, Some(ChildPolicy::Promote)) => {
                let child_level = index.level_of(children[0])?;
                let delta = section.level as i16 - child_level as i16;
                let mut subtree = children.clone();
                for child in &children {
                    subtree.extend_from_slice(index.descendants_of(*child)?);
                }
                next.shift_levels(&subtree, delta)?;
                children
            }
        };

        let mut new_order = Vec::with_capacity(siblings.len() + replacement.len());
        for sibling in siblings {
            if *sibling == id {
                new_order.extend_from_slice(&replacement);
            } else {
                new_order.push(*sibling);
            }
        }

        next.remove(id);
        next.relink_children(parent_id, &new_order)?;
        next.reindex()?;

        tracing::debug!(
            "Deleted section {} ({} section(s) removed, policy {:?})",
            id,
            removed_ids.len(),
            policy
        );
        Ok(Removal {
            tree: next,
            removed_ids,
        })
    }

    /// Move a section (with its subtree) to the position described by `dest`
    ///
    /// # Algorithm
    ///
    /// 1. Resolve the destination parent: explicit parent, else the parent of
    ///    the previous sibling, else the parent of the next sibling. A
    ///    descriptor naming none of them (a bare level) is refused.
    /// 2. Resolve the level: explicit level, else the destination's child level.
    /// 3. Reject the general section itself and cycles (destination inside
    ///    the moved subtree).
    /// 4. Detach the section from its old sibling chain.
    /// 5. Shift the level of the whole subtree by the level delta.
    /// 6. Splice after the previous sibling, before the next sibling, or at
    ///    the end.
    /// 7. Re-derive every ordinal from depth-first order.
    ///
    /// Moving a section to the position it already occupies returns an
    /// identical tree.
    ///
    /// # Errors
    ///
    /// `NodeNotFound`, `ProtectedNode`, `CyclicMove`, or `InvalidParent`
    /// (level incompatible, or the named siblings are not adjacent children
    /// of the resolved parent).
    pub fn move_section(
        &self,
        tree: &CourseTree,
        id: SectionId,
        dest: &MoveDestination,
    ) -> Result<CourseTree, SectionError> {
        let section = tree.section(id)?;
        let Some(old_parent_id) = section.parent_id else {
            return Err(SectionError::protected_node(id, "moved"));
        };
        let index = tree.index();

        // 1. Destination parent
        let parent_id = match (dest.parent_id, dest.prev_sibling_id, dest.next_sibling_id) {
            (Some(parent_id), _, _) => {
                tree.section(parent_id)?;
                parent_id
            }
            (None, Some(prev_id), _) => self.parent_of_sibling(tree, prev_id, id, old_parent_id)?,
            (None, None, Some(next_id)) => {
                self.parent_of_sibling(tree, next_id, id, old_parent_id)?
            }
            (None, None, None) => {
                return Err(SectionError::invalid_parent(
                    old_parent_id,
                    dest.level.unwrap_or(section.level),
                    "a move needs a parent, previous or next section",
                ));
            }
        };

        // 3. Cycle prevention
        if parent_id == id || index.is_descendant(id, parent_id) {
            return Err(SectionError::cyclic_move(id, parent_id));
        }

        // Destination siblings without the moving section
        let siblings: Vec<SectionId> = index
            .children_of(parent_id)?
            .iter()
            .copied()
            .filter(|s| *s != id)
            .collect();

        // 2. Level
        let level = match dest.level {
            Some(level) => level,
            None => match siblings.first() {
                Some(first) => index.level_of(*first)?,
                None => self.first_child_level(index.level_of(parent_id)?),
            },
        };
        self.validate_level(tree, parent_id, level, &siblings)?;

        let delta = level as i16 - section.level as i16;
        let deepest = index.max_level_in_subtree(id)? as i16 + delta;
        if deepest > self.max_level as i16 {
            return Err(SectionError::invalid_parent(
                parent_id,
                level,
                format!(
                    "subtree would reach level {} (deepest allowed is {})",
                    deepest, self.max_level
                ),
            ));
        }

        // 6. Position among the destination siblings
        let prev_id = dest
            .prev_sibling_id
            .and_then(|p| if p == id { section.prev_sibling_id } else { Some(p) });
        let next_id = dest
            .next_sibling_id
            .and_then(|n| if n == id { section.next_sibling_id } else { Some(n) });
        let self_referenced =
            dest.prev_sibling_id == Some(id) || dest.next_sibling_id == Some(id);
        if self_referenced && parent_id != old_parent_id {
            return Err(SectionError::invalid_parent(
                parent_id,
                level,
                "a section cannot be positioned relative to itself under a new parent",
            ));
        }

        let insert_at = match (prev_id, next_id) {
            (Some(prev_id), next_id) => {
                let pos = position_in(&siblings, prev_id).ok_or_else(|| {
                    SectionError::invalid_parent(
                        parent_id,
                        level,
                        format!("section {} is not a child of section {}", prev_id, parent_id),
                    )
                })?;
                if let Some(next_id) = next_id {
                    if siblings.get(pos + 1) != Some(&next_id) {
                        return Err(SectionError::invalid_parent(
                            parent_id,
                            level,
                            format!(
                                "sections {} and {} are not adjacent siblings",
                                prev_id, next_id
                            ),
                        ));
                    }
                }
                pos + 1
            }
            (None, Some(next_id)) => {
                let pos = position_in(&siblings, next_id).ok_or_else(|| {
                    SectionError::invalid_parent(
                        parent_id,
                        level,
                        format!("section {} is not a child of section {}", next_id, parent_id),
                    )
                })?;
                // A self-referenced prev that resolved to "no previous sibling"
                // pins the section to the front
                if dest.prev_sibling_id == Some(id) && pos != 0 {
                    return Err(SectionError::invalid_parent(
                        parent_id,
                        level,
                        format!("section {} is not the first child", next_id),
                    ));
                }
                pos
            }
            (None, None) if dest.prev_sibling_id == Some(id) => 0,
            (None, None) if dest.next_sibling_id == Some(id) => siblings.len(),
            (None, None) => siblings.len(),
        };

        // 4. Detach, 5. shift levels, 6. splice
        let mut next = tree.clone();
        let mut subtree = vec![id];
        subtree.extend_from_slice(index.descendants_of(id)?);
        next.shift_levels(&subtree, delta)?;

        if old_parent_id != parent_id {
            let old_siblings: Vec<SectionId> = index
                .children_of(old_parent_id)?
                .iter()
                .copied()
                .filter(|s| *s != id)
                .collect();
            next.relink_children(old_parent_id, &old_siblings)?;
        }
        let mut new_siblings = siblings;
        new_siblings.insert(insert_at, id);
        next.relink_children(parent_id, &new_siblings)?;

        // 7. Ordinals
        next.reindex()?;

        tracing::debug!(
            "Moved section {} from parent {} to parent {} at position {} (level {} -> {})",
            id,
            old_parent_id,
            parent_id,
            insert_at,
            section.level,
            level
        );
        Ok(next)
    }

    /// Change a section's level the way the edit form does
    ///
    /// Going deeper nests the section as the last child of its previous
    /// sibling (the previous page becomes its parent). Going shallower places
    /// it directly after its current parent, under the grandparent.
    pub fn relevel(
        &self,
        tree: &CourseTree,
        id: SectionId,
        new_level: u8,
    ) -> Result<CourseTree, SectionError> {
        let section = tree.section(id)?;
        let Some(parent_id) = section.parent_id else {
            return Err(SectionError::protected_node(id, "re-leveled"));
        };
        if new_level == section.level {
            return Ok(tree.clone());
        }

        let dest = if new_level > section.level {
            let new_parent = section.prev_sibling_id.ok_or_else(|| {
                SectionError::invalid_parent(
                    parent_id,
                    new_level,
                    format!("section {} has no previous section to nest under", id),
                )
            })?;
            MoveDestination::under(new_parent).with_level(new_level)
        } else {
            let grandparent = tree.index().parent_of(parent_id)?.ok_or_else(|| {
                SectionError::invalid_parent(
                    parent_id,
                    new_level,
                    "section is already a direct child of the general section",
                )
            })?;
            MoveDestination::after(parent_id)
                .with_parent(grandparent)
                .with_level(new_level)
        };
        self.move_section(tree, id, &dest)
    }

    /// Parent of a sibling named in a destination descriptor
    fn parent_of_sibling(
        &self,
        tree: &CourseTree,
        sibling_id: SectionId,
        moving_id: SectionId,
        current_parent_id: SectionId,
    ) -> Result<SectionId, SectionError> {
        if sibling_id == moving_id {
            return Ok(current_parent_id);
        }
        let sibling = tree.section(sibling_id)?;
        sibling.parent_id.ok_or_else(|| {
            SectionError::invalid_parent(
                sibling_id,
                sibling.level,
                "the general section has no siblings",
            )
        })
    }
}

fn position_in(ids: &[SectionId], id: SectionId) -> Option<usize> {
    ids.iter().position(|s| *s == id)
}

/// Create the general section of an empty course
pub fn root_tree(course_id: CourseId, root_id: SectionId) -> Result<CourseTree, SectionError> {
    CourseTree::from_sections(course_id, 0, vec![Section::new_root(root_id, course_id)])
}

#[cfg(test)]
#[path = "placement_test.rs"]
mod placement_test;
