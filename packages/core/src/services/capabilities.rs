//! Capability checks
//!
//! Capability evaluation belongs to the host application. The controller
//! only asks [`CapabilityChecker::has_capability`] and turns a `false` into
//! [`SectionError::PermissionDenied`](crate::services::SectionError).

use crate::models::CourseId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Permissions consulted by section operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Create, delete, edit and re-level sections
    #[serde(rename = "course:update")]
    CourseUpdate,
    #[serde(rename = "course:movesections")]
    MoveSections,
    #[serde(rename = "course:sectionvisibility")]
    SectionVisibility,
    /// See hidden sections in the outline
    #[serde(rename = "course:viewhiddensections")]
    ViewHiddenSections,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CourseUpdate => "course:update",
            Capability::MoveSections => "course:movesections",
            Capability::SectionVisibility => "course:sectionvisibility",
            Capability::ViewHiddenSections => "course:viewhiddensections",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission layer of the host application
pub trait CapabilityChecker: Send + Sync {
    fn has_capability(&self, user_id: &str, capability: Capability, course_id: CourseId) -> bool;
}

/// Grants everything; used by the dev tool and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CapabilityChecker for AllowAll {
    fn has_capability(&self, _user_id: &str, _capability: Capability, _course_id: CourseId) -> bool {
        true
    }
}

/// Static per-user grants
///
/// A grant with no course applies to every course.
#[derive(Debug, Clone, Default)]
pub struct GrantedCapabilities {
    grants: HashSet<(String, Capability, Option<CourseId>)>,
}

impl GrantedCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `capability` to `user_id` in every course
    pub fn grant(mut self, user_id: impl Into<String>, capability: Capability) -> Self {
        self.grants.insert((user_id.into(), capability, None));
        self
    }

    /// Grant `capability` to `user_id` in one course only
    pub fn grant_in(
        mut self,
        user_id: impl Into<String>,
        capability: Capability,
        course_id: CourseId,
    ) -> Self {
        self.grants.insert((user_id.into(), capability, Some(course_id)));
        self
    }
}

impl CapabilityChecker for GrantedCapabilities {
    fn has_capability(&self, user_id: &str, capability: Capability, course_id: CourseId) -> bool {
        let user_id = user_id.to_string();
        self.grants.contains(&(user_id.clone(), capability, None))
            || self.grants.contains(&(user_id, capability, Some(course_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_names() {
        assert_eq!(Capability::CourseUpdate.to_string(), "course:update");
        assert_eq!(
            serde_json::to_string(&Capability::SectionVisibility).unwrap(),
            "\"course:sectionvisibility\""
        );
    }

    #[test]
    fn test_grants_are_scoped() {
        let grants = GrantedCapabilities::new()
            .grant("editor", Capability::CourseUpdate)
            .grant_in("ta", Capability::SectionVisibility, 7);

        assert!(grants.has_capability("editor", Capability::CourseUpdate, 1));
        assert!(grants.has_capability("editor", Capability::CourseUpdate, 7));
        assert!(!grants.has_capability("editor", Capability::MoveSections, 7));
        assert!(grants.has_capability("ta", Capability::SectionVisibility, 7));
        assert!(!grants.has_capability("ta", Capability::SectionVisibility, 8));
        assert!(AllowAll.has_capability("anyone", Capability::ViewHiddenSections, 3));
    }
}
