//! Section display names
//!
//! Localization lives outside the engine. [`SectionNamer`] is the seam the
//! host's string table plugs into; [`DefaultSectionNamer`] produces plain
//! English names.

use crate::models::{CourseId, Section, LEVEL_PAGE, LEVEL_ROOT};

pub trait SectionNamer: Send + Sync {
    /// Name shown when the section has no explicit name
    fn default_name(&self, section: &Section) -> String;

    /// Explicit name if set, otherwise the default name
    fn display_name(&self, _course_id: CourseId, section: &Section) -> String {
        match section.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.default_name(section),
        }
    }
}

/// "General" for the root, "Page N" for pages, "Topic N" below
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSectionNamer;

impl SectionNamer for DefaultSectionNamer {
    fn default_name(&self, section: &Section) -> String {
        match section.level {
            LEVEL_ROOT => "General".to_string(),
            LEVEL_PAGE => format!("Page {}", section.ordinal),
            _ => format!("Topic {}", section.ordinal),
        }
    }
}
