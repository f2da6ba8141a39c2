//! Data Models
//!
//! This module contains the data structures shared by every layer:
//!
//! - `Section` - One node of a course's section tree
//! - `MoveDestination` - Transient descriptor of where a section should move
//! - `SectionRef`, `SectionUpdate`, `ChildPolicy` - Request-side value types

mod destination;
mod section;

pub use destination::MoveDestination;
pub use section::{
    ChildPolicy, CourseId, Section, SectionId, SectionRef, SectionUpdate, LEVEL_PAGE, LEVEL_ROOT,
    LEVEL_TOPIC,
};
