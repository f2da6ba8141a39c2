//! Section Tree Engine
//!
//! This module holds the pure, synchronous part of the system:
//!
//! - `TreeIndex` - Structural queries and integrity checks
//! - `CourseTree` - Arena of a course's sections plus its index
//! - `PlacementEngine` - Create, delete, move and relevel
//! - `VisibilityPropagator` - Show/hide with descendant cascade
//!
//! Nothing here touches the store. Callers load a [`CourseTree`], apply one
//! operation to obtain a new tree, and commit the difference.

mod course_tree;
mod index;
pub mod placement;
mod visibility;

pub use course_tree::CourseTree;
pub use index::TreeIndex;
pub use placement::{PlacementEngine, Removal};
pub use visibility::{VisibilityChange, VisibilityPropagator};
