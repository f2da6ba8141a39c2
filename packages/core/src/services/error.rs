//! Section Error Types
//!
//! This module defines the error taxonomy shared by the tree engine and the
//! controller façade. Structural errors are recoverable at the controller
//! boundary (they become a user notice); integrity, permission and store
//! errors propagate to the caller.

use crate::db::StoreError;
use crate::models::{SectionId, SectionRef};
use crate::services::capabilities::Capability;
use thiserror::Error;

/// Errors raised by section tree operations
#[derive(Error, Debug)]
pub enum SectionError {
    /// Bad id or ordinal reference
    #[error("Section not found: {reference}")]
    NodeNotFound { reference: SectionRef },

    /// Attempt to delete or move the course's general section
    #[error("Section {id} is the course's general section and cannot be {operation}")]
    ProtectedNode { id: SectionId, operation: String },

    /// Destination parent is the moved section itself or one of its descendants
    #[error("Cannot move section {id} under {destination_parent_id}: it is the section itself or one of its descendants")]
    CyclicMove {
        id: SectionId,
        destination_parent_id: SectionId,
    },

    /// Level mismatch between a section and its proposed parent or siblings
    #[error("Invalid parent {parent_id} for level {level}: {reason}")]
    InvalidParent {
        parent_id: SectionId,
        level: u8,
        reason: String,
    },

    /// The section has children and the caller did not say what to do with them
    #[error("Section {id} has {child_count} child section(s); choose to promote or cascade")]
    ChildPolicyRequired { id: SectionId, child_count: usize },

    /// Invalid edit of section fields
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// Capability check failed (raised by the external permission layer)
    #[error("Permission denied: missing capability {capability}")]
    PermissionDenied { capability: Capability },

    /// Integrity violation detected while indexing the stored tree
    #[error("Inconsistent section tree: {}", diagnostics.join("; "))]
    InconsistentTree { diagnostics: Vec<String> },

    /// Store operation failed
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    /// Configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SectionError {
    /// Create a not found error for a section id
    pub fn node_not_found(id: SectionId) -> Self {
        Self::NodeNotFound {
            reference: SectionRef::Id(id),
        }
    }

    /// Create a not found error for any kind of reference
    pub fn reference_not_found(reference: SectionRef) -> Self {
        Self::NodeNotFound { reference }
    }

    /// Create a protected node error
    pub fn protected_node(id: SectionId, operation: impl Into<String>) -> Self {
        Self::ProtectedNode {
            id,
            operation: operation.into(),
        }
    }

    /// Create a cyclic move error
    pub fn cyclic_move(id: SectionId, destination_parent_id: SectionId) -> Self {
        Self::CyclicMove {
            id,
            destination_parent_id,
        }
    }

    /// Create an invalid parent error
    pub fn invalid_parent(parent_id: SectionId, level: u8, reason: impl Into<String>) -> Self {
        Self::InvalidParent {
            parent_id,
            level,
            reason: reason.into(),
        }
    }

    /// Create an invalid update error
    pub fn invalid_update(msg: impl Into<String>) -> Self {
        Self::InvalidUpdate(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(capability: Capability) -> Self {
        Self::PermissionDenied { capability }
    }

    /// Create an inconsistent tree error from collected diagnostics
    pub fn inconsistent(diagnostics: Vec<String>) -> Self {
        Self::InconsistentTree { diagnostics }
    }

    /// Whether the controller turns this error into a user notice and keeps
    /// rendering the page in its prior state
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SectionError::NodeNotFound { .. }
                | SectionError::ProtectedNode { .. }
                | SectionError::CyclicMove { .. }
                | SectionError::InvalidParent { .. }
                | SectionError::ChildPolicyRequired { .. }
                | SectionError::InvalidUpdate(_)
        )
    }
}
