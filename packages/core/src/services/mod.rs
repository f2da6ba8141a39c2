//! Business Services
//!
//! This module contains the request-facing layer on top of the tree engine:
//!
//! - `SectionController` - Capability-checked section operations
//! - `SnapshotCache` - Indexed course trees, invalidated by revision
//! - `WriteQueue` - Per-course write serialization with conflict retries
//! - `CapabilityChecker` / `SectionNamer` - Seams to the host application
//!
//! Services coordinate between the storage layer and the tree engine,
//! enforcing permissions and publishing domain events.

pub mod capabilities;
pub mod error;
pub mod naming;
pub mod section_controller;
pub mod snapshot_cache;
pub mod write_queue;

pub use capabilities::{AllowAll, Capability, CapabilityChecker, GrantedCapabilities};
pub use error::SectionError;
pub use naming::{DefaultSectionNamer, SectionNamer};
pub use section_controller::{
    ControllerResponse, DeleteOutcome, RequestContext, SectionController, SectionSummary,
    UserNotice,
};
pub use snapshot_cache::SnapshotCache;
pub use write_queue::{RetryPolicy, WriteQueue};
