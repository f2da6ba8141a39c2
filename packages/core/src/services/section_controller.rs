//! Section Controller
//!
//! Request-facing façade over the tree engine. It wires together:
//!
//! - capability checks through [`CapabilityChecker`]
//! - the two-phase delete confirmation
//! - load → compute → commit cycles serialized by the [`WriteQueue`]
//! - snapshot cache invalidation and domain event broadcast
//!
//! Every call receives an explicit [`RequestContext`] instead of reading
//! ambient request globals.
//!
//! # Error handling
//!
//! Structural failures (bad ids, protected sections, invalid destinations)
//! come back as `Ok(ControllerResponse::Notice(..))` so the page can be
//! rendered in its prior state with a message. Integrity violations, store
//! failures and missing capabilities are returned as `Err`.

use crate::config::TreeConfig;
use crate::db::{SectionEvent, SectionStore};
use crate::models::{
    ChildPolicy, CourseId, MoveDestination, Section, SectionId, SectionRef, SectionUpdate,
};
use crate::services::capabilities::{Capability, CapabilityChecker};
use crate::services::naming::{DefaultSectionNamer, SectionNamer};
use crate::services::snapshot_cache::SnapshotCache;
use crate::services::write_queue::{RetryPolicy, WriteQueue};
use crate::services::SectionError;
use crate::tree::{CourseTree, PlacementEngine, VisibilityPropagator};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Longest accepted section name, in characters
pub const MAX_SECTION_NAME_LENGTH: usize = 255;

/// Who is asking, for which course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub user_id: String,
    pub course_id: CourseId,
    /// Correlates log lines and notices of one request
    pub request_id: Uuid,
    /// The request carried a valid session key (CSRF token)
    pub session_key_verified: bool,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, course_id: CourseId) -> Self {
        Self {
            user_id: user_id.into(),
            course_id,
            request_id: Uuid::new_v4(),
            session_key_verified: false,
        }
    }

    pub fn with_session_key(mut self, verified: bool) -> Self {
        self.session_key_verified = verified;
        self
    }
}

/// Message shown instead of the requested change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotice {
    /// Stable machine-readable reason
    pub code: String,
    pub message: String,
    pub request_id: Uuid,
}

impl UserNotice {
    fn from_error(ctx: &RequestContext, error: &SectionError) -> Self {
        let code = match error {
            SectionError::NodeNotFound { .. } => "sectionnotexist",
            SectionError::ProtectedNode { .. } => "protectedsection",
            SectionError::CyclicMove { .. } => "cyclicmove",
            SectionError::InvalidParent { .. } => "invalidparent",
            SectionError::ChildPolicyRequired { .. } => "childpolicyrequired",
            SectionError::InvalidUpdate(_) => "invalidupdate",
            _ => "error",
        };
        Self {
            code: code.to_string(),
            message: error.to_string(),
            request_id: ctx.request_id,
        }
    }
}

/// Result of a controller call that did not fail outright
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerResponse<T> {
    Done(T),
    Notice(UserNotice),
}

impl<T> ControllerResponse<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, ControllerResponse::Done(_))
    }

    pub fn done(self) -> Option<T> {
        match self {
            ControllerResponse::Done(value) => Some(value),
            ControllerResponse::Notice(_) => None,
        }
    }

    pub fn notice(&self) -> Option<&UserNotice> {
        match self {
            ControllerResponse::Done(_) => None,
            ControllerResponse::Notice(notice) => Some(notice),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ControllerResponse<U> {
        match self {
            ControllerResponse::Done(value) => ControllerResponse::Done(f(value)),
            ControllerResponse::Notice(notice) => ControllerResponse::Notice(notice),
        }
    }
}

/// First or second phase of a delete
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// Ask the user before deleting
    NeedsConfirmation {
        section: Section,
        is_empty: bool,
        display_name: String,
    },
    Deleted {
        removed_ids: Vec<SectionId>,
        /// Section the user is sent to afterwards
        redirect_target_id: SectionId,
    },
}

/// One outline row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummary {
    pub id: SectionId,
    pub ordinal: u32,
    pub level: u8,
    pub parent_id: Option<SectionId>,
    pub display_name: String,
    /// Own flag
    pub visible: bool,
    /// Own flag and every ancestor's flag
    pub effectively_visible: bool,
}

/// Section tree operations for page controllers
pub struct SectionController {
    store: Arc<dyn SectionStore>,
    capabilities: Arc<dyn CapabilityChecker>,
    namer: Arc<dyn SectionNamer>,
    engine: PlacementEngine,
    visibility: VisibilityPropagator,
    cache: SnapshotCache,
    queue: WriteQueue,
    event_tx: broadcast::Sender<SectionEvent>,
}

impl SectionController {
    /// Create a controller over `store`
    ///
    /// # Errors
    ///
    /// `Config` if `config` does not validate.
    pub fn new(
        store: Arc<dyn SectionStore>,
        capabilities: Arc<dyn CapabilityChecker>,
        config: &TreeConfig,
    ) -> Result<Self, SectionError> {
        config.validate().map_err(SectionError::Config)?;
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        Ok(Self {
            store,
            capabilities,
            namer: Arc::new(DefaultSectionNamer),
            engine: PlacementEngine::new(config.max_level),
            visibility: VisibilityPropagator::new(),
            cache: SnapshotCache::new(config.snapshot_ttl()),
            queue: WriteQueue::new(RetryPolicy::new(
                config.max_retries,
                config.retry_base_delay(),
            )),
            event_tx,
        })
    }

    /// Replace the default English section names
    pub fn with_namer(mut self, namer: Arc<dyn SectionNamer>) -> Self {
        self.namer = namer;
        self
    }

    pub fn store(&self) -> &Arc<dyn SectionStore> {
        &self.store
    }

    pub fn engine(&self) -> &PlacementEngine {
        &self.engine
    }

    /// Subscribe to events published after each committed change
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<SectionEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores errors if no subscribers
    fn emit_event(&self, event: SectionEvent) {
        let _ = self.event_tx.send(event);
    }

    fn has(&self, ctx: &RequestContext, capability: Capability) -> bool {
        self.capabilities
            .has_capability(&ctx.user_id, capability, ctx.course_id)
    }

    fn require(&self, ctx: &RequestContext, capability: Capability) -> Result<(), SectionError> {
        if self.has(ctx, capability) {
            Ok(())
        } else {
            tracing::warn!(
                "[{}] User '{}' lacks {} in course {}",
                ctx.request_id,
                ctx.user_id,
                capability,
                ctx.course_id
            );
            Err(SectionError::permission_denied(capability))
        }
    }

    /// Turn recoverable errors into a notice, propagate the rest
    fn respond<T>(
        ctx: &RequestContext,
        result: Result<T, SectionError>,
    ) -> Result<ControllerResponse<T>, SectionError> {
        match result {
            Ok(value) => Ok(ControllerResponse::Done(value)),
            Err(e) if e.is_recoverable() => {
                tracing::warn!("[{}] Rejected: {}", ctx.request_id, e);
                Ok(ControllerResponse::Notice(UserNotice::from_error(ctx, &e)))
            }
            Err(e) => Err(e),
        }
    }

    async fn tree(&self, course_id: CourseId) -> Result<Arc<CourseTree>, SectionError> {
        self.cache.get(self.store.as_ref(), course_id).await
    }

    /// Commit the difference between `base` and `next`
    ///
    /// Returns the upserted records as stored (with fresh timestamps); empty
    /// when nothing changed, in which case the store is not touched.
    async fn commit(
        &self,
        base: &CourseTree,
        next: &CourseTree,
    ) -> Result<Vec<Section>, SectionError> {
        let changes = next.changes_since(base, Utc::now());
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let upserts = changes.upserts.clone();
        let touched = changes.len();
        let revision = self.store.save_sections(base.course_id(), changes).await?;
        self.cache.invalidate(base.course_id()).await;

        tracing::debug!(
            "Committed {} record(s) to course {} at revision {}",
            touched,
            base.course_id(),
            revision
        );
        Ok(upserts)
    }

    /// Look up a section by id or legacy ordinal
    ///
    /// Sections hidden by their own flag or an ancestor's require
    /// `course:viewhiddensections`.
    pub async fn get_section(
        &self,
        ctx: &RequestContext,
        reference: SectionRef,
    ) -> Result<ControllerResponse<Section>, SectionError> {
        let tree = self.tree(ctx.course_id).await?;
        let section = match tree.resolve(reference) {
            Ok(section) => section.clone(),
            Err(e) => return Self::respond(ctx, Err(e)),
        };
        if !tree.index().is_effectively_visible(section.id)? {
            self.require(ctx, Capability::ViewHiddenSections)?;
        }
        Ok(ControllerResponse::Done(section))
    }

    /// Append a new section under `parent_id`
    ///
    /// Without a level, the parent's existing child level is used (or one
    /// level below the parent when it has no children yet).
    pub async fn create_section(
        &self,
        ctx: &RequestContext,
        parent_id: SectionId,
        level: Option<u8>,
    ) -> Result<ControllerResponse<Section>, SectionError> {
        self.require(ctx, Capability::CourseUpdate)?;
        let result = self
            .queue
            .run(ctx.course_id, move |_| self.try_create(ctx, parent_id, level))
            .await;
        Self::respond(ctx, result)
    }

    async fn try_create(
        &self,
        ctx: &RequestContext,
        parent_id: SectionId,
        level: Option<u8>,
    ) -> Result<Section, SectionError> {
        let tree = self.tree(ctx.course_id).await?;
        let level = match level {
            Some(level) => level,
            None => self.engine.default_child_level(&tree, parent_id)?,
        };
        let new_id = self.store.allocate_section_id().await?;
        let next = self.engine.create(&tree, new_id, parent_id, level)?;

        let upserts = self.commit(&tree, &next).await?;
        let section = latest(&next, &upserts, new_id)?;

        tracing::info!(
            "[{}] Created section {} (level {}, ordinal {}) under {} in course {}",
            ctx.request_id,
            section.id,
            section.level,
            section.ordinal,
            parent_id,
            ctx.course_id
        );
        self.emit_event(SectionEvent::Created {
            section: section.clone(),
        });
        Ok(section)
    }

    /// Delete a section, asking for confirmation first
    ///
    /// The delete runs only with a verified session key and either an
    /// explicit confirmation or an empty subtree (no summary and no content
    /// in the section or any descendant). Otherwise the section is returned
    /// for the confirmation prompt.
    pub async fn delete_section(
        &self,
        ctx: &RequestContext,
        id: SectionId,
        confirmed: bool,
        policy: Option<ChildPolicy>,
    ) -> Result<ControllerResponse<DeleteOutcome>, SectionError> {
        self.require(ctx, Capability::CourseUpdate)?;

        let tree = self.tree(ctx.course_id).await?;
        let section = match tree.section(id) {
            Ok(section) => section.clone(),
            Err(e) => return Self::respond(ctx, Err(e)),
        };
        if section.is_root() {
            return Self::respond(ctx, Err(SectionError::protected_node(id, "deleted")));
        }

        let mut is_empty = section.is_empty();
        for descendant_id in tree.index().descendants_of(id)? {
            is_empty &= tree.section(*descendant_id)?.is_empty();
        }
        if !(ctx.session_key_verified && (confirmed || is_empty)) {
            let display_name = self.namer.display_name(ctx.course_id, &section);
            tracing::debug!(
                "[{}] Delete of section {} awaits confirmation",
                ctx.request_id,
                id
            );
            return Ok(ControllerResponse::Done(DeleteOutcome::NeedsConfirmation {
                section,
                is_empty,
                display_name,
            }));
        }

        let result = self
            .queue
            .run(ctx.course_id, move |_| self.try_delete(ctx, id, policy))
            .await;
        Self::respond(ctx, result)
    }

    async fn try_delete(
        &self,
        ctx: &RequestContext,
        id: SectionId,
        policy: Option<ChildPolicy>,
    ) -> Result<DeleteOutcome, SectionError> {
        let tree = self.tree(ctx.course_id).await?;
        let section = tree.section(id)?;
        let parent_id = section
            .parent_id
            .ok_or_else(|| SectionError::protected_node(id, "deleted"))?;

        let redirect_target_id = if section.is_topic_or_deeper() {
            parent_id
        } else {
            tree.index().previous_at_level(id)?.unwrap_or(parent_id)
        };
        let promoted_ids = match policy {
            Some(ChildPolicy::Promote) => tree.index().children_of(id)?.to_vec(),
            _ => Vec::new(),
        };

        let removal = self.engine.delete(&tree, id, policy)?;
        self.commit(&tree, &removal.tree).await?;

        tracing::info!(
            "[{}] Deleted section {} from course {} ({} removed, {} promoted)",
            ctx.request_id,
            id,
            ctx.course_id,
            removal.removed_ids.len(),
            promoted_ids.len()
        );
        self.emit_event(SectionEvent::Deleted {
            course_id: ctx.course_id,
            section_id: id,
            removed_ids: removal.removed_ids.clone(),
            promoted_ids,
        });
        Ok(DeleteOutcome::Deleted {
            removed_ids: removal.removed_ids,
            redirect_target_id,
        })
    }

    /// Show or hide a section; hiding cascades to every descendant
    pub async fn set_visibility(
        &self,
        ctx: &RequestContext,
        id: SectionId,
        visible: bool,
    ) -> Result<ControllerResponse<Section>, SectionError> {
        self.require(ctx, Capability::SectionVisibility)?;
        let result = self
            .queue
            .run(ctx.course_id, move |_| self.try_set_visibility(ctx, id, visible))
            .await;
        Self::respond(ctx, result)
    }

    async fn try_set_visibility(
        &self,
        ctx: &RequestContext,
        id: SectionId,
        visible: bool,
    ) -> Result<Section, SectionError> {
        let tree = self.tree(ctx.course_id).await?;
        let change = self.visibility.set_visible(&tree, id, visible)?;
        let upserts = self.commit(&tree, &change.tree).await?;
        let section = latest(&change.tree, &upserts, id)?;

        if !upserts.is_empty() {
            tracing::info!(
                "[{}] Section {} in course {} set visible={} ({} descendant(s) hidden)",
                ctx.request_id,
                id,
                ctx.course_id,
                visible,
                change.cascaded_ids.len()
            );
            self.emit_event(SectionEvent::VisibilityChanged {
                course_id: ctx.course_id,
                section_id: id,
                visible,
                cascaded_ids: change.cascaded_ids,
            });
        }
        Ok(section)
    }

    /// Move a section with its subtree
    ///
    /// Requires `course:movesections`, plus `course:update` when the
    /// destination names a level.
    pub async fn move_section(
        &self,
        ctx: &RequestContext,
        id: SectionId,
        dest: MoveDestination,
    ) -> Result<ControllerResponse<Section>, SectionError> {
        self.require(ctx, Capability::MoveSections)?;
        if dest.changes_level() {
            self.require(ctx, Capability::CourseUpdate)?;
        }
        let dest = &dest;
        let result = self
            .queue
            .run(ctx.course_id, move |_| self.try_move(ctx, id, dest))
            .await;
        Self::respond(ctx, result)
    }

    async fn try_move(
        &self,
        ctx: &RequestContext,
        id: SectionId,
        dest: &MoveDestination,
    ) -> Result<Section, SectionError> {
        let tree = self.tree(ctx.course_id).await?;
        let from_parent_id = tree.section(id)?.parent_id;
        let next = self.engine.move_section(&tree, id, dest)?;
        let upserts = self.commit(&tree, &next).await?;
        let section = latest(&next, &upserts, id)?;

        if upserts.is_empty() {
            tracing::debug!("[{}] Section {} already in place", ctx.request_id, id);
        } else {
            tracing::info!(
                "[{}] Moved section {} in course {} to parent {:?} at level {} (ordinal {})",
                ctx.request_id,
                id,
                ctx.course_id,
                section.parent_id,
                section.level,
                section.ordinal
            );
            self.emit_event(moved_event(&section, from_parent_id));
        }
        Ok(section)
    }

    /// Edit name, summary, availability or level
    ///
    /// A blank name or availability clears the override. A level change
    /// re-parents the section the way the edit form does (see
    /// [`PlacementEngine::relevel`]).
    pub async fn update_section(
        &self,
        ctx: &RequestContext,
        id: SectionId,
        update: SectionUpdate,
    ) -> Result<ControllerResponse<Section>, SectionError> {
        self.require(ctx, Capability::CourseUpdate)?;
        if let Err(e) = validate_update(&update) {
            return Self::respond(ctx, Err(e));
        }
        if update.is_noop() {
            let tree = self.tree(ctx.course_id).await?;
            return Self::respond(ctx, tree.section(id).cloned());
        }
        let update = &update;
        let result = self
            .queue
            .run(ctx.course_id, move |_| self.try_update(ctx, id, update))
            .await;
        Self::respond(ctx, result)
    }

    async fn try_update(
        &self,
        ctx: &RequestContext,
        id: SectionId,
        update: &SectionUpdate,
    ) -> Result<Section, SectionError> {
        let tree = self.tree(ctx.course_id).await?;
        let from_parent_id = tree.section(id)?.parent_id;

        let mut next = match update.level {
            Some(level) => self.engine.relevel(&tree, id, level)?,
            None => tree.as_ref().clone(),
        };
        let structural = !next.same_structure(&tree);
        apply_update(next.section_mut(id)?, update);

        let upserts = self.commit(&tree, &next).await?;
        let section = latest(&next, &upserts, id)?;
        if upserts.is_empty() {
            return Ok(section);
        }

        tracing::info!(
            "[{}] Updated section {} in course {}",
            ctx.request_id,
            id,
            ctx.course_id
        );
        if structural {
            self.emit_event(moved_event(&section, from_parent_id));
        }
        self.emit_event(SectionEvent::Updated {
            section: section.clone(),
        });
        Ok(section)
    }

    /// Create the course's general section if it has none
    pub async fn ensure_root(&self, ctx: &RequestContext) -> Result<Section, SectionError> {
        self.queue
            .run(ctx.course_id, move |_| self.try_ensure_root(ctx))
            .await
    }

    async fn try_ensure_root(&self, ctx: &RequestContext) -> Result<Section, SectionError> {
        let snapshot = self.store.load_sections(ctx.course_id).await?;
        if !snapshot.sections.is_empty() {
            return Ok(self.tree(ctx.course_id).await?.root().clone());
        }

        let mut root = Section::new_root(self.store.allocate_section_id().await?, ctx.course_id);
        root.modified_at = Utc::now();
        self.store
            .save_sections(
                ctx.course_id,
                crate::db::SectionChangeSet {
                    base_revision: snapshot.revision,
                    upserts: vec![root.clone()],
                    deletions: Vec::new(),
                },
            )
            .await?;
        self.cache.invalidate(ctx.course_id).await;

        tracing::info!(
            "[{}] Created general section {} for course {}",
            ctx.request_id,
            root.id,
            ctx.course_id
        );
        self.emit_event(SectionEvent::Created {
            section: root.clone(),
        });
        Ok(root)
    }

    /// Depth-first outline of the course
    ///
    /// Sections that are not effectively visible are left out unless the
    /// user has `course:viewhiddensections`.
    pub async fn outline(&self, ctx: &RequestContext) -> Result<Vec<SectionSummary>, SectionError> {
        let tree = self.tree(ctx.course_id).await?;
        let show_hidden = self.has(ctx, Capability::ViewHiddenSections);

        let mut rows = Vec::with_capacity(tree.len());
        for section in tree.sections_in_order() {
            let effectively_visible = tree.index().is_effectively_visible(section.id)?;
            if !effectively_visible && !show_hidden {
                continue;
            }
            rows.push(SectionSummary {
                id: section.id,
                ordinal: section.ordinal,
                level: section.level,
                parent_id: section.parent_id,
                display_name: self.namer.display_name(ctx.course_id, section),
                visible: section.visible,
                effectively_visible,
            });
        }
        Ok(rows)
    }
}

/// Committed copy of a section if it was written, else the tree's copy
fn latest(tree: &CourseTree, upserts: &[Section], id: SectionId) -> Result<Section, SectionError> {
    match upserts.iter().find(|s| s.id == id) {
        Some(section) => Ok(section.clone()),
        None => tree.section(id).cloned(),
    }
}

fn moved_event(section: &Section, from_parent_id: Option<SectionId>) -> SectionEvent {
    SectionEvent::Moved {
        course_id: section.course_id,
        section_id: section.id,
        from_parent_id,
        to_parent_id: section.parent_id,
        level: section.level,
        ordinal: section.ordinal,
    }
}

fn validate_update(update: &SectionUpdate) -> Result<(), SectionError> {
    if let Some(Some(name)) = &update.name {
        let length = name.trim().chars().count();
        if length > MAX_SECTION_NAME_LENGTH {
            return Err(SectionError::invalid_update(format!(
                "section name is {} characters long, maximum is {}",
                length, MAX_SECTION_NAME_LENGTH
            )));
        }
    }
    Ok(())
}

fn apply_update(section: &mut Section, update: &SectionUpdate) {
    if let Some(name) = &update.name {
        section.name = non_blank(name.as_deref());
    }
    if let Some(summary) = &update.summary {
        section.summary = summary.clone();
    }
    if let Some(availability) = &update.availability {
        section.availability = non_blank(availability.as_deref());
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[path = "section_controller_test.rs"]
mod section_controller_test;
