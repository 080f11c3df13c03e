//! The sync core: evaluators, handler dispatch and status bookkeeping.

use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::handler::{EntityHandler, HandlerRegistry, SyncContext};
use crate::intent::{Dependency, EntityRef, Intent};
use crate::merge;
use crate::pull::flow_for_pool_and_entity_type;
use crate::push::PushEvaluator;
use flowsync_policy::{
    Action, EntityTypeConfig, Flow, FlowId, ImportUpdateBehavior, PolicyMatrix, PoolId, Reason,
    ReasonSet,
};
use flowsync_status::{
    EntityKey, FailureDetails, FailureReason, FlagScope, ParentLink, StatusFlag, StatusKey,
    StatusStore,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A flow and pool an entity is pushed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushTarget {
    /// Flow.
    pub flow: FlowId,
    /// Pool.
    pub pool: PoolId,
}

/// Result of pushing one entity to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PushOutcome {
    /// The handler serialized the entity and the push was recorded.
    Pushed,
    /// The payload matches the last pushed one.
    Unchanged,
    /// Declined; recorded as a soft failure.
    Rejected {
        /// Why.
        reason: FailureReason,
    },
}

/// One line of a push run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushReport {
    /// The pushed entity; dependencies get their own reports.
    pub entity: EntityRef,
    /// Flow.
    pub flow: FlowId,
    /// Pool.
    pub pool: PoolId,
    /// What happened.
    pub outcome: PushOutcome,
}

/// A request to apply a remote entity locally.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    /// Pool the entity comes from.
    pub pool: PoolId,
    /// The entity.
    pub entity: EntityRef,
    /// Why the pull happens.
    pub reason: Reason,
    /// What the pull does.
    pub action: Action,
    /// Only exact import modes select a flow.
    pub strict: bool,
    /// Schema version the remote site serialized the entity with.
    pub schema_version: Option<String>,
    /// Remote properties.
    pub properties: Map<String, Value>,
}

impl PullRequest {
    /// Creates a non-strict request without properties.
    pub fn new(pool: impl Into<PoolId>, entity: EntityRef, reason: Reason, action: Action) -> Self {
        Self {
            pool: pool.into(),
            entity,
            reason,
            action,
            strict: false,
            schema_version: None,
            properties: Map::new(),
        }
    }

    /// Sets strict flow selection.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the remote schema version.
    #[must_use]
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    /// Sets the remote properties.
    #[must_use]
    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }
}

/// Result of pulling one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullOutcome {
    /// Applied under `flow`.
    Pulled {
        /// The selected flow.
        flow: FlowId,
    },
    /// Declined; recorded as a soft failure.
    Rejected {
        /// Why.
        reason: FailureReason,
    },
}

/// One line of a pull run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullReport {
    /// The pulled entity; dependencies get their own reports.
    pub entity: EntityRef,
    /// Pool.
    pub pool: PoolId,
    /// What happened.
    pub outcome: PullOutcome,
}

/// Decides, dispatches and records synchronization of entities.
///
/// The core owns no entity storage. Entity handlers serialize entities into
/// intents and apply pulled intents; the core decides which flows and pools
/// apply and keeps the status store current.
pub struct SyncCore {
    policy: Arc<dyn PolicyMatrix>,
    status: Arc<StatusStore>,
    handlers: HandlerRegistry,
    config: EngineConfig,
}

impl SyncCore {
    /// Creates a core with default configuration and no handlers.
    pub fn new(policy: Arc<dyn PolicyMatrix>, status: Arc<StatusStore>) -> Self {
        Self {
            policy,
            status,
            handlers: HandlerRegistry::new(),
            config: EngineConfig::default(),
        }
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a handler under `id`.
    #[must_use]
    pub fn with_handler(self, id: impl Into<String>, handler: Arc<dyn EntityHandler>) -> Self {
        self.handlers.register(id, handler);
        self
    }

    /// Registers a handler under `id`, replacing any previous one.
    pub fn register_handler(&self, id: impl Into<String>, handler: Arc<dyn EntityHandler>) {
        self.handlers.register(id, handler);
    }

    /// The policy.
    pub fn policy(&self) -> &dyn PolicyMatrix {
        self.policy.as_ref()
    }

    /// The status store.
    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The registered handlers.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Returns a push evaluator over this core's status store.
    pub fn push_evaluator(&self) -> PushEvaluator<'_> {
        PushEvaluator::new(&self.status)
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Returns every flow and pool the entity would be pushed to.
    ///
    /// Pools a flow names but the policy does not define are skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for empty identifiers.
    pub fn evaluate_push(
        &self,
        entity: &EntityRef,
        reason: Reason,
        action: Action,
    ) -> SyncResult<Vec<PushTarget>> {
        entity.validate()?;
        let evaluator = self.push_evaluator();
        let mut targets = Vec::new();

        for flow in self.policy.flows() {
            for pool in evaluator.pools_to_push_to(&flow, entity, reason, action, true) {
                if self.policy.pool(&pool).is_none() {
                    tracing::debug!(flow = %flow.id, pool = %pool, "skipping undefined pool");
                    continue;
                }
                targets.push(PushTarget {
                    flow: flow.id.clone(),
                    pool,
                });
            }
        }
        Ok(targets)
    }

    /// Returns true if `flow` may push the entity for `reason`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for empty identifiers and `UnknownFlow` for
    /// a flow the policy does not define.
    pub fn can_push_entity(
        &self,
        flow: &FlowId,
        entity: &EntityRef,
        reason: Reason,
        action: Action,
        pool: Option<&PoolId>,
    ) -> SyncResult<bool> {
        entity.validate()?;
        let flow = self.flow(flow)?;
        Ok(self
            .push_evaluator()
            .can_push_entity(&flow, entity, ReasonSet::from(reason), action, pool))
    }

    /// Returns the flow that pulls the entity from `pool`, if any.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for empty identifiers.
    pub fn evaluate_pull(
        &self,
        pool: &PoolId,
        entity_type: &str,
        bundle: &str,
        reason: Reason,
        action: Action,
        strict: bool,
    ) -> SyncResult<Option<Flow>> {
        if pool.as_str().is_empty() {
            return Err(SyncError::invalid_argument("empty pool id"));
        }
        if entity_type.is_empty() || bundle.is_empty() {
            return Err(SyncError::invalid_argument("empty entity type or bundle"));
        }
        if self.policy.pool(pool).is_none() {
            return Ok(None);
        }
        let flows = self.policy.flows();
        Ok(
            flow_for_pool_and_entity_type(&flows, pool, entity_type, bundle, reason, action, strict)
                .cloned(),
        )
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Records the outcome of a push performed outside [`SyncCore::push`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for empty identifiers or a status error.
    pub fn record_push_result(
        &self,
        entity: &EntityRef,
        flow: &FlowId,
        pool: &PoolId,
        action: Action,
        failure: Option<FailureDetails>,
    ) -> SyncResult<()> {
        entity.validate()?;
        let key = self.status_key(entity, flow, pool)?;
        match failure {
            None => self.status.update(&key, |s| {
                s.set_last_push(Some(chrono::Utc::now()));
                if action == Action::Delete {
                    s.set_flag(StatusFlag::Deleted, true);
                }
            })?,
            Some(details) => {
                let soft = details.reason.is_soft();
                self.status.set_push_failed(&key, true, soft, Some(details))?;
            }
        }
        Ok(())
    }

    /// Records the outcome of a pull performed outside [`SyncCore::pull`].
    ///
    /// Failures without a flow are recorded under the unattributed key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for empty identifiers or for a success
    /// without a flow, or a status error.
    pub fn record_pull_result(
        &self,
        entity: &EntityRef,
        flow: Option<&FlowId>,
        pool: &PoolId,
        action: Action,
        failure: Option<FailureDetails>,
    ) -> SyncResult<()> {
        entity.validate()?;
        let key = match flow {
            Some(flow) => self.status_key(entity, flow, pool)?,
            None if failure.is_some() => {
                if pool.as_str().is_empty() {
                    return Err(SyncError::invalid_argument("empty pool id"));
                }
                StatusKey::unattributed(&entity.key(), pool.clone())
            }
            None => return Err(SyncError::invalid_argument("successful pull without a flow")),
        };
        match failure {
            None => {
                self.status.record_pull(&key, chrono::Utc::now(), |s| {
                    if action == Action::Delete {
                        s.set_flag(StatusFlag::Deleted, true);
                    }
                })?;
            }
            Some(details) => {
                let soft = details.reason.is_soft();
                self.status.set_pull_failed(&key, true, soft, Some(details))?;
            }
        }
        Ok(())
    }

    /// Merges a reference list field and stores the merge history at once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for empty identifiers, `UnknownFlow`, or a
    /// status error.
    pub fn merge_reference_list(
        &self,
        flow: &FlowId,
        pool: &PoolId,
        entity: &EntityRef,
        field: &str,
        remote: &[String],
        local: &[String],
    ) -> SyncResult<Vec<String>> {
        entity.validate()?;
        let key = self.status_key(entity, flow, pool)?;
        let flow = self.flow(flow)?;
        let config = flow.entity_type_config(&entity.entity_type, &entity.bundle);
        let allow_merge = config.is_some_and(|c| c.allows_merge(field));
        let target_type = config
            .and_then(|c| c.field(field))
            .and_then(|f| f.target_entity_type.clone())
            .unwrap_or_else(|| entity.entity_type.clone());

        let result = merge::merge_reference_list(
            remote,
            local,
            self.status.merge_snapshot(&key, field).as_ref(),
            allow_merge,
            |id| self.is_remote_sourced(&EntityKey::new(target_type.clone(), id)),
        );
        self.status.set_merge_snapshot(&key, field, result.snapshot)?;
        Ok(result.merged)
    }

    // ------------------------------------------------------------------
    // Local editing guards
    // ------------------------------------------------------------------

    /// Returns false if an imported entity must not be deleted on this site.
    pub fn can_delete_locally(&self, entity: &EntityRef) -> bool {
        self.pulled_configs(entity)
            .iter()
            .all(|c| c.allow_local_deletion_of_import)
    }

    /// Returns false if remote updates of the entity forbid local edits.
    pub fn is_local_edit_allowed(&self, entity: &EntityRef) -> bool {
        self.pulled_configs(entity)
            .iter()
            .all(|c| c.import_update_behavior != ImportUpdateBehavior::ForceAndForbidEditing)
    }

    /// Configs of the flows an entity was pulled under. Empty for source
    /// entities.
    fn pulled_configs(&self, entity: &EntityRef) -> Vec<EntityTypeConfig> {
        let key = entity.key();
        if self.status.summary(&key).is_source_entity {
            return Vec::new();
        }
        self.status
            .for_entity(&key)
            .into_iter()
            .filter(|s| s.last_pull.is_some())
            .filter_map(|s| s.key.flow.flow_id().and_then(|id| self.policy.flow(id)))
            .filter_map(|flow| {
                flow.entity_type_config(&entity.entity_type, &entity.bundle)
                    .cloned()
            })
            .collect()
    }

    /// Returns true if the entity was pulled and is not authored here.
    pub(crate) fn is_remote_sourced(&self, entity: &EntityKey) -> bool {
        let summary = self.status.summary(entity);
        summary.last_pull.is_some() && !summary.is_source_entity
    }

    // ------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------

    /// Pushes an entity through every qualifying flow and pool.
    ///
    /// The handler of each flow fills the intent; dependencies it adds are
    /// pushed afterwards with reason `as_dependency`. Rejections are
    /// recorded and reported; the first handler error is recorded and
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument`, `UnknownHandler`, `Handler`, or a status
    /// error.
    pub fn push(
        &self,
        entity: &EntityRef,
        reason: Reason,
        action: Action,
        properties: Map<String, Value>,
    ) -> SyncResult<Vec<PushReport>> {
        let mut reports = Vec::new();
        self.push_at(entity, reason, action, &properties, 0, None, None, &mut reports)?;
        Ok(reports)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_at(
        &self,
        entity: &EntityRef,
        reason: Reason,
        action: Action,
        properties: &Map<String, Value>,
        depth: usize,
        parent: Option<ParentLink>,
        inherited: Option<&PushTarget>,
        reports: &mut Vec<PushReport>,
    ) -> SyncResult<()> {
        let mut targets = self.evaluate_push(entity, reason, action)?;
        if let Some(target) = inherited {
            if !targets.contains(target) && self.accepts_inherited(target, entity, reason, action)? {
                targets.push(target.clone());
            }
        }
        if targets.is_empty() {
            tracing::debug!(entity = %entity, reason = %reason, "no flow pushes entity");
            return Ok(());
        }

        for target in targets {
            let opted_in = inherited == Some(&target);
            let flow = self.flow(&target.flow)?;
            let Some(config) = flow.entity_type_config(&entity.entity_type, &entity.bundle) else {
                continue;
            };
            let key = entity.status_key(&flow.id, &target.pool);
            let report = |outcome| PushReport {
                entity: entity.clone(),
                flow: flow.id.clone(),
                pool: target.pool.clone(),
                outcome,
            };

            if self.schema_drift(config, action, None) {
                self.reject_push(&key, entity, reason, action, FailureReason::DifferentSchemaVersion)?;
                reports.push(report(PushOutcome::Rejected {
                    reason: FailureReason::DifferentSchemaVersion,
                }));
                continue;
            }

            let handler = self.handler_for(config, &key, reason, action, true)?;
            let mut intent = Intent::new(
                entity.clone(),
                flow.id.clone(),
                target.pool.clone(),
                reason,
                action,
            )
            .with_properties(properties.clone())
            .with_depth(depth);

            let ctx = SyncContext::new(self, &flow, config);
            match handler.push(&ctx, &mut intent) {
                Ok(true) => {}
                Ok(false) => {
                    self.reject_push(&key, entity, reason, action, FailureReason::HandlerDenied)?;
                    reports.push(report(PushOutcome::Rejected {
                        reason: FailureReason::HandlerDenied,
                    }));
                    continue;
                }
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "push handler failed");
                    let details = FailureDetails::hard(&err.kind, &err.message, action, reason)
                        .with_bundle(&entity.bundle);
                    self.status.set_push_failed(&key, true, false, Some(details))?;
                    return Err(err.into());
                }
            }

            let hash = intent.payload_hash();
            let unchanged = action == Action::Update
                && self.status.get(&key).is_some_and(|s| {
                    s.last_push.is_some() && s.data.push_hash.as_deref() == Some(hash.as_str())
                });
            if unchanged {
                tracing::debug!(key = %key, "payload unchanged, skipping push");
                reports.push(report(PushOutcome::Unchanged));
                continue;
            }

            self.status.update(&key, |s| {
                s.set_last_push(Some(chrono::Utc::now()));
                s.data.push_hash = Some(hash);
                s.schema_version.clone_from(&config.schema_version);
                if action == Action::Delete {
                    s.set_flag(StatusFlag::Deleted, true);
                }
                if let Some(parent) = &parent {
                    s.set_flag(StatusFlag::PushedEmbedded, true);
                    s.data.parent = Some(parent.clone());
                }
                if opted_in {
                    s.set_flag(StatusFlag::DependencyPushEnabled, true);
                }
            })?;
            tracing::debug!(key = %key, action = %action, "pushed entity");
            reports.push(report(PushOutcome::Pushed));

            let dependencies = intent.take_dependencies();
            if !self.follows(depth, dependencies.len(), entity) {
                continue;
            }
            for dependency in dependencies {
                self.push_dependency(entity, &flow.id, &target.pool, dependency, depth, reports)?;
            }
        }
        Ok(())
    }

    fn push_dependency(
        &self,
        parent: &EntityRef,
        flow: &FlowId,
        pool: &PoolId,
        dependency: Dependency,
        depth: usize,
        reports: &mut Vec<PushReport>,
    ) -> SyncResult<()> {
        let Dependency {
            entity,
            embedded,
            properties,
        } = dependency;
        entity.validate()?;

        let key = entity.status_key(flow, pool);
        let action = if self.status.last_push(&key).is_some() {
            Action::Update
        } else {
            Action::Create
        };
        let link = embedded.then(|| ParentLink {
            entity_type: parent.entity_type.clone(),
            entity_id: parent.id.clone(),
        });
        self.push_at(
            &entity,
            Reason::AsDependency,
            action,
            &properties,
            depth + 1,
            link,
            Some(&PushTarget {
                flow: flow.clone(),
                pool: pool.clone(),
            }),
            reports,
        )
    }

    /// Returns true if a dependency may follow its parent into `target`
    /// through an `allow` pool it has not been opted into yet.
    fn accepts_inherited(
        &self,
        target: &PushTarget,
        entity: &EntityRef,
        reason: Reason,
        action: Action,
    ) -> SyncResult<bool> {
        if self.policy.pool(&target.pool).is_none() {
            return Ok(false);
        }
        let flow = self.flow(&target.flow)?;
        Ok(self.push_evaluator().can_push_entity(
            &flow,
            entity,
            ReasonSet::from(reason),
            action,
            Some(&target.pool),
        ))
    }

    fn reject_push(
        &self,
        key: &StatusKey,
        entity: &EntityRef,
        reason: Reason,
        action: Action,
        failure: FailureReason,
    ) -> SyncResult<()> {
        tracing::debug!(key = %key, reason = %failure, "push rejected");
        let details = FailureDetails::soft(failure, action, reason).with_bundle(&entity.bundle);
        self.status.set_push_failed(key, true, true, Some(details))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------

    /// Applies a remote entity through the flow that pulls it.
    ///
    /// Without a pool or flow the rejection is recorded under the
    /// unattributed key, which the next successful pull of the entity
    /// removes. Dependencies the handler adds are pulled afterwards with
    /// reason `as_dependency`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument`, `UnknownHandler`, `Handler`, or a status
    /// error.
    pub fn pull(&self, request: &PullRequest) -> SyncResult<Vec<PullReport>> {
        let mut reports = Vec::new();
        self.pull_at(request, 0, None, &mut reports)?;
        Ok(reports)
    }

    fn pull_at(
        &self,
        request: &PullRequest,
        depth: usize,
        parent: Option<ParentLink>,
        reports: &mut Vec<PullReport>,
    ) -> SyncResult<()> {
        let entity = &request.entity;
        entity.validate()?;
        if request.pool.as_str().is_empty() {
            return Err(SyncError::invalid_argument("empty pool id"));
        }
        let report = |outcome| PullReport {
            entity: entity.clone(),
            pool: request.pool.clone(),
            outcome,
        };
        let unattributed = StatusKey::unattributed(&entity.key(), request.pool.clone());

        let flow = self.evaluate_pull(
            &request.pool,
            &entity.entity_type,
            &entity.bundle,
            request.reason,
            request.action,
            request.strict,
        )?;
        let flow = match flow {
            Some(flow) => flow,
            None => {
                let failure = if self.policy.pool(&request.pool).is_none() {
                    FailureReason::UnknownPool
                } else {
                    FailureReason::NoFlow
                };
                self.reject_pull(&unattributed, request, failure)?;
                reports.push(report(PullOutcome::Rejected { reason: failure }));
                return Ok(());
            }
        };
        let Some(config) = flow.entity_type_config(&entity.entity_type, &entity.bundle) else {
            self.reject_pull(&unattributed, request, FailureReason::NoFlow)?;
            reports.push(report(PullOutcome::Rejected {
                reason: FailureReason::NoFlow,
            }));
            return Ok(());
        };
        let key = entity.status_key(&flow.id, &request.pool);

        if let Some(failure) = self.pull_rejection(config, &key, request) {
            self.reject_pull(&key, request, failure)?;
            reports.push(report(PullOutcome::Rejected { reason: failure }));
            return Ok(());
        }

        let handler = self.handler_for(config, &key, request.reason, request.action, false)?;
        let mut intent = Intent::new(
            entity.clone(),
            flow.id.clone(),
            request.pool.clone(),
            request.reason,
            request.action,
        )
        .with_properties(request.properties.clone())
        .with_depth(depth);
        if request.action == Action::Create
            && config.import_update_behavior == ImportUpdateBehavior::Unpublished
        {
            intent.mark_unpublished();
        }

        let ctx = SyncContext::new(self, &flow, config);
        match handler.pull(&ctx, &mut intent) {
            Ok(true) => {}
            Ok(false) => {
                self.reject_pull(&key, request, FailureReason::HandlerDenied)?;
                reports.push(report(PullOutcome::Rejected {
                    reason: FailureReason::HandlerDenied,
                }));
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "pull handler failed");
                let details =
                    FailureDetails::hard(&err.kind, &err.message, request.action, request.reason)
                        .with_bundle(&entity.bundle);
                self.status.set_pull_failed(&key, true, false, Some(details))?;
                return Err(err.into());
            }
        }

        let snapshots = intent.take_snapshots();
        self.status.record_pull(&key, chrono::Utc::now(), |s| {
            s.schema_version.clone_from(&config.schema_version);
            s.data.merge.extend(snapshots);
            s.set_flag(StatusFlag::Deleted, request.action == Action::Delete);
            if let Some(parent) = &parent {
                s.set_flag(StatusFlag::PulledEmbedded, true);
                s.data.parent = Some(parent.clone());
            }
        })?;
        tracing::debug!(key = %key, action = %request.action, "pulled entity");
        reports.push(report(PullOutcome::Pulled {
            flow: flow.id.clone(),
        }));

        let dependencies = intent.take_dependencies();
        if !self.follows(depth, dependencies.len(), entity) {
            return Ok(());
        }
        for dependency in dependencies {
            self.pull_dependency(entity, &flow.id, request, dependency, depth, reports)?;
        }
        Ok(())
    }

    fn pull_dependency(
        &self,
        parent: &EntityRef,
        flow: &FlowId,
        request: &PullRequest,
        dependency: Dependency,
        depth: usize,
        reports: &mut Vec<PullReport>,
    ) -> SyncResult<()> {
        let Dependency {
            entity,
            embedded,
            properties,
        } = dependency;
        entity.validate()?;

        let action = if self
            .status
            .last_pull(&entity.status_key(flow, &request.pool))
            .is_some()
        {
            Action::Update
        } else {
            Action::Create
        };
        let link = embedded.then(|| ParentLink {
            entity_type: parent.entity_type.clone(),
            entity_id: parent.id.clone(),
        });
        let dependency_request = PullRequest::new(
            request.pool.clone(),
            entity,
            Reason::AsDependency,
            action,
        )
        .with_properties(properties);
        self.pull_at(&dependency_request, depth + 1, link, reports)
    }

    /// Import-side policy checks that run after a flow was selected.
    fn pull_rejection(
        &self,
        config: &EntityTypeConfig,
        key: &StatusKey,
        request: &PullRequest,
    ) -> Option<FailureReason> {
        if self.schema_drift(config, request.action, request.schema_version.as_deref()) {
            return Some(FailureReason::DifferentSchemaVersion);
        }
        if request.action != Action::Update {
            return None;
        }
        match config.import_update_behavior {
            ImportUpdateBehavior::Ignore => Some(FailureReason::UpdateIgnored),
            ImportUpdateBehavior::ForceUnlessOverridden
                if self.status.is_overridden_locally(key, FlagScope::Entity) =>
            {
                Some(FailureReason::OverriddenLocally)
            }
            _ => None,
        }
    }

    fn reject_pull(
        &self,
        key: &StatusKey,
        request: &PullRequest,
        failure: FailureReason,
    ) -> SyncResult<()> {
        tracing::debug!(key = %key, reason = %failure, "pull rejected");
        let details = FailureDetails::soft(failure, request.action, request.reason)
            .with_bundle(&request.entity.bundle);
        self.status.set_pull_failed(key, true, true, Some(details))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Returns true if the bundle's schema drifted for a create or update.
    ///
    /// Drift is a configured version that differs from the bundle's current
    /// field set, or from the version a remote entity was serialized with.
    fn schema_drift(&self, config: &EntityTypeConfig, action: Action, remote: Option<&str>) -> bool {
        if !self.config.check_schema_version
            || action == Action::Delete
            || config.schema_version.is_empty()
        {
            return false;
        }
        let local_drift = self
            .policy
            .schema_version(&config.entity_type, &config.bundle)
            .is_some_and(|current| current != config.schema_version);
        let remote_drift = remote.is_some_and(|v| v != config.schema_version);
        local_drift || remote_drift
    }

    fn handler_for(
        &self,
        config: &EntityTypeConfig,
        key: &StatusKey,
        reason: Reason,
        action: Action,
        push: bool,
    ) -> SyncResult<Arc<dyn EntityHandler>> {
        if let Some(handler) = self.handlers.get(&config.handler) {
            return Ok(handler);
        }
        tracing::warn!(key = %key, handler = %config.handler, "no entity handler registered");
        let details = FailureDetails::hard(
            "UnknownHandler",
            format!("no entity handler registered as '{}'", config.handler),
            action,
            reason,
        )
        .with_bundle(&config.bundle);
        if push {
            self.status.set_push_failed(key, true, false, Some(details))?;
        } else {
            self.status.set_pull_failed(key, true, false, Some(details))?;
        }
        Err(SyncError::UnknownHandler(config.handler.clone()))
    }

    fn follows(&self, depth: usize, dependencies: usize, entity: &EntityRef) -> bool {
        if dependencies == 0 || !self.config.follow_dependencies {
            return false;
        }
        if depth >= self.config.max_dependency_depth {
            tracing::warn!(
                entity = %entity,
                depth,
                skipped = dependencies,
                "dependency depth limit reached"
            );
            return false;
        }
        true
    }

    fn flow(&self, id: &FlowId) -> SyncResult<Flow> {
        if id.as_str().is_empty() {
            return Err(SyncError::invalid_argument("empty flow id"));
        }
        self.policy
            .flow(id)
            .ok_or_else(|| SyncError::UnknownFlow(id.clone()))
    }

    fn status_key(&self, entity: &EntityRef, flow: &FlowId, pool: &PoolId) -> SyncResult<StatusKey> {
        if flow.as_str().is_empty() {
            return Err(SyncError::invalid_argument("empty flow id"));
        }
        if pool.as_str().is_empty() {
            return Err(SyncError::invalid_argument("empty pool id"));
        }
        Ok(entity.status_key(flow, pool))
    }
}

impl std::fmt::Debug for SyncCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCore")
            .field("status", &self.status)
            .field("handlers", &self.handlers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
