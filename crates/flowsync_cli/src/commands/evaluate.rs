//! Dry-run push and pull evaluation.

use super::open_store;
use flowsync_engine::{can_pull_entity, EntityRef, PushTarget, SyncCore};
use flowsync_policy::{Action, FlowId, InMemoryPolicy, PoolId, Reason};
use flowsync_status::StatusStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Entity and intent for `evaluate-push`.
#[derive(Debug)]
pub struct PushQuery {
    /// Entity type.
    pub entity_type: String,
    /// Bundle.
    pub bundle: String,
    /// Entity id.
    pub entity_id: String,
    /// Reason name.
    pub reason: String,
    /// Action name.
    pub action: String,
}

/// Entity and intent for `evaluate-pull`.
#[derive(Debug)]
pub struct PullQuery {
    /// Pool id.
    pub pool: String,
    /// Entity type.
    pub entity_type: String,
    /// Bundle.
    pub bundle: String,
    /// Reason name.
    pub reason: String,
    /// Action name.
    pub action: String,
    /// Strict flow selection.
    pub strict: bool,
}

/// Push decision of one flow.
#[derive(Debug, Serialize)]
pub struct PushDecision {
    /// Flow.
    pub flow: FlowId,
    /// Whether the flow pushes the entity at all.
    pub can_push: bool,
}

/// Result of `evaluate-push`.
#[derive(Debug, Serialize)]
pub struct PushEvaluation {
    /// The entity.
    pub entity: EntityRef,
    /// Reason.
    pub reason: Reason,
    /// Action.
    pub action: Action,
    /// Decision per flow, in configuration order.
    pub flows: Vec<PushDecision>,
    /// Flows and pools the entity would be pushed to.
    pub targets: Vec<PushTarget>,
}

/// Pull decision of one flow.
#[derive(Debug, Serialize)]
pub struct PullDecision {
    /// Flow.
    pub flow: FlowId,
    /// Exact import mode match.
    pub strict: bool,
    /// Match including dependency fallback.
    pub lenient: bool,
}

/// Result of `evaluate-pull`.
#[derive(Debug, Serialize)]
pub struct PullEvaluation {
    /// Pool.
    pub pool: PoolId,
    /// Whether the policy defines the pool.
    pub known_pool: bool,
    /// Decision per flow, in configuration order.
    pub flows: Vec<PullDecision>,
    /// The selected flow.
    pub selected: Option<FlowId>,
}

/// Evaluates a push against a policy and status store.
pub fn evaluate_push(
    core: &SyncCore,
    query: &PushQuery,
) -> Result<PushEvaluation, Box<dyn std::error::Error>> {
    let entity = EntityRef::new(&query.entity_type, &query.bundle, &query.entity_id);
    let reason: Reason = query.reason.parse()?;
    let action: Action = query.action.parse()?;

    let mut flows = Vec::new();
    for flow in core.policy().flows() {
        let can_push = core.can_push_entity(&flow.id, &entity, reason, action, None)?;
        flows.push(PushDecision {
            flow: flow.id,
            can_push,
        });
    }
    let targets = core.evaluate_push(&entity, reason, action)?;

    Ok(PushEvaluation {
        entity,
        reason,
        action,
        flows,
        targets,
    })
}

/// Evaluates flow selection for a pull.
pub fn evaluate_pull(
    core: &SyncCore,
    query: &PullQuery,
) -> Result<PullEvaluation, Box<dyn std::error::Error>> {
    let pool = PoolId::new(&query.pool);
    let reason: Reason = query.reason.parse()?;
    let action: Action = query.action.parse()?;

    let flows = core
        .policy()
        .flows_using_pool(&pool)
        .into_iter()
        .map(|flow| PullDecision {
            strict: can_pull_entity(&flow, &query.entity_type, &query.bundle, reason, action, true),
            lenient: can_pull_entity(&flow, &query.entity_type, &query.bundle, reason, action, false),
            flow: flow.id,
        })
        .collect();
    let selected = core
        .evaluate_pull(
            &pool,
            &query.entity_type,
            &query.bundle,
            reason,
            action,
            query.strict,
        )?
        .map(|flow| flow.id);

    Ok(PullEvaluation {
        known_pool: core.policy().pool(&pool).is_some(),
        pool,
        flows,
        selected,
    })
}

/// Runs the evaluate-push command.
pub fn push(
    policy: &Path,
    status: Option<&Path>,
    query: &PushQuery,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = match status {
        Some(path) => open_store(path)?,
        None => StatusStore::in_memory(),
    };
    let core = SyncCore::new(
        Arc::new(InMemoryPolicy::from_path(policy)?),
        Arc::new(store),
    );
    let result = evaluate_push(&core, query)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!("Push {} ({}, {})", result.entity, result.reason, result.action);
            for decision in &result.flows {
                let verdict = if decision.can_push { "pushes" } else { "skips" };
                println!("  {:<24} {verdict}", decision.flow.as_str());
            }
            if result.targets.is_empty() {
                println!("No targets.");
            }
            for target in &result.targets {
                println!("  -> {}/{}", target.flow, target.pool);
            }
        }
    }
    Ok(())
}

/// Runs the evaluate-pull command.
pub fn pull(policy: &Path, query: &PullQuery, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let core = SyncCore::new(
        Arc::new(InMemoryPolicy::from_path(policy)?),
        Arc::new(StatusStore::in_memory()),
    );
    let result = evaluate_pull(&core, query)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            if !result.known_pool {
                println!("Pool {} is not defined: unknown_pool", result.pool);
                return Ok(());
            }
            for decision in &result.flows {
                println!(
                    "  {:<24} strict={} lenient={}",
                    decision.flow.as_str(),
                    decision.strict,
                    decision.lenient
                );
            }
            match &result.selected {
                Some(flow) => println!("Selected flow: {flow}"),
                None => println!("No flow: no_flow"),
            }
        }
    }
    Ok(())
}
