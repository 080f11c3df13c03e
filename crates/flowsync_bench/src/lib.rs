//! Benchmark utilities.

use flowsync_policy::{EntityTypeConfig, Flow, InMemoryPolicy, Pool, PoolUsage, SyncMode};
use flowsync_status::StatusKey;
use rand::seq::SliceRandom;
use rand::Rng;

/// Generates `count` distinct reference ids.
pub fn reference_list(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("term:{i}")).collect()
}

/// Returns `list` with roughly `ratio` of its items moved, dropped or added.
pub fn perturb(list: &[String], ratio: f64) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut out: Vec<String> = list
        .iter()
        .filter(|_| !rng.gen_bool(ratio / 2.0))
        .cloned()
        .collect();
    let changes = (list.len() as f64 * ratio) as usize;
    for i in 0..changes {
        let at = rng.gen_range(0..=out.len());
        out.insert(at, format!("local:{i}"));
    }
    if changes > 0 {
        let window = changes.min(out.len());
        out[..window].shuffle(&mut rng);
    }
    out
}

/// Generates status keys spread over `pools` pools.
pub fn status_keys(count: usize, pools: usize) -> Vec<StatusKey> {
    (0..count)
        .map(|i| StatusKey::new("node", i.to_string(), "articles", format!("pool_{}", i % pools)))
        .collect()
}

/// Builds a policy of `flows` flows over `bundles` bundles each.
pub fn policy(flows: usize, bundles: usize) -> InMemoryPolicy {
    let mut policy = InMemoryPolicy::new().with_pool(Pool::new("content"));
    for f in 0..flows {
        let mut flow = Flow::new(format!("flow_{f}"));
        for b in 0..bundles {
            flow = flow.with_entity_type(
                EntityTypeConfig::new("node", format!("bundle_{b}"), "default")
                    .with_export(SyncMode::Automatic)
                    .with_export_pool("content", PoolUsage::Force)
                    .with_import(SyncMode::Automatic)
                    .with_import_pool("content", PoolUsage::Force),
            );
        }
        policy = policy.with_flow(flow);
    }
    policy
}
