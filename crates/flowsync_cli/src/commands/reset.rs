//! Reset command implementation.

use super::open_store;
use flowsync_policy::PoolId;
use std::path::Path;

/// Runs the reset command.
///
/// Every affected record loses its push and pull times and gets both reset
/// flags; the journal is compacted afterwards.
pub fn run(path: &Path, pool: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let pool = pool.map(PoolId::new);

    let affected = store.reset_status_entities(pool.as_ref())?;
    if !store.config().compact_on_reset {
        store.compact()?;
    }

    match &pool {
        Some(pool) => println!("Reset {affected} status records of pool {pool}"),
        None => println!("Reset {affected} status records"),
    }
    Ok(())
}
