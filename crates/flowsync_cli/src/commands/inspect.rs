//! Inspect command implementation.

use super::{format_time, open_store};
use flowsync_status::{EntityKey, EntityStatus, EntitySummary};
use serde::Serialize;
use std::path::Path;

/// Entity inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// The entity.
    pub entity: String,
    /// Aggregated state.
    pub summary: EntitySummary,
    /// Every status record of the entity.
    pub records: Vec<EntityStatus>,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    entity_type: &str,
    entity_id: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let entity = EntityKey::new(entity_type, entity_id);
    entity.validate()?;

    let result = InspectResult {
        entity: entity.to_string(),
        summary: store.summary(&entity),
        records: store.for_entity(&entity),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("flowsync Entity Inspection");
    println!("==========================");
    println!();
    println!("Entity: {}", result.entity);
    println!("  Records:         {}", result.summary.records);
    println!("  Source entity:   {}", result.summary.is_source_entity);
    println!("  Overridden:      {}", result.summary.overridden_locally);
    println!("  Deleted:         {}", result.summary.deleted);
    println!("  Last push:       {}", format_time(result.summary.last_push));
    println!("  Last pull:       {}", format_time(result.summary.last_pull));

    for status in &result.records {
        println!();
        println!("{}", status.key);
        println!("  Flags:           {}", status.flags);
        println!("  Last push:       {}", format_time(status.last_push));
        println!("  Last pull:       {}", format_time(status.last_pull));
        if !status.schema_version.is_empty() {
            println!("  Schema version:  {}", status.schema_version);
        }
        if let Some(parent) = &status.data.parent {
            println!("  Parent:          {}:{}", parent.entity_type, parent.entity_id);
        }
        for (label, details) in [
            ("Push failure", &status.data.push_failure),
            ("Pull failure", &status.data.pull_failure),
        ] {
            if let Some(details) = details {
                println!("  {label}:    {} {}", details.reason, details.message);
            }
        }
        for (field, snapshot) in &status.data.merge {
            println!(
                "  Merge {field}: {}",
                snapshot.last_imported_values.join(",")
            );
        }
    }
}
