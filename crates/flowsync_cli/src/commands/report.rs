//! Report command implementation.

use super::open_store;
use flowsync_status::{Direction, FailureEntry, FailureQuery, Severity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Filters given on the command line.
#[derive(Debug, Default)]
pub struct ReportFilter {
    /// `push` or `pull`.
    pub direction: Option<String>,
    /// Only soft failures.
    pub soft: bool,
    /// Only hard failures.
    pub hard: bool,
    /// Text the reason, kind or message must contain.
    pub reason: Option<String>,
    /// Pool id.
    pub pool: Option<String>,
}

impl ReportFilter {
    /// Builds the store query.
    pub fn to_query(&self) -> Result<FailureQuery, String> {
        let mut query = FailureQuery::new();
        if let Some(direction) = &self.direction {
            query = query.direction(direction.parse::<Direction>()?);
        }
        if self.soft {
            query = query.severity(Severity::Soft);
        } else if self.hard {
            query = query.severity(Severity::Hard);
        }
        if let Some(text) = &self.reason {
            query = query.text(text.clone());
        }
        if let Some(pool) = &self.pool {
            query = query.pool(pool.as_str());
        }
        Ok(query)
    }
}

/// Failure report.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Matching failures.
    pub failures: Vec<FailureEntry>,
    /// Matching failures per reason code.
    pub counts: BTreeMap<String, usize>,
}

/// Runs the report command.
pub fn run(
    path: &Path,
    filter: &ReportFilter,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let query = filter.to_query()?;
    let report = Report {
        failures: store.failures(&query),
        counts: store.failure_counts(&query),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

fn print_text_output(report: &Report) {
    println!("flowsync Failure Report");
    println!("=======================");
    println!();

    if report.failures.is_empty() {
        println!("No failures.");
        return;
    }

    for entry in &report.failures {
        let message = entry
            .details
            .as_ref()
            .map(|d| d.message.as_str())
            .unwrap_or_default();
        println!(
            "{:<5} {:<5} {:<26} {} {}",
            entry.direction,
            entry.severity,
            entry.reason_code(),
            entry.key,
            message
        );
    }

    println!();
    println!("By reason:");
    for (reason, count) in &report.counts {
        println!("  {reason:<26} {count}");
    }
    println!("Total: {}", report.failures.len());
}
