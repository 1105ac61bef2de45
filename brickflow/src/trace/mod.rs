//! Execution trace capture.
//!
//! The executor emits an in-flight record when a step starts and a
//! terminal record when it settles; the sink keeps the latest picture per
//! step instance so debugging tools can show "what did this step see and
//! produce" without replaying the run.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

/// One level of nested-pipeline lineage.
///
/// The key names which embedded pipeline was entered (`if`, `try`,
/// `catch`, a config key); the counter distinguishes repeated entries of
/// the same branch within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// The branch label.
    pub key: String,
    /// Zero-based entry counter for this label.
    pub counter: u64,
}

impl Branch {
    /// Creates a branch level.
    #[must_use]
    pub fn new(key: impl Into<String>, counter: u64) -> Self {
        Self {
            key: key.into(),
            counter,
        }
    }
}

/// How a traced step call ended (or that it has not yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceOutcome {
    /// The step has started and not yet settled.
    InFlight,
    /// The step completed with this output.
    Output {
        /// The brick's result.
        value: Value,
    },
    /// The step failed.
    Error {
        /// The failure message.
        message: String,
        /// True when the failure was a deliberate business error.
        is_business: bool,
    },
    /// The step's `if` gate evaluated falsy and the brick never ran.
    Skipped,
}

impl TraceOutcome {
    /// Returns true for outcomes that settle the call.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InFlight)
    }
}

/// One step call observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// The run this call belongs to.
    pub run_id: Uuid,
    /// The owning mod component.
    pub component_id: Uuid,
    /// The step's definition instance id.
    pub instance_id: Uuid,
    /// The referenced brick id.
    pub brick_id: String,
    /// Nested-pipeline lineage, outermost first.
    pub branch_stack: Vec<Branch>,
    /// Snapshot of the evaluation context at call time.
    pub template_context: Value,
    /// The deeply rendered config, when rendering got that far.
    pub rendered_args: Option<Value>,
    /// When the record was taken.
    pub timestamp: DateTime<Utc>,
    /// The call's outcome so far.
    pub outcome: TraceOutcome,
}

impl TraceRecord {
    fn same_call(&self, other: &Self) -> bool {
        self.run_id == other.run_id
            && self.instance_id == other.instance_id
            && self.branch_stack == other.branch_stack
    }
}

/// In-memory trace store, partitioned by mod component.
#[derive(Default)]
pub struct TraceSink {
    records: DashMap<Uuid, Vec<TraceRecord>>,
}

impl TraceSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record.
    ///
    /// A terminal record replaces the in-flight record of the same call,
    /// so each call settles to exactly one entry with either an output or
    /// an error (never both).
    pub fn record(&self, record: TraceRecord) {
        trace!(
            instance_id = %record.instance_id,
            run_id = %record.run_id,
            terminal = record.outcome.is_terminal(),
            "trace record",
        );

        let mut records = self.records.entry(record.component_id).or_default();
        if record.outcome.is_terminal() {
            if let Some(existing) = records
                .iter_mut()
                .find(|existing| existing.same_call(&record) && !existing.outcome.is_terminal())
            {
                *existing = record;
                return;
            }
        }
        records.push(record);
    }

    /// Returns a component's records for one step instance, latest first.
    #[must_use]
    pub fn get_by_instance_id(&self, component_id: Uuid, instance_id: Uuid) -> Vec<TraceRecord> {
        let Some(records) = self.records.get(&component_id) else {
            return Vec::new();
        };
        let mut matches: Vec<TraceRecord> = records
            .iter()
            .filter(|record| record.instance_id == instance_id)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches
    }

    /// Returns all records for a component, in arrival order.
    #[must_use]
    pub fn get_for_component(&self, component_id: Uuid) -> Vec<TraceRecord> {
        self.records
            .get(&component_id)
            .map(|records| records.value().clone())
            .unwrap_or_default()
    }

    /// Drops all records for a component (re-run, mod removal).
    pub fn clear_for_component(&self, component_id: Uuid) {
        self.records.remove(&component_id);
    }
}

impl std::fmt::Debug for TraceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceSink")
            .field("component_count", &self.records.len())
            .finish()
    }
}

/// Keeps the records whose lineage starts with the given branch prefix.
///
/// With the prefix of a currently-active nested call this selects that
/// call's own steps (and deeper), hiding sibling iterations.
#[must_use]
pub fn filter_traces_by_call(records: &[TraceRecord], branch_prefix: &[Branch]) -> Vec<TraceRecord> {
    records
        .iter()
        .filter(|record| {
            record.branch_stack.len() >= branch_prefix.len()
                && record.branch_stack[..branch_prefix.len()] == *branch_prefix
        })
        .cloned()
        .collect()
}

/// Returns the most recent call record for a step instance.
#[must_use]
pub fn get_latest_brick_call<'a>(
    records: &'a [TraceRecord],
    instance_id: Uuid,
) -> Option<&'a TraceRecord> {
    records
        .iter()
        .filter(|record| record.instance_id == instance_id)
        .max_by_key(|record| record.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(
        component_id: Uuid,
        instance_id: Uuid,
        run_id: Uuid,
        branch_stack: Vec<Branch>,
        outcome: TraceOutcome,
    ) -> TraceRecord {
        TraceRecord {
            run_id,
            component_id,
            instance_id,
            brick_id: "brickflow/transform/echo".to_string(),
            branch_stack,
            template_context: json!({}),
            rendered_args: Some(json!({"value": 1})),
            timestamp: Utc::now(),
            outcome,
        }
    }

    #[test]
    fn test_terminal_record_replaces_in_flight() {
        let sink = TraceSink::new();
        let component = Uuid::new_v4();
        let instance = Uuid::new_v4();
        let run = Uuid::new_v4();

        sink.record(record(component, instance, run, vec![], TraceOutcome::InFlight));
        sink.record(record(
            component,
            instance,
            run,
            vec![],
            TraceOutcome::Output { value: json!(42) },
        ));

        let records = sink.get_by_instance_id(component, instance);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, TraceOutcome::Output { value: json!(42) });
    }

    #[test]
    fn test_repeated_runs_accumulate_latest_first() {
        let sink = TraceSink::new();
        let component = Uuid::new_v4();
        let instance = Uuid::new_v4();

        sink.record(record(
            component,
            instance,
            Uuid::new_v4(),
            vec![],
            TraceOutcome::Output { value: json!(1) },
        ));
        sink.record(record(
            component,
            instance,
            Uuid::new_v4(),
            vec![],
            TraceOutcome::Output { value: json!(2) },
        ));

        let records = sink.get_by_instance_id(component, instance);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, TraceOutcome::Output { value: json!(2) });
    }

    #[test]
    fn test_filter_by_branch_prefix() {
        let component = Uuid::new_v4();
        let run = Uuid::new_v4();
        let records = vec![
            record(component, Uuid::new_v4(), run, vec![], TraceOutcome::InFlight),
            record(
                component,
                Uuid::new_v4(),
                run,
                vec![Branch::new("try", 0)],
                TraceOutcome::InFlight,
            ),
            record(
                component,
                Uuid::new_v4(),
                run,
                vec![Branch::new("try", 1)],
                TraceOutcome::InFlight,
            ),
            record(
                component,
                Uuid::new_v4(),
                run,
                vec![Branch::new("try", 0), Branch::new("if", 0)],
                TraceOutcome::InFlight,
            ),
        ];

        let filtered = filter_traces_by_call(&records, &[Branch::new("try", 0)]);
        assert_eq!(filtered.len(), 2);
        assert!(filtered
            .iter()
            .all(|r| r.branch_stack.first() == Some(&Branch::new("try", 0))));
    }

    #[test]
    fn test_latest_brick_call_picks_most_recent() {
        let component = Uuid::new_v4();
        let instance = Uuid::new_v4();
        let older = record(
            component,
            instance,
            Uuid::new_v4(),
            vec![],
            TraceOutcome::Output { value: json!("old") },
        );
        let mut newer = record(
            component,
            instance,
            Uuid::new_v4(),
            vec![],
            TraceOutcome::Output { value: json!("new") },
        );
        newer.timestamp = older.timestamp + chrono::Duration::seconds(1);

        let records = vec![older, newer.clone()];
        assert_eq!(get_latest_brick_call(&records, instance), Some(&newer));
    }

    #[test]
    fn test_skipped_marker_round_trips() {
        let value = serde_json::to_value(TraceOutcome::Skipped).unwrap();
        assert_eq!(value, json!({"type": "skipped"}));

        let outcome: TraceOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(outcome, TraceOutcome::Skipped);
    }

    #[test]
    fn test_clear_for_component() {
        let sink = TraceSink::new();
        let component = Uuid::new_v4();
        let instance = Uuid::new_v4();
        sink.record(record(
            component,
            instance,
            Uuid::new_v4(),
            vec![],
            TraceOutcome::InFlight,
        ));

        sink.clear_for_component(component);
        assert!(sink.get_by_instance_id(component, instance).is_empty());
    }
}
