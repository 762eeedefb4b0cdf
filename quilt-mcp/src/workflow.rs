// quilt-mcp/src/workflow.rs
// ============================================================================
// Module: Workflow Records
// Description: In-memory workflow bookkeeping for legacy mode.
// Purpose: Track named step lists for the lifetime of the process.
// Dependencies: quilt-mcp-core, serde
// ============================================================================

//! ## Overview
//! Workflow records exist only in legacy mode and only in memory: they are
//! lost on restart and no scheduler executes them. The store is a guarded
//! map; identifiers are process-local counters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use quilt_mcp_core::OpsError;
use quilt_mcp_core::OpsResult;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Workflow lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created, no step marked done.
    Pending,
    /// At least one step marked done.
    InProgress,
    /// Every step marked done.
    Completed,
}

/// One in-memory workflow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Process-local identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Ordered step labels.
    pub steps: Vec<String>,
    /// Steps already marked done.
    pub completed_steps: Vec<String>,
    /// Lifecycle status.
    pub status: WorkflowStatus,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Guarded in-memory workflow store; contents die with the process.
#[derive(Default)]
pub struct WorkflowStore {
    /// Records keyed by identifier.
    records: Mutex<BTreeMap<String, WorkflowRecord>>,
    /// Identifier counter.
    counter: AtomicU64,
}

impl WorkflowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record and returns it.
    ///
    /// # Errors
    ///
    /// Returns `VALIDATION_FAILED` when the name or steps are empty.
    pub fn create(&self, name: &str, steps: Vec<String>) -> OpsResult<WorkflowRecord> {
        if name.trim().is_empty() {
            return Err(OpsError::validation("workflow name must not be empty"));
        }
        if steps.is_empty() {
            return Err(OpsError::validation("workflow needs at least one step"));
        }
        let id = format!("wf-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        let record = WorkflowRecord {
            id: id.clone(),
            name: name.to_string(),
            steps,
            completed_steps: Vec::new(),
            status: WorkflowStatus::Pending,
        };
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.insert(id, record.clone());
        Ok(record)
    }

    /// Returns one record by identifier.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for unknown identifiers.
    pub fn get(&self, id: &str) -> OpsResult<WorkflowRecord> {
        let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records
            .get(id)
            .cloned()
            .ok_or_else(|| OpsError::not_found(format!("workflow {id} not found")))
    }

    /// Marks a step done and updates the status.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for unknown workflows or steps.
    pub fn complete_step(&self, id: &str, step: &str) -> OpsResult<WorkflowRecord> {
        let mut records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let record = records
            .get_mut(id)
            .ok_or_else(|| OpsError::not_found(format!("workflow {id} not found")))?;
        if !record.steps.iter().any(|existing| existing == step) {
            return Err(OpsError::not_found(format!("workflow {id} has no step `{step}`")));
        }
        if !record.completed_steps.iter().any(|existing| existing == step) {
            record.completed_steps.push(step.to_string());
        }
        record.status = if record.completed_steps.len() == record.steps.len() {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::InProgress
        };
        Ok(record.clone())
    }

    /// Lists all records.
    #[must_use]
    pub fn list(&self) -> Vec<WorkflowRecord> {
        let records = self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        records.values().cloned().collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::WorkflowStatus;
    use super::WorkflowStore;

    #[test]
    fn lifecycle_moves_through_statuses() {
        let store = WorkflowStore::new();
        let record = store
            .create("ingest", vec!["fetch".to_string(), "package".to_string()])
            .expect("record");
        assert_eq!(record.status, WorkflowStatus::Pending);

        let record = store.complete_step(&record.id, "fetch").expect("step");
        assert_eq!(record.status, WorkflowStatus::InProgress);

        let record = store.complete_step(&record.id, "package").expect("step");
        assert_eq!(record.status, WorkflowStatus::Completed);
    }

    #[test]
    fn unknown_ids_and_steps_are_not_found() {
        let store = WorkflowStore::new();
        assert!(store.get("wf-404").is_err());
        let record = store.create("x", vec!["a".to_string()]).expect("record");
        assert!(store.complete_step(&record.id, "missing").is_err());
    }

    #[test]
    fn identifiers_are_unique_within_the_process() {
        let store = WorkflowStore::new();
        let a = store.create("a", vec!["s".to_string()]).expect("a");
        let b = store.create("b", vec!["s".to_string()]).expect("b");
        assert_ne!(a.id, b.id);
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let store = WorkflowStore::new();
        assert!(store.create("", vec!["s".to_string()]).is_err());
        assert!(store.create("x", Vec::new()).is_err());
    }
}
