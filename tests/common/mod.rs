#![allow(dead_code)]

//! Scripted in-memory provisioning API for integration tests.
//!
//! Models one remote stack with configurable transitions: what the stack
//! looks like after a changeset executes, what it looks like after a delete,
//! and how many in-progress snapshots a waiter observes before the settled
//! state. Every call is recorded so tests can assert on ordering and on the
//! absence of mutating calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use cfndeploy::{
    ChangeSetDescription, ChangeSetRequest, ChangeSetStatus, ProvisioningApi, StackEventRecord,
    StackLookup, StackRecord, StackStatus,
};
use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct FakeStack {
    pub stack_id: String,
    pub status: StackStatus,
    pub outputs: HashMap<String, String>,
    pub template: Option<Value>,
}

impl FakeStack {
    pub fn new(status: StackStatus) -> Self {
        Self {
            stack_id: "arn:aws:cloudformation:us-east-1:123456789012:stack/orders/abc123"
                .to_string(),
            status,
            outputs: HashMap::new(),
            template: None,
        }
    }

    pub fn with_template(mut self, template: Value) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_output(mut self, key: &str, value: &str) -> Self {
        self.outputs.insert(key.to_string(), value.to_string());
        self
    }

    fn record(&self) -> StackRecord {
        StackRecord {
            stack_id: self.stack_id.clone(),
            status: self.status.clone(),
            status_reason: None,
            outputs: self.outputs.clone(),
        }
    }
}

#[derive(Default)]
pub struct MockApi {
    /// Current remote stack; `None` means the stack does not exist.
    pub stack: Mutex<Option<FakeStack>>,
    /// Transitional snapshots served by `describe_stack` before the settled
    /// state, populated when an execute or delete lands.
    pending_statuses: Mutex<VecDeque<StackStatus>>,
    /// How many in-progress snapshots each execute/delete injects.
    pub in_progress_polls: Mutex<usize>,
    /// What `describe_change_set` reports once the changeset stabilizes.
    pub change_set: Mutex<Option<ChangeSetDescription>>,
    /// Stack state applied when a changeset is executed.
    pub post_execute: Mutex<Option<FakeStack>>,
    /// Stack state applied when the stack is deleted; `None` means absent.
    pub post_delete: Mutex<Option<FakeStack>>,
    pub captured_change_sets: Mutex<Vec<ChangeSetRequest>>,
    calls: Mutex<Vec<String>>,
    pub events: Mutex<Vec<StackEventRecord>>,
    pub event_polls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack(self, stack: FakeStack) -> Self {
        *self.stack.lock().unwrap() = Some(stack);
        self
    }

    pub fn with_post_execute(self, stack: FakeStack) -> Self {
        *self.post_execute.lock().unwrap() = Some(stack);
        self
    }

    pub fn with_post_delete(self, stack: FakeStack) -> Self {
        *self.post_delete.lock().unwrap() = Some(stack);
        self
    }

    pub fn with_change_set_result(self, description: ChangeSetDescription) -> Self {
        *self.change_set.lock().unwrap() = Some(description);
        self
    }

    pub fn with_in_progress_polls(self, count: usize) -> Self {
        *self.in_progress_polls.lock().unwrap() = count;
        self
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that mutate remote state.
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call.as_str(),
                    "create_change_set" | "execute_change_set" | "delete_change_set"
                        | "delete_stack"
                )
            })
            .collect()
    }

    fn queue_in_progress(&self, status: StackStatus) {
        let count = *self.in_progress_polls.lock().unwrap();
        let mut pending = self.pending_statuses.lock().unwrap();
        for _ in 0..count {
            pending.push_back(status.clone());
        }
    }
}

#[async_trait]
impl ProvisioningApi for MockApi {
    async fn describe_stack(&self, _stack_name: &str) -> Result<StackLookup> {
        self.log("describe_stack");
        if let Some(status) = self.pending_statuses.lock().unwrap().pop_front() {
            let mut record = FakeStack::new(status).record();
            record.stack_id = "arn:aws:cloudformation:::stack/in-flight".to_string();
            return Ok(StackLookup::Found(record));
        }
        Ok(match &*self.stack.lock().unwrap() {
            Some(stack) => StackLookup::Found(stack.record()),
            None => StackLookup::Absent,
        })
    }

    async fn get_template(&self, _stack_name: &str) -> Result<Option<Value>> {
        self.log("get_template");
        Ok(self
            .stack
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|stack| stack.template.clone()))
    }

    async fn create_change_set(&self, request: &ChangeSetRequest) -> Result<()> {
        self.log("create_change_set");
        self.captured_change_sets
            .lock()
            .unwrap()
            .push(request.clone());
        Ok(())
    }

    async fn describe_change_set(
        &self,
        _stack_name: &str,
        _change_set_name: &str,
    ) -> Result<ChangeSetDescription> {
        self.log("describe_change_set");
        Ok(self
            .change_set
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(ChangeSetDescription {
                status: ChangeSetStatus::CreateComplete,
                status_reason: None,
                change_count: 1,
            }))
    }

    async fn execute_change_set(&self, _stack_name: &str, _change_set_name: &str) -> Result<()> {
        self.log("execute_change_set");
        self.queue_in_progress(StackStatus::UpdateInProgress);
        if let Some(next) = self.post_execute.lock().unwrap().take() {
            *self.stack.lock().unwrap() = Some(next);
        }
        Ok(())
    }

    async fn delete_change_set(&self, _stack_name: &str, _change_set_name: &str) -> Result<()> {
        self.log("delete_change_set");
        Ok(())
    }

    async fn delete_stack(&self, _stack_name: &str, _role_arn: Option<&str>) -> Result<()> {
        self.log("delete_stack");
        self.queue_in_progress(StackStatus::DeleteInProgress);
        *self.stack.lock().unwrap() = self.post_delete.lock().unwrap().take();
        Ok(())
    }

    async fn stack_events_since(
        &self,
        _stack_name: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<StackEventRecord>> {
        self.event_polls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.timestamp >= cutoff)
            .cloned()
            .collect())
    }
}

/// Changeset description for the service's "no changes" failure mode.
pub fn empty_diff_failure() -> ChangeSetDescription {
    ChangeSetDescription {
        status: ChangeSetStatus::Failed,
        status_reason: Some(
            "The submitted information didn't contain changes. \
             Submit different information to create a change set."
                .to_string(),
        ),
        change_count: 0,
    }
}
