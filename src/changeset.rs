//! Changeset creation, stabilization, and empty-diff detection.
//!
//! Every deployment attempt creates a changeset under a fresh name, polls the
//! changeset's own status (distinct from the stack's status) until it leaves
//! its transitional state, and then decides whether there is anything to
//! execute at all. Two non-identical templates frequently stabilize into a
//! changeset with no executable delta, e.g. metadata-only edits; that case is
//! detected here and handled as a no-op upstream.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::api::ProvisioningApi;
use crate::error::DeployError;
use crate::template_body::TemplateBodyParam;

/// Capabilities attached to every changeset. Templates may declare IAM
/// resources or rely on macro expansion, both of which CloudFormation rejects
/// without an explicit acknowledgement.
pub const DEPLOY_CAPABILITIES: [&str; 3] = [
    "CAPABILITY_IAM",
    "CAPABILITY_NAMED_IAM",
    "CAPABILITY_AUTO_EXPAND",
];

pub(crate) const CHANGE_SET_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Whether a changeset creates a new stack or updates an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSetType {
    Create,
    Update,
}

impl ChangeSetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSetType::Create => "CREATE",
            ChangeSetType::Update => "UPDATE",
        }
    }
}

impl fmt::Display for ChangeSetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a changeset as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSetStatus {
    CreatePending,
    CreateInProgress,
    CreateComplete,
    Failed,
    Other(String),
}

impl ChangeSetStatus {
    /// Whether the changeset is still stabilizing and must be polled again.
    pub fn is_settling(&self) -> bool {
        matches!(
            self,
            ChangeSetStatus::CreatePending | ChangeSetStatus::CreateInProgress
        )
    }
}

impl From<&str> for ChangeSetStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "CREATE_PENDING" => ChangeSetStatus::CreatePending,
            "CREATE_IN_PROGRESS" => ChangeSetStatus::CreateInProgress,
            "CREATE_COMPLETE" => ChangeSetStatus::CreateComplete,
            "FAILED" => ChangeSetStatus::Failed,
            other => ChangeSetStatus::Other(other.to_string()),
        }
    }
}

/// Everything needed to submit one changeset for one deployment attempt.
#[derive(Debug, Clone)]
pub struct ChangeSetRequest {
    pub stack_name: String,
    /// Fresh per attempt, never reused, so stale changesets from prior failed
    /// attempts cannot collide with this one.
    pub change_set_name: String,
    pub change_set_type: ChangeSetType,
    pub body: TemplateBodyParam,
    pub parameters: Vec<(String, String)>,
    pub capabilities: Vec<String>,
    pub role_arn: Option<String>,
    pub notification_arns: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

/// Stabilized view of a changeset. Only the change count is consumed from the
/// proposed change list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetDescription {
    pub status: ChangeSetStatus,
    pub status_reason: Option<String>,
    pub change_count: usize,
}

/// Submit a changeset and poll it until it leaves its transitional state.
pub(crate) async fn create_and_stabilize(
    api: &dyn ProvisioningApi,
    request: &ChangeSetRequest,
) -> Result<ChangeSetDescription, DeployError> {
    api.create_change_set(request).await?;

    loop {
        let description = api
            .describe_change_set(&request.stack_name, &request.change_set_name)
            .await?;
        if !description.status.is_settling() {
            debug!(
                "Changeset {} stabilized with status {:?} ({} changes)",
                request.change_set_name, description.status, description.change_count
            );
            return Ok(description);
        }
        debug!(
            "Changeset {} still {:?}, polling again",
            request.change_set_name, description.status
        );
        tokio::time::sleep(CHANGE_SET_POLL_INTERVAL).await;
    }
}

/// Whether a stabilized changeset carries no executable delta.
///
/// The service reports an empty diff either as CREATE_COMPLETE with zero
/// changes or as FAILED with a "didn't contain changes" style reason.
pub(crate) fn is_empty_diff(description: &ChangeSetDescription) -> bool {
    match description.status {
        ChangeSetStatus::Failed => description.status_reason.as_deref().is_some_and(|reason| {
            let reason = reason.to_ascii_lowercase();
            reason.contains("didn't contain changes")
                || reason.contains("no updates are to be performed")
        }),
        ChangeSetStatus::CreateComplete => description.change_count == 0,
        _ => false,
    }
}
