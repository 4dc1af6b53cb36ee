//! Stack status vocabulary and its terminal/transitional classification.
//!
//! CloudFormation reports stack state as an open string enumeration. Rather
//! than scattering string comparisons through the deployment pipeline, every
//! raw status is parsed into [`StackStatus`] once at the API boundary and
//! classified through [`StackStatus::class`]. Statuses this crate has never
//! seen round-trip through [`StackStatus::Other`] and classify as in-progress,
//! so a new service-side status never strands a waiter in an error path.

use std::fmt;

/// Closed representation of the CloudFormation stack status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    ReviewInProgress,
    ImportInProgress,
    ImportComplete,
    ImportRollbackInProgress,
    ImportRollbackFailed,
    ImportRollbackComplete,
    /// A status value this crate does not recognize, preserved verbatim.
    Other(String),
}

/// Derived classification of a stack status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Further transitions are expected without new operator action.
    InProgress,
    /// Terminal and healthy.
    Success,
    /// Terminal and unhealthy.
    Failure,
}

impl StackStatus {
    /// Classify this status as in-progress, terminal-success, or
    /// terminal-failure. Unknown statuses are treated as in-progress.
    pub fn class(&self) -> StatusClass {
        use StackStatus::*;
        match self {
            CreateComplete | UpdateComplete | DeleteComplete | ImportComplete => {
                StatusClass::Success
            }
            CreateFailed | RollbackFailed | RollbackComplete | DeleteFailed
            | UpdateRollbackFailed | UpdateRollbackComplete | ImportRollbackFailed
            | ImportRollbackComplete => StatusClass::Failure,
            _ => StatusClass::InProgress,
        }
    }

    /// Whether no further transition is expected without new action.
    pub fn is_terminal(&self) -> bool {
        self.class() != StatusClass::InProgress
    }

    /// Whether the stack is stuck in a failed creation from which no update
    /// or changeset can succeed. The only way forward is delete and recreate.
    pub fn is_failed_creation(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateFailed | StackStatus::RollbackFailed | StackStatus::RollbackComplete
        )
    }

    pub fn as_str(&self) -> &str {
        use StackStatus::*;
        match self {
            CreateInProgress => "CREATE_IN_PROGRESS",
            CreateFailed => "CREATE_FAILED",
            CreateComplete => "CREATE_COMPLETE",
            RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            RollbackFailed => "ROLLBACK_FAILED",
            RollbackComplete => "ROLLBACK_COMPLETE",
            DeleteInProgress => "DELETE_IN_PROGRESS",
            DeleteFailed => "DELETE_FAILED",
            DeleteComplete => "DELETE_COMPLETE",
            UpdateInProgress => "UPDATE_IN_PROGRESS",
            UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            UpdateComplete => "UPDATE_COMPLETE",
            UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            ReviewInProgress => "REVIEW_IN_PROGRESS",
            ImportInProgress => "IMPORT_IN_PROGRESS",
            ImportComplete => "IMPORT_COMPLETE",
            ImportRollbackInProgress => "IMPORT_ROLLBACK_IN_PROGRESS",
            ImportRollbackFailed => "IMPORT_ROLLBACK_FAILED",
            ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE",
            Other(raw) => raw,
        }
    }
}

impl From<&str> for StackStatus {
    fn from(raw: &str) -> Self {
        use StackStatus::*;
        match raw {
            "CREATE_IN_PROGRESS" => CreateInProgress,
            "CREATE_FAILED" => CreateFailed,
            "CREATE_COMPLETE" => CreateComplete,
            "ROLLBACK_IN_PROGRESS" => RollbackInProgress,
            "ROLLBACK_FAILED" => RollbackFailed,
            "ROLLBACK_COMPLETE" => RollbackComplete,
            "DELETE_IN_PROGRESS" => DeleteInProgress,
            "DELETE_FAILED" => DeleteFailed,
            "DELETE_COMPLETE" => DeleteComplete,
            "UPDATE_IN_PROGRESS" => UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => UpdateComplete,
            "UPDATE_ROLLBACK_IN_PROGRESS" => UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_FAILED" => UpdateRollbackFailed,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => UpdateRollbackComplete,
            "REVIEW_IN_PROGRESS" => ReviewInProgress,
            "IMPORT_IN_PROGRESS" => ImportInProgress,
            "IMPORT_COMPLETE" => ImportComplete,
            "IMPORT_ROLLBACK_IN_PROGRESS" => ImportRollbackInProgress,
            "IMPORT_ROLLBACK_FAILED" => ImportRollbackFailed,
            "IMPORT_ROLLBACK_COMPLETE" => ImportRollbackComplete,
            other => Other(other.to_string()),
        }
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
