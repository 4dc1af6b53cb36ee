use crate::status::StackStatus;
use thiserror::Error;

/// Errors surfaced by deploy and destroy operations.
///
/// "Stack does not exist" conditions are never represented here; they are
/// normalized into [`crate::api::StackLookup::Absent`] at the API boundary.
/// Remote API failures other than not-found propagate through [`DeployError::Api`]
/// unretried; retry policy for transient transport failures belongs to the
/// SDK transport, not this crate.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The stack descriptor names no target account/region. Detected before
    /// any remote call is made.
    #[error("stack '{stack}' has no target environment; configure an account and region on the stack descriptor before deploying")]
    MissingEnvironment { stack: String },

    /// The serialized template exceeds the inline body limit and no template
    /// store is configured to hold it.
    #[error("template for stack '{stack}' is {size} bytes, over the {limit}-byte inline limit; configure a template store (S3 bucket) to deploy it")]
    TemplateTooLarge {
        stack: String,
        size: usize,
        limit: usize,
    },

    /// An operation completed in a terminal status the pipeline cannot accept.
    /// The literal status is reported for operator diagnosis.
    #[error("stack '{stack}' ended in unexpected status {status}")]
    UnexpectedStatus { stack: String, status: StackStatus },

    /// The stack vanished while an operation still expected it to exist.
    #[error("stack '{stack}' disappeared while an operation was in progress")]
    StackDisappeared { stack: String },

    /// A changeset stabilized in FAILED for a reason other than an empty diff.
    #[error("changeset '{name}' for stack '{stack}' failed: {reason}")]
    ChangeSetFailed {
        stack: String,
        name: String,
        reason: String,
    },

    /// Any other remote API failure, propagated unchanged.
    #[error(transparent)]
    Api(#[from] anyhow::Error),
}
