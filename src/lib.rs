//! cfndeploy - changeset-driven stack deployment and teardown
//!
//! This crate deploys and destroys declarative infrastructure stacks against
//! CloudFormation, treating the remote, eventually-consistent API as the
//! source of truth and driving it to convergence through reviewable atomic
//! changesets.
//!
//! # Deployment pipeline
//!
//! A [`deploy::StackDeployer::deploy`] invocation runs these stages in order:
//!
//! 1. **Skip check** - the currently-applied template is fetched and compared
//!    structurally against the desired one; an unchanged stack short-circuits
//!    to a no-op result with zero mutating calls.
//! 2. **Template body resolution** - the template travels inline when small
//!    enough, or is uploaded content-addressed to a [`template_body::TemplateStore`]
//!    and referenced by URL.
//! 3. **Failed-creation recovery** - a stack stuck in `ROLLBACK_COMPLETE` or
//!    a sibling failed-creation status is deleted before retrying, since no
//!    changeset can succeed against it.
//! 4. **Changeset orchestration** - a freshly-named changeset is created,
//!    polled to stability, dropped as a no-op when it stabilizes empty, and
//!    otherwise executed (or left pending for review).
//! 5. **Terminal wait** - the stack is polled to a terminal status while a
//!    background [`monitor::ProgressMonitor`] streams its event history.
//!
//! [`deploy::StackDeployer::destroy`] mirrors this for deletion and is a
//! no-op for stacks that do not exist.
//!
//! # Remote API boundary
//!
//! All remote calls go through the [`api::ProvisioningApi`] trait, which
//! normalizes "stack does not exist" errors into [`api::StackLookup::Absent`]
//! and raw status strings into [`status::StackStatus`]. The production
//! implementation is [`api::CfnApi`]; tests substitute scripted fakes.

pub mod api;
pub mod changeset;
pub mod deploy;
pub mod destroy;
pub mod error;
pub mod monitor;
pub mod stack;
pub mod status;
pub mod template_body;
pub mod waiter;

pub use api::{connect_environment, CfnApi, ProvisioningApi, StackEventRecord, StackLookup, StackRecord};
pub use changeset::{
    ChangeSetDescription, ChangeSetRequest, ChangeSetStatus, ChangeSetType, DEPLOY_CAPABILITIES,
};
pub use deploy::StackDeployer;
pub use error::DeployError;
pub use monitor::ProgressMonitor;
pub use stack::{
    AssetPublisher, DeployRequest, DeploymentResult, DestroyRequest, Environment, StackDescriptor,
};
pub use status::{StackStatus, StatusClass};
pub use template_body::{
    resolve_template_body, S3TemplateStore, TemplateBodyParam, TemplateStore,
    MAX_INLINE_TEMPLATE_BYTES,
};
pub use waiter::wait_for_stack;
