//! Deployment orchestration.
//!
//! One deploy invocation runs as a single sequential flow: skip check,
//! parameter merge, template body resolution, failed-creation recovery,
//! changeset create/stabilize/execute, terminal wait. The only concurrent
//! piece is the [`ProgressMonitor`], which is started after execution begins
//! and stopped on every exit path. No remote state is cached across calls;
//! every decision re-reads current status from the service.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ProvisioningApi, StackLookup};
use crate::changeset::{
    create_and_stabilize, is_empty_diff, ChangeSetRequest, ChangeSetStatus, ChangeSetType,
    DEPLOY_CAPABILITIES,
};
use crate::error::DeployError;
use crate::monitor::ProgressMonitor;
use crate::stack::{AssetPublisher, DeployRequest, DeploymentResult, StackDescriptor};
use crate::status::StatusClass;
use crate::template_body::{resolve_template_body, TemplateStore};
use crate::waiter::wait_for_stack;

/// Drives stacks to convergence against one provisioning endpoint.
///
/// Holds no cross-stack mutable state; a single deployer may serve concurrent
/// deploy/destroy invocations for different stacks.
pub struct StackDeployer {
    api: Arc<dyn ProvisioningApi>,
    template_store: Option<Arc<dyn TemplateStore>>,
    asset_publisher: Option<Arc<dyn AssetPublisher>>,
}

impl StackDeployer {
    pub fn new(api: Arc<dyn ProvisioningApi>) -> Self {
        Self {
            api,
            template_store: None,
            asset_publisher: None,
        }
    }

    /// Configure auxiliary storage for template bodies. Without it, templates
    /// over the inline limit are rejected before any remote call.
    pub fn with_template_store(mut self, store: Arc<dyn TemplateStore>) -> Self {
        self.template_store = Some(store);
        self
    }

    pub fn with_asset_publisher(mut self, publisher: Arc<dyn AssetPublisher>) -> Self {
        self.asset_publisher = Some(publisher);
        self
    }

    pub(crate) fn api(&self) -> &Arc<dyn ProvisioningApi> {
        &self.api
    }

    /// Deploy a stack to its desired template, returning what happened.
    ///
    /// Idempotent: repeating an invocation whose template is already applied
    /// performs zero mutating calls and reports `no_op`.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeploymentResult, DeployError> {
        let stack = &request.stack;
        let environment =
            stack
                .environment
                .as_ref()
                .ok_or_else(|| DeployError::MissingEnvironment {
                    stack: stack.name.clone(),
                })?;
        info!(
            "Deploying stack {} to {}/{}",
            stack.name, environment.account, environment.region
        );

        if request.force {
            debug!(
                "Force flag set, skipping template comparison for stack {}",
                stack.name
            );
        } else if let Some(result) = self.skip_if_unchanged(stack).await? {
            info!(
                "Stack {} already has the desired template applied, nothing to deploy",
                stack.name
            );
            return Ok(result);
        }

        let parameters = self.merged_parameters(stack, &request.reuse_assets).await?;
        let body =
            resolve_template_body(&stack.template, &stack.name, self.template_store.as_deref())
                .await?;
        let exists = self.recover_failed_creation(stack).await?;

        let change_set = ChangeSetRequest {
            stack_name: stack.name.clone(),
            change_set_name: format!("deploy-{}", Uuid::new_v4()),
            change_set_type: if exists {
                ChangeSetType::Update
            } else {
                ChangeSetType::Create
            },
            body,
            parameters,
            capabilities: DEPLOY_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            role_arn: stack.role_arn.clone(),
            notification_arns: stack.notification_arns.clone(),
            tags: stack.tags.clone(),
        };

        info!(
            "Creating {} changeset {} for stack {}",
            change_set.change_set_type, change_set.change_set_name, stack.name
        );
        let description = create_and_stabilize(self.api.as_ref(), &change_set).await?;

        if is_empty_diff(&description) {
            info!(
                "Changeset {} contains no changes, deleting it",
                change_set.change_set_name
            );
            self.api
                .delete_change_set(&stack.name, &change_set.change_set_name)
                .await?;
            return self.current_result(stack, true).await;
        }

        if description.status == ChangeSetStatus::Failed {
            let reason = description
                .status_reason
                .unwrap_or_else(|| "no reason reported".to_string());
            return Err(DeployError::ChangeSetFailed {
                stack: stack.name.clone(),
                name: change_set.change_set_name,
                reason,
            });
        }

        if !request.execute {
            info!(
                "Changeset {} created with {} changes; left pending for review",
                change_set.change_set_name, description.change_count
            );
            return self.current_result(stack, false).await;
        }

        info!(
            "Executing changeset {} ({} changes)",
            change_set.change_set_name, description.change_count
        );
        self.api
            .execute_change_set(&stack.name, &change_set.change_set_name)
            .await?;

        let monitor = if request.quiet {
            None
        } else {
            Some(ProgressMonitor::start(self.api.clone(), stack.name.clone()))
        };
        let waited = wait_for_stack(self.api.as_ref(), &stack.name, false).await;
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        let record = waited?.ok_or_else(|| DeployError::StackDisappeared {
            stack: stack.name.clone(),
        })?;
        match record.status.class() {
            StatusClass::Success => {
                info!("Stack {} deployed successfully", stack.name);
                Ok(DeploymentResult {
                    stack_name: stack.name.clone(),
                    no_op: false,
                    outputs: record.outputs,
                    stack_arn: record.stack_id,
                })
            }
            _ => {
                if let Some(reason) = &record.status_reason {
                    warn!(
                        "Stack {} failed with status {}: {}",
                        stack.name, record.status, reason
                    );
                }
                Err(DeployError::UnexpectedStatus {
                    stack: stack.name.clone(),
                    status: record.status,
                })
            }
        }
    }

    /// Compare the currently-applied template against the desired one and
    /// short-circuit when they are structurally equal. Performs no mutating
    /// calls; the rest of the pipeline stays correct without it.
    async fn skip_if_unchanged(
        &self,
        stack: &StackDescriptor,
    ) -> Result<Option<DeploymentResult>, DeployError> {
        let Some(current) = self.api.get_template(&stack.name).await? else {
            return Ok(None);
        };
        if current != stack.template {
            debug!("Template for stack {} differs from the applied one", stack.name);
            return Ok(None);
        }
        let StackLookup::Found(record) = self.api.describe_stack(&stack.name).await? else {
            return Ok(None);
        };
        // A stack stuck in failed creation or still in review has its template
        // "applied" in name only; it must fall through to recovery, never
        // short-circuit.
        if record.status.is_failed_creation()
            || record.status == crate::status::StackStatus::ReviewInProgress
        {
            debug!(
                "Stack {} matches the desired template but sits in {}, deploying anyway",
                stack.name, record.status
            );
            return Ok(None);
        }
        Ok(Some(DeploymentResult {
            stack_name: stack.name.clone(),
            no_op: true,
            outputs: record.outputs,
            stack_arn: record.stack_id,
        }))
    }

    /// Asset-derived parameters first, then caller overrides, which replace
    /// asset entries of the same key. Empty override values are dropped.
    async fn merged_parameters(
        &self,
        stack: &StackDescriptor,
        reuse_assets: &[String],
    ) -> Result<Vec<(String, String)>, DeployError> {
        let mut parameters = Vec::new();
        if let Some(publisher) = &self.asset_publisher {
            parameters.extend(publisher.publish_assets(&stack.name, reuse_assets).await?);
        }
        for (key, value) in &stack.parameters {
            if value.is_empty() {
                debug!("Dropping empty parameter override {}", key);
                continue;
            }
            parameters.retain(|(existing, _)| existing != key);
            parameters.push((key.clone(), value.clone()));
        }
        Ok(parameters)
    }

    /// Detect a stack stuck in failed creation and delete it before the
    /// changeset is attempted. Returns whether a usable stack exists after
    /// recovery, which decides CREATE versus UPDATE intent.
    async fn recover_failed_creation(
        &self,
        stack: &StackDescriptor,
    ) -> Result<bool, DeployError> {
        match self.api.describe_stack(&stack.name).await? {
            StackLookup::Absent => Ok(false),
            StackLookup::Found(record) if record.status.is_failed_creation() => {
                warn!(
                    "Stack {} is stuck in {} from a failed creation; deleting it before retrying",
                    stack.name, record.status
                );
                self.api
                    .delete_stack(&stack.name, stack.role_arn.as_deref())
                    .await?;
                match wait_for_stack(self.api.as_ref(), &stack.name, true).await? {
                    None => Ok(false),
                    Some(record) if record.status == crate::status::StackStatus::DeleteComplete => {
                        Ok(false)
                    }
                    Some(record) => Err(DeployError::UnexpectedStatus {
                        stack: stack.name.clone(),
                        status: record.status,
                    }),
                }
            }
            // A stack parked in REVIEW_IN_PROGRESS (a created-but-never-executed
            // changeset) has no resources yet; only a CREATE changeset is
            // accepted against it.
            StackLookup::Found(record)
                if record.status == crate::status::StackStatus::ReviewInProgress =>
            {
                debug!(
                    "Stack {} is still in review, keeping CREATE intent",
                    stack.name
                );
                Ok(false)
            }
            StackLookup::Found(record) => {
                debug!("Stack {} exists with status {}", stack.name, record.status);
                Ok(true)
            }
        }
    }

    async fn current_result(
        &self,
        stack: &StackDescriptor,
        no_op: bool,
    ) -> Result<DeploymentResult, DeployError> {
        match self.api.describe_stack(&stack.name).await? {
            StackLookup::Found(record) => Ok(DeploymentResult {
                stack_name: stack.name.clone(),
                no_op,
                outputs: record.outputs,
                stack_arn: record.stack_id,
            }),
            StackLookup::Absent => Ok(DeploymentResult {
                stack_name: stack.name.clone(),
                no_op,
                outputs: Default::default(),
                stack_arn: String::new(),
            }),
        }
    }
}
