//! Stack teardown, mirroring deployment: monitor start, delete request,
//! absence-acceptable wait, monitor stop.

use tracing::{debug, info};

use crate::api::{StackLookup, StackRecord};
use crate::deploy::StackDeployer;
use crate::error::DeployError;
use crate::monitor::ProgressMonitor;
use crate::stack::DestroyRequest;
use crate::status::StackStatus;
use crate::waiter::wait_for_stack;

impl StackDeployer {
    /// Destroy a stack. Destroying a stack that does not exist succeeds
    /// without issuing any mutating call.
    pub async fn destroy(&self, request: &DestroyRequest) -> Result<(), DeployError> {
        let stack_name = &request.stack_name;
        match self.api().describe_stack(stack_name).await? {
            StackLookup::Absent => {
                info!("Stack {} does not exist, nothing to destroy", stack_name);
                return Ok(());
            }
            StackLookup::Found(record) => {
                debug!(
                    "Destroying stack {} (current status {})",
                    stack_name, record.status
                );
            }
        }

        let monitor = if request.quiet {
            None
        } else {
            Some(ProgressMonitor::start(
                self.api().clone(),
                stack_name.clone(),
            ))
        };
        let waited = self
            .delete_and_wait(stack_name, request.role_arn.as_deref())
            .await;
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        match waited? {
            None => {
                info!("Stack {} deleted", stack_name);
                Ok(())
            }
            Some(record) if record.status == StackStatus::DeleteComplete => {
                info!("Stack {} deleted", stack_name);
                Ok(())
            }
            Some(record) => Err(DeployError::UnexpectedStatus {
                stack: stack_name.clone(),
                status: record.status,
            }),
        }
    }

    async fn delete_and_wait(
        &self,
        stack_name: &str,
        role_arn: Option<&str>,
    ) -> Result<Option<StackRecord>, DeployError> {
        self.api().delete_stack(stack_name, role_arn).await?;
        wait_for_stack(self.api().as_ref(), stack_name, true).await
    }
}
