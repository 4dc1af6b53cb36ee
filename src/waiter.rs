//! Polling loop that blocks until a stack reaches a terminal state or
//! disappears.

use std::time::Duration;

use tracing::{debug, info};

use crate::api::{ProvisioningApi, StackLookup, StackRecord};
use crate::error::DeployError;

pub(crate) const STACK_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll the named stack until its status classifies terminal, or it is gone.
///
/// With `absence_ok` (the post-delete wait) a missing stack resolves to
/// `Ok(None)`. Without it, absence means the stack vanished mid-operation and
/// is reported as [`DeployError::StackDisappeared`], distinct from any
/// terminal status. No deadline is imposed here; callers cancel the future if
/// they need one.
pub async fn wait_for_stack(
    api: &dyn ProvisioningApi,
    stack_name: &str,
    absence_ok: bool,
) -> Result<Option<StackRecord>, DeployError> {
    info!("Waiting for stack {} to settle", stack_name);
    loop {
        match api.describe_stack(stack_name).await? {
            StackLookup::Absent => {
                return if absence_ok {
                    debug!("Stack {} no longer exists", stack_name);
                    Ok(None)
                } else {
                    Err(DeployError::StackDisappeared {
                        stack: stack_name.to_string(),
                    })
                };
            }
            StackLookup::Found(record) => {
                if record.status.is_terminal() {
                    debug!(
                        "Stack {} reached terminal status {}",
                        stack_name, record.status
                    );
                    return Ok(Some(record));
                }
                debug!("Stack {} still {}", stack_name, record.status);
            }
        }
        tokio::time::sleep(STACK_POLL_INTERVAL).await;
    }
}
