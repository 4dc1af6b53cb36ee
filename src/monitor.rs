//! Background stack event monitoring during long-running executions.
//!
//! The monitor polls the stack's event history on a fixed interval and logs
//! every event newer than the cursor captured at start. It is best-effort
//! observability: poll failures are logged and swallowed, never allowed to
//! abort the deployment that started it. The orchestrator owns its lifetime
//! and must call [`ProgressMonitor::stop`] on every exit path so no polling
//! outlives the parent operation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ProvisioningApi, StackEventRecord};

pub(crate) const EVENT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to a running event monitor.
pub struct ProgressMonitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressMonitor {
    /// Begin background polling. The cursor starts now, so only events caused
    /// by the operation in flight are reported.
    pub fn start(api: Arc<dyn ProvisioningApi>, stack_name: String) -> Self {
        let token = CancellationToken::new();
        let poll_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut cursor = Utc::now();
            let mut seen_at_cursor = HashSet::new();
            debug!("Started event monitoring for stack {}", stack_name);
            loop {
                tokio::select! {
                    _ = poll_token.cancelled() => break,
                    _ = tokio::time::sleep(EVENT_POLL_INTERVAL) => {}
                }
                match api.stack_events_since(&stack_name, cursor).await {
                    Ok(events) => {
                        for event in advance_cursor(events, &mut cursor, &mut seen_at_cursor) {
                            info!(
                                "{} | {} | {} | {}",
                                event.timestamp.format("%H:%M:%S"),
                                event.resource_status,
                                event.logical_resource_id.as_deref().unwrap_or("-"),
                                event.resource_status_reason.as_deref().unwrap_or(""),
                            );
                        }
                    }
                    Err(e) => warn!("Event poll failed for stack {}: {}", stack_name, e),
                }
            }
            debug!("Stopped event monitoring for stack {}", stack_name);
        });
        Self { token, handle }
    }

    /// Signal the poller to stop and wait for it to finish flushing.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Event monitor task ended abnormally: {}", e);
        }
    }
}

/// Filter one chronological poll batch down to events not yet reported,
/// advancing the cursor.
///
/// The poll window includes events sharing the cursor instant, so a later
/// event with the same timestamp as an earlier one is never lost; ids seen at
/// the current cursor instant are remembered to keep re-polled events from
/// repeating.
fn advance_cursor(
    events: Vec<StackEventRecord>,
    cursor: &mut DateTime<Utc>,
    seen_at_cursor: &mut HashSet<String>,
) -> Vec<StackEventRecord> {
    let mut fresh = Vec::new();
    for event in events {
        if event.timestamp < *cursor {
            continue;
        }
        if event.timestamp > *cursor {
            *cursor = event.timestamp;
            seen_at_cursor.clear();
        }
        if seen_at_cursor.insert(event.event_id.clone()) {
            fresh.push(event);
        }
    }
    fresh
}
