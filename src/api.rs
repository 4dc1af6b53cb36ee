//! Remote provisioning API boundary.
//!
//! The deployment pipeline never talks to the AWS SDK directly; it goes
//! through [`ProvisioningApi`], which normalizes the awkward parts of the
//! wire contract once:
//!
//! - "stack does not exist" is surfaced by CloudFormation as a
//!   `ValidationError`, not as a status value. It is mapped to
//!   [`StackLookup::Absent`] here and never propagates as a failure.
//! - raw status strings become [`StackStatus`] values.
//! - event timestamps become `chrono` instants so cursor comparisons are
//!   cheap.
//!
//! [`CfnApi`] is the production implementation over
//! `aws_sdk_cloudformation::Client`; tests substitute their own.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_cloudformation as cfn;
use aws_sdk_cloudformation::error::ProvideErrorMetadata;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::changeset::{ChangeSetDescription, ChangeSetRequest, ChangeSetStatus, ChangeSetType};
use crate::stack::Environment;
use crate::status::StackStatus;

/// Result of looking up a stack by name: either a current snapshot or the
/// normalized "no such stack" outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackLookup {
    Found(StackRecord),
    Absent,
}

/// Point-in-time snapshot of a live stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRecord {
    /// Opaque stack identifier (ARN).
    pub stack_id: String,
    pub status: StackStatus,
    pub status_reason: Option<String>,
    /// Output name to value; keys are unique per stack.
    pub outputs: HashMap<String, String>,
}

/// One entry from the stack's event history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEventRecord {
    /// Service-assigned unique event id, used to deduplicate events that
    /// share a timestamp across polls.
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub logical_resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_status: String,
    pub resource_status_reason: Option<String>,
}

/// The remote provisioning operations the deployment pipeline depends on,
/// scoped to one account/region by construction of the implementation.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    /// Current snapshot of the named stack, or `Absent` if it does not exist.
    async fn describe_stack(&self, stack_name: &str) -> Result<StackLookup>;

    /// The currently-applied template document, or `None` when the stack does
    /// not exist or its template cannot be read back.
    async fn get_template(&self, stack_name: &str) -> Result<Option<Value>>;

    async fn create_change_set(&self, request: &ChangeSetRequest) -> Result<()>;

    async fn describe_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<ChangeSetDescription>;

    async fn execute_change_set(&self, stack_name: &str, change_set_name: &str) -> Result<()>;

    async fn delete_change_set(&self, stack_name: &str, change_set_name: &str) -> Result<()>;

    async fn delete_stack(&self, stack_name: &str, role_arn: Option<&str>) -> Result<()>;

    /// Events at or after `cutoff`, oldest first. Events sharing the cutoff
    /// instant are included; callers deduplicate by event id.
    async fn stack_events_since(
        &self,
        stack_name: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<StackEventRecord>>;
}

/// Production implementation over the CloudFormation SDK client.
#[derive(Clone)]
pub struct CfnApi {
    client: cfn::Client,
}

impl CfnApi {
    pub fn new(client: cfn::Client) -> Self {
        Self { client }
    }
}

/// Build an authenticated [`CfnApi`] for a deployment target using the
/// ambient credential chain.
pub async fn connect_environment(environment: &Environment) -> CfnApi {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(environment.region.clone()))
        .load()
        .await;
    CfnApi::new(cfn::Client::new(&config))
}

/// CloudFormation reports a missing stack as a ValidationError whose message
/// names the stack, not as a dedicated error code.
fn stack_missing<E, R>(err: &cfn::error::SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    err.code() == Some("ValidationError")
        && err.message().is_some_and(|m| m.contains("does not exist"))
}

fn record_from_stack(stack: &cfn::types::Stack) -> StackRecord {
    let mut outputs = HashMap::new();
    for output in stack.outputs() {
        if let (Some(key), Some(value)) = (output.output_key(), output.output_value()) {
            outputs.insert(key.to_string(), value.to_string());
        }
    }
    StackRecord {
        stack_id: stack.stack_id().unwrap_or_default().to_string(),
        status: stack
            .stack_status()
            .map(|s| StackStatus::from(s.as_str()))
            .unwrap_or_else(|| StackStatus::Other("UNKNOWN".to_string())),
        status_reason: stack.stack_status_reason().map(str::to_string),
        outputs,
    }
}

/// Applied templates may come back as JSON or YAML depending on how they were
/// originally submitted.
fn parse_template_text(body: &str) -> Option<Value> {
    serde_json::from_str(body)
        .ok()
        .or_else(|| serde_yaml::from_str(body).ok())
}

#[async_trait]
impl ProvisioningApi for CfnApi {
    async fn describe_stack(&self, stack_name: &str) -> Result<StackLookup> {
        match self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
        {
            Ok(response) => Ok(match response.stacks().first() {
                Some(stack) => StackLookup::Found(record_from_stack(stack)),
                None => StackLookup::Absent,
            }),
            Err(err) if stack_missing(&err) => {
                debug!("Stack {} does not exist", stack_name);
                Ok(StackLookup::Absent)
            }
            Err(err) => Err(anyhow!(
                "DescribeStacks failed for stack '{stack_name}': {err}"
            )),
        }
    }

    async fn get_template(&self, stack_name: &str) -> Result<Option<Value>> {
        match self
            .client
            .get_template()
            .stack_name(stack_name)
            .send()
            .await
        {
            Ok(response) => Ok(response.template_body().and_then(|body| {
                let parsed = parse_template_text(body);
                if parsed.is_none() {
                    warn!(
                        "Could not parse currently-applied template for stack {}",
                        stack_name
                    );
                }
                parsed
            })),
            Err(err) if stack_missing(&err) => Ok(None),
            Err(err) => Err(anyhow!(
                "GetTemplate failed for stack '{stack_name}': {err}"
            )),
        }
    }

    async fn create_change_set(&self, request: &ChangeSetRequest) -> Result<()> {
        let mut call = self
            .client
            .create_change_set()
            .stack_name(&request.stack_name)
            .change_set_name(&request.change_set_name)
            .change_set_type(match request.change_set_type {
                ChangeSetType::Create => cfn::types::ChangeSetType::Create,
                ChangeSetType::Update => cfn::types::ChangeSetType::Update,
            });

        match &request.body {
            crate::template_body::TemplateBodyParam::Inline(body) => {
                call = call.template_body(body);
            }
            crate::template_body::TemplateBodyParam::Url(url) => {
                call = call.template_url(url);
            }
        }

        for (key, value) in &request.parameters {
            call = call.parameters(
                cfn::types::Parameter::builder()
                    .parameter_key(key)
                    .parameter_value(value)
                    .build(),
            );
        }
        for capability in &request.capabilities {
            call = call.capabilities(cfn::types::Capability::from(capability.as_str()));
        }
        for (key, value) in &request.tags {
            call = call.tags(cfn::types::Tag::builder().key(key).value(value).build());
        }
        for arn in &request.notification_arns {
            call = call.notification_arns(arn);
        }
        if let Some(role_arn) = &request.role_arn {
            call = call.role_arn(role_arn);
        }

        call.send().await.map_err(|err| {
            anyhow!(
                "CreateChangeSet failed for stack '{}': {err}",
                request.stack_name
            )
        })?;
        Ok(())
    }

    async fn describe_change_set(
        &self,
        stack_name: &str,
        change_set_name: &str,
    ) -> Result<ChangeSetDescription> {
        let response = self
            .client
            .describe_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set_name)
            .send()
            .await
            .map_err(|err| {
                anyhow!("DescribeChangeSet failed for changeset '{change_set_name}': {err}")
            })?;

        Ok(ChangeSetDescription {
            status: response
                .status()
                .map(|s| ChangeSetStatus::from(s.as_str()))
                .unwrap_or_else(|| ChangeSetStatus::Other("UNKNOWN".to_string())),
            status_reason: response.status_reason().map(str::to_string),
            change_count: response.changes().len(),
        })
    }

    async fn execute_change_set(&self, stack_name: &str, change_set_name: &str) -> Result<()> {
        self.client
            .execute_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set_name)
            .send()
            .await
            .map_err(|err| {
                anyhow!("ExecuteChangeSet failed for changeset '{change_set_name}': {err}")
            })?;
        Ok(())
    }

    async fn delete_change_set(&self, stack_name: &str, change_set_name: &str) -> Result<()> {
        self.client
            .delete_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set_name)
            .send()
            .await
            .map_err(|err| {
                anyhow!("DeleteChangeSet failed for changeset '{change_set_name}': {err}")
            })?;
        Ok(())
    }

    async fn delete_stack(&self, stack_name: &str, role_arn: Option<&str>) -> Result<()> {
        let mut call = self.client.delete_stack().stack_name(stack_name);
        if let Some(role_arn) = role_arn {
            call = call.role_arn(role_arn);
        }
        call.send()
            .await
            .map_err(|err| anyhow!("DeleteStack failed for stack '{stack_name}': {err}"))?;
        Ok(())
    }

    async fn stack_events_since(
        &self,
        stack_name: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<StackEventRecord>> {
        let response = self
            .client
            .describe_stack_events()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|err| {
                anyhow!("DescribeStackEvents failed for stack '{stack_name}': {err}")
            })?;

        // The service returns newest first; flip to chronological order.
        let mut events: Vec<StackEventRecord> = response
            .stack_events()
            .iter()
            .filter_map(|event| {
                let timestamp = event.timestamp().map(|t| {
                    DateTime::from_timestamp(t.secs(), t.subsec_nanos()).unwrap_or_else(Utc::now)
                })?;
                if timestamp < cutoff {
                    return None;
                }
                Some(StackEventRecord {
                    event_id: event.event_id().unwrap_or_default().to_string(),
                    timestamp,
                    logical_resource_id: event.logical_resource_id().map(str::to_string),
                    resource_type: event.resource_type().map(str::to_string),
                    resource_status: event
                        .resource_status()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_default(),
                    resource_status_reason: event.resource_status_reason().map(str::to_string),
                })
            })
            .collect();
        events.reverse();
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template_text_json_and_yaml() {
        let json = r#"{"Resources": {"Bucket": {"Type": "AWS::S3::Bucket"}}}"#;
        let yaml = "Resources:\n  Bucket:\n    Type: AWS::S3::Bucket\n";

        let from_json = parse_template_text(json).unwrap();
        let from_yaml = parse_template_text(yaml).unwrap();
        assert_eq!(from_json, from_yaml);

        assert!(parse_template_text("{not balanced").is_none());
    }
}
